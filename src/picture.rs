//! Picture streaming between files and the `contact.picture` field.
//!
//! Pictures never pass through memory whole: the field is sized to the file
//! first, then bytes move in fixed-size chunks at increasing offsets.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{PhoneBookError, Result};
use crate::models::ContactId;
use crate::store::RowStore;

/// Bytes moved per read or write
pub const DEFAULT_CHUNK_SIZE: usize = 256;

fn file_error(path: &Path, source: std::io::Error) -> PhoneBookError {
    PhoneBookError::File {
        path: path.to_path_buf(),
        source,
    }
}

/// Open a picture file for import and report its length.
///
/// Fails with [`PhoneBookError::File`] when the file cannot be opened, before
/// anything is written to the database.
pub fn open_picture(path: &Path) -> Result<(File, u64)> {
    let file = File::open(path).map_err(|e| file_error(path, e))?;
    let len = file.metadata().map_err(|e| file_error(path, e))?.len();
    Ok((file, len))
}

/// Stream a picture file into a contact's picture field.
///
/// # Arguments
///
/// * `store` - Open row store with a picture field
/// * `id` - Contact receiving the picture
/// * `file` - Opened picture file and its length, from [`open_picture`]
/// * `path` - Where the file came from, for error reports
/// * `chunk_size` - Bytes per write
///
/// # Returns
///
/// Number of bytes stored
pub fn store_picture(
    store: &mut dyn RowStore,
    id: ContactId,
    (file, len): (File, u64),
    path: &Path,
    chunk_size: usize,
) -> Result<u64> {
    store.resize_picture(id, len)?;

    let mut reader = BufReader::new(file);
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut offset = 0u64;
    while offset < len {
        let read = reader.read(&mut buffer).map_err(|e| file_error(path, e))?;
        if read == 0 {
            // File shrank after it was sized; the tail stays zero filled
            break;
        }
        store.write_picture(id, offset, &buffer[..read])?;
        offset += read as u64;
    }

    debug!(contact_id = id, bytes = offset, "Stored picture");
    Ok(offset)
}

/// Stream a contact's picture field out to a file.
///
/// The output file is created only here, so callers check that the picture
/// exists first.
///
/// # Returns
///
/// Number of bytes written
pub fn export_picture(
    store: &dyn RowStore,
    id: ContactId,
    size: u64,
    output: &Path,
    chunk_size: usize,
) -> Result<u64> {
    let file = File::create(output).map_err(|e| file_error(output, e))?;
    let mut writer = BufWriter::new(file);
    let mut buffer = vec![0u8; chunk_size.max(1)];

    let mut offset = 0u64;
    while offset < size {
        let read = store.read_picture(id, offset, &mut buffer)?;
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read]).map_err(|e| file_error(output, e))?;
        offset += read as u64;
    }
    writer.flush().map_err(|e| file_error(output, e))?;

    debug!(contact_id = id, bytes = offset, output = %output.display(), "Exported picture");
    Ok(offset)
}
