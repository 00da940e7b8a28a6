//! Navigational backend over sled.
//!
//! Each table is a sled tree keyed by the big-endian primary key with
//! bincode-encoded rows. Secondary indexes are trees whose keys are the
//! indexed field followed by the row key, so an equality filter is a prefix
//! scan and a sorted walk is a plain iteration. Sequences live in the
//! catalog tree and are advanced with an atomic fetch-and-update.
//!
//! Pictures are stored outside the row as fixed-size segments keyed by
//! `(contact id, segment number)`; the row only records the picture length.
//!
//! A sled database has a single owning handle, which is what keeps other
//! writers out. Row locks taken inside a transaction are recorded in
//! `locked_rows` and released by the commit.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError, Transactional,
};
use tracing::{debug, info};

use crate::config::{Backend, DatabaseConfig, StorageMode};
use crate::error::{PhoneBookError, Result};
use crate::models::{Contact, ContactBrief, ContactId, ContactListing, PhoneNumber, PhoneNumberType, SortMode};
use crate::schema::{contact, phone_number, sequences};

const CATALOG: &str = "__catalog";
const PICTURE_SEGMENTS: &str = "contact.picture";
const SEGMENT_SIZE: u64 = 4096;
/// Written by sled into every database directory it opens
const SLED_CONFIG_FILE: &str = "conf";

type TxResult = ConflictableTransactionResult<(), PhoneBookError>;

/// Table definition recorded in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableDef {
    fields: Vec<String>,
    indexes: Vec<String>,
    foreign_keys: Vec<String>,
}

impl TableDef {
    fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

/// Stored form of a contact row
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContactRecord {
    id: ContactId,
    name: String,
    ring_id: Option<u32>,
    picture_name: Option<String>,
    picture_len: Option<u64>,
}

impl ContactRecord {
    fn to_contact(&self) -> Contact {
        Contact {
            id: self.id,
            name: self.name.clone(),
            ring_id: self.ring_id,
            picture_name: self.picture_name.clone(),
        }
    }
}

/// Stored form of a phone number row
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PhoneNumberRecord {
    contact_id: ContactId,
    number: String,
    number_type: u32,
    speed_dial: Option<i32>,
}

impl PhoneNumberRecord {
    fn to_phone_number(&self) -> Result<PhoneNumber> {
        Ok(PhoneNumber {
            contact_id: self.contact_id,
            number: self.number.clone(),
            number_type: PhoneNumberType::try_from(self.number_type)?,
            speed_dial: self.speed_dial,
        })
    }
}

fn row_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn decode_row_key(bytes: &[u8]) -> Result<u64> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| PhoneBookError::InvalidInput(format!("malformed row key of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(array))
}

fn encode<T: Serialize>(row: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(row)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// Index key: field bytes, a 0 separator, then the row key.
fn index_key(field: &[u8], row: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(field.len() + 9);
    key.extend_from_slice(field);
    key.push(0);
    key.extend_from_slice(&row_key(row));
    key
}

fn index_prefix(field: &[u8]) -> Vec<u8> {
    let mut prefix = field.to_vec();
    prefix.push(0);
    prefix
}

/// Row key is always the last 8 bytes of an index key.
fn index_row(key: &[u8]) -> Result<u64> {
    let start = key
        .len()
        .checked_sub(8)
        .ok_or_else(|| PhoneBookError::InvalidInput("malformed index key".to_string()))?;
    decode_row_key(&key[start..])
}

fn segment_key(id: ContactId, segment: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&row_key(id));
    key[8..].copy_from_slice(&row_key(segment));
    key
}

fn catalog_table_key(table: &str) -> String {
    format!("table.{table}")
}

fn catalog_sequence_key(sequence: &str) -> String {
    format!("sequence.{sequence}")
}

fn abort(err: PhoneBookError) -> ConflictableTransactionError<PhoneBookError> {
    ConflictableTransactionError::Abort(err)
}

fn from_transaction(err: TransactionError<PhoneBookError>) -> PhoneBookError {
    match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => err.into(),
    }
}

/// Phone book storage in sled trees
pub struct TableStore {
    db: sled::Db,
    path: String,
    catalog: sled::Tree,
    contact: sled::Tree,
    contact_by_name: sled::Tree,
    phone_number: sled::Tree,
    phone_number_by_contact_id: sled::Tree,
    picture: Option<sled::Tree>,
    locked_rows: BTreeSet<ContactId>,
    in_transaction: bool,
}

impl TableStore {
    /// Open an existing database directory. Memory storage never pre-exists.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let path = Path::new(&config.path);
        if config.storage == StorageMode::Memory || !path.exists() {
            return Err(PhoneBookError::DatabaseNotFound(config.path.clone()));
        }
        // sled would populate any directory it is pointed at
        if !path.join(SLED_CONFIG_FILE).is_file() {
            return Err(connection_error(&config.path, &"not a phone book database"));
        }

        let db = sled::Config::new()
            .path(&config.path)
            .open()
            .map_err(|e| connection_error(&config.path, &e))?;
        let mut store = Self::from_db(db, &config.path)?;

        let Some(contact_def) = store.table_def(contact::TABLE)? else {
            return Err(connection_error(&config.path, &"not a phone book database"));
        };
        if contact_def.has_field(contact::PICTURE) {
            store.picture = Some(store.db.open_tree(PICTURE_SEGMENTS)?);
        }
        if let Some(phone_def) = store.table_def(phone_number::TABLE)? {
            debug!(
                contact_indexes = ?contact_def.indexes,
                phone_indexes = ?phone_def.indexes,
                foreign_keys = ?phone_def.foreign_keys,
                "Loaded catalog"
            );
        }

        info!(path = %store.path, pictures = store.picture.is_some(), "Opened table database");
        Ok(store)
    }

    /// Create an empty database. File storage refuses a path that already exists.
    pub fn create(config: &DatabaseConfig) -> Result<Self> {
        let db = match config.storage {
            StorageMode::File => {
                let path = Path::new(&config.path);
                if path.exists() {
                    return Err(connection_error(&config.path, &"path already exists"));
                }
                sled::Config::new()
                    .path(path)
                    .open()
                    .map_err(|e| connection_error(&config.path, &e))?
            }
            StorageMode::Memory => {
                info!(bytes = config.memory_storage_size, "Creating memory storage");
                sled::Config::new()
                    .temporary(true)
                    .cache_capacity(config.memory_storage_size)
                    .open()
                    .map_err(|e| connection_error(&config.path, &e))?
            }
        };
        Self::from_db(db, &config.path)
    }

    fn from_db(db: sled::Db, path: &str) -> Result<Self> {
        Ok(Self {
            catalog: db.open_tree(CATALOG)?,
            contact: db.open_tree(contact::TABLE)?,
            contact_by_name: db.open_tree(format!("{}.{}", contact::TABLE, contact::BY_NAME))?,
            phone_number: db.open_tree(phone_number::TABLE)?,
            phone_number_by_contact_id: db.open_tree(format!(
                "{}.{}",
                phone_number::TABLE,
                phone_number::BY_CONTACT_ID
            ))?,
            picture: None,
            db,
            path: path.to_string(),
            locked_rows: BTreeSet::new(),
            in_transaction: false,
        })
    }

    fn table_def(&self, table: &str) -> Result<Option<TableDef>> {
        self.catalog
            .get(catalog_table_key(table))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn define_table(&self, table: &'static str, def: &TableDef) -> Result<()> {
        let key = catalog_table_key(table);
        let bytes = encode(def)?;
        let previous = self
            .catalog
            .compare_and_swap(key, None as Option<&[u8]>, Some(bytes))
            .map_err(|e| PhoneBookError::TableDefinition {
                table,
                message: e.to_string(),
            })?;
        previous.map_err(|_| PhoneBookError::TableDefinition {
            table,
            message: "table already exists".to_string(),
        })
    }

    fn contact_record(&self, id: ContactId) -> Result<Option<ContactRecord>> {
        self.contact.get(row_key(id))?.map(|bytes| decode(&bytes)).transpose()
    }

    fn picture_tree(&self, id: ContactId) -> Result<&sled::Tree> {
        self.picture.as_ref().ok_or(PhoneBookError::PictureMissing(id))
    }

    /// Stored picture length; `None` without a picture field or picture.
    fn stored_picture_len(&self, id: ContactId) -> Result<Option<u64>> {
        if self.picture.is_none() {
            return Ok(None);
        }
        let record = self.contact_record(id)?.ok_or(PhoneBookError::ContactNotFound(id))?;
        Ok(record.picture_len)
    }

    /// Length of the stored picture, failing when there is none.
    fn picture_len(&self, id: ContactId) -> Result<u64> {
        self.stored_picture_len(id)?.ok_or(PhoneBookError::PictureMissing(id))
    }

    fn remove_picture_segments(&self, id: ContactId) -> Result<()> {
        if let Some(segments) = &self.picture {
            for key in segments.scan_prefix(row_key(id)).keys() {
                segments.remove(key?)?;
            }
        }
        Ok(())
    }

    /// Walk an index in key order, yielding row keys.
    fn index_rows(index: &sled::Tree, prefix: &[u8]) -> Result<Vec<u64>> {
        let mut rows = Vec::new();
        for key in index.scan_prefix(prefix).keys() {
            rows.push(index_row(&key?)?);
        }
        Ok(rows)
    }

    fn all_contacts(&self) -> Result<Vec<Contact>> {
        let mut contacts = Vec::new();
        for row in self.contact.iter().values() {
            let record: ContactRecord = decode(&row?)?;
            contacts.push(record.to_contact());
        }
        Ok(contacts)
    }

    fn contacts_by_name(&self) -> Result<Vec<Contact>> {
        let mut contacts = Vec::new();
        for id in Self::index_rows(&self.contact_by_name, &[])? {
            if let Some(record) = self.contact_record(id)? {
                contacts.push(record.to_contact());
            }
        }
        Ok(contacts)
    }

    fn phone_number_rows(&self, contact_id: ContactId) -> Result<Vec<u64>> {
        Self::index_rows(&self.phone_number_by_contact_id, &index_prefix(&row_key(contact_id)))
    }
}

fn connection_error(path: &str, err: &dyn std::fmt::Display) -> PhoneBookError {
    PhoneBookError::Connection {
        path: path.to_string(),
        message: err.to_string(),
    }
}

/// NULL ring ids sort before any value.
fn ring_id_then_name(a: &Contact, b: &Contact) -> Ordering {
    a.ring_id
        .cmp(&b.ring_id)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

impl super::RowStore for TableStore {
    fn backend(&self) -> Backend {
        Backend::Table
    }

    fn has_picture_field(&self) -> bool {
        self.picture.is_some()
    }

    fn create_tables(&mut self, with_picture: bool) -> Result<()> {
        let mut contact_fields = vec![
            contact::ID.to_string(),
            contact::NAME.to_string(),
            contact::RING_ID.to_string(),
            contact::PICTURE_NAME.to_string(),
        ];
        if with_picture {
            contact_fields.push(contact::PICTURE.to_string());
        }
        self.define_table(
            contact::TABLE,
            &TableDef {
                fields: contact_fields,
                indexes: vec![contact::BY_ID.to_string(), contact::BY_NAME.to_string()],
                foreign_keys: Vec::new(),
            },
        )?;
        self.define_table(
            phone_number::TABLE,
            &TableDef {
                fields: vec![
                    phone_number::CONTACT_ID.to_string(),
                    phone_number::NUMBER.to_string(),
                    phone_number::TYPE.to_string(),
                    phone_number::SPEED_DIAL.to_string(),
                ],
                indexes: vec![phone_number::BY_CONTACT_ID.to_string()],
                foreign_keys: vec![phone_number::CONTACT_REF.to_string()],
            },
        )?;

        if with_picture {
            let segments = self.db.open_tree(PICTURE_SEGMENTS).map_err(|e| PhoneBookError::TableDefinition {
                table: contact::TABLE,
                message: e.to_string(),
            })?;
            self.picture = Some(segments);
        }
        debug!(pictures = with_picture, "Created tables");
        Ok(())
    }

    fn create_sequences(&mut self) -> Result<()> {
        let key = catalog_sequence_key(sequences::CONTACT_ID);
        let defined = self
            .catalog
            .compare_and_swap(key, None as Option<&[u8]>, Some(&row_key(sequences::START)[..]))
            .map_err(|e| PhoneBookError::SequenceDefinition {
                sequence: sequences::CONTACT_ID,
                message: e.to_string(),
            })?;
        defined.map_err(|_| PhoneBookError::SequenceDefinition {
            sequence: sequences::CONTACT_ID,
            message: "sequence already exists".to_string(),
        })
    }

    fn next_contact_id(&mut self) -> Result<ContactId> {
        let key = catalog_sequence_key(sequences::CONTACT_ID);
        let previous = self.catalog.fetch_and_update(key, |current| {
            current
                .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
                .map(|bytes| row_key(u64::from_be_bytes(bytes) + 1).to_vec())
        })?;
        match previous {
            Some(bytes) => decode_row_key(&bytes),
            None => Err(PhoneBookError::DatabaseNotFound(format!("sequence {}", sequences::CONTACT_ID))),
        }
    }

    fn insert_contact(&mut self, new: &Contact) -> Result<()> {
        let record = ContactRecord {
            id: new.id,
            name: new.name.clone(),
            ring_id: new.ring_id,
            picture_name: new.picture_name.clone(),
            picture_len: None,
        };
        let bytes = encode(&record)?;
        let key = row_key(new.id);
        let name_key = index_key(new.name.as_bytes(), new.id);

        (&self.contact, &self.contact_by_name)
            .transaction(|(rows, by_name)| -> TxResult {
                if rows.get(key)?.is_some() {
                    return Err(abort(PhoneBookError::ConstraintViolation(format!(
                        "duplicate key {} in index {}",
                        new.id,
                        contact::BY_ID
                    ))));
                }
                rows.insert(&key[..], bytes.clone())?;
                by_name.insert(name_key.clone(), sled::IVec::default())?;
                Ok(())
            })
            .map_err(from_transaction)
    }

    fn find_contact(&self, id: ContactId) -> Result<Option<Contact>> {
        Ok(self.contact_record(id)?.map(|record| record.to_contact()))
    }

    fn update_contact_name(&mut self, id: ContactId, name: &str) -> Result<bool> {
        let Some(mut record) = self.contact_record(id)? else {
            return Ok(false);
        };
        let old_name_key = index_key(record.name.as_bytes(), id);
        let new_name_key = index_key(name.as_bytes(), id);
        record.name = name.to_string();
        let bytes = encode(&record)?;

        (&self.contact, &self.contact_by_name)
            .transaction(|(rows, by_name)| -> TxResult {
                rows.insert(&row_key(id)[..], bytes.clone())?;
                by_name.remove(old_name_key.clone())?;
                by_name.insert(new_name_key.clone(), sled::IVec::default())?;
                Ok(())
            })
            .map_err(from_transaction)?;
        Ok(true)
    }

    fn update_picture_name(&mut self, id: ContactId, picture_name: Option<String>) -> Result<bool> {
        let Some(mut record) = self.contact_record(id)? else {
            return Ok(false);
        };
        record.picture_name = picture_name;
        self.contact.insert(row_key(id), encode(&record)?)?;
        Ok(true)
    }

    fn lock_contact(&mut self, id: ContactId) -> Result<()> {
        if self.contact_record(id)?.is_none() {
            return Err(PhoneBookError::ContactNotFound(id));
        }
        // Outside a transaction the lock ends with the statement
        if !self.in_transaction {
            return Ok(());
        }
        self.locked_rows.insert(id);
        debug!(contact_id = id, "Locked contact row");
        Ok(())
    }

    fn delete_phone_numbers(&mut self, contact_id: ContactId) -> Result<usize> {
        let rows = self.phone_number_rows(contact_id)?;
        for row in &rows {
            let index = index_key(&row_key(contact_id), *row);
            (&self.phone_number, &self.phone_number_by_contact_id)
                .transaction(|(phones, by_contact)| -> TxResult {
                    phones.remove(&row_key(*row)[..])?;
                    by_contact.remove(index.clone())?;
                    Ok(())
                })
                .map_err(from_transaction)?;
        }
        Ok(rows.len())
    }

    fn delete_contact(&mut self, id: ContactId) -> Result<bool> {
        let Some(record) = self.contact_record(id)? else {
            return Ok(false);
        };
        // Restrict: children must be removed first
        if !self.phone_number_rows(id)?.is_empty() {
            return Err(PhoneBookError::ConstraintViolation(format!(
                "contact {id} is still referenced by {}",
                phone_number::CONTACT_REF
            )));
        }

        let name_key = index_key(record.name.as_bytes(), id);
        (&self.contact, &self.contact_by_name)
            .transaction(|(rows, by_name)| -> TxResult {
                rows.remove(&row_key(id)[..])?;
                by_name.remove(name_key.clone())?;
                Ok(())
            })
            .map_err(from_transaction)?;
        self.remove_picture_segments(id)?;
        Ok(true)
    }

    fn insert_phone_number(&mut self, phone: &PhoneNumber) -> Result<()> {
        let row = self.db.generate_id()?;
        let bytes = encode(&PhoneNumberRecord {
            contact_id: phone.contact_id,
            number: phone.number.clone(),
            number_type: phone.number_type.code(),
            speed_dial: phone.speed_dial,
        })?;
        let contact_key = row_key(phone.contact_id);
        let index = index_key(&contact_key, row);

        (&self.contact, &self.phone_number, &self.phone_number_by_contact_id)
            .transaction(|(contacts, phones, by_contact)| -> TxResult {
                if contacts.get(contact_key)?.is_none() {
                    return Err(abort(PhoneBookError::ConstraintViolation(format!(
                        "{} has no contact with id {}",
                        phone_number::CONTACT_REF,
                        phone.contact_id
                    ))));
                }
                phones.insert(&row_key(row)[..], bytes.clone())?;
                by_contact.insert(index.clone(), sled::IVec::default())?;
                Ok(())
            })
            .map_err(from_transaction)
    }

    fn phone_numbers(&self, contact_id: ContactId) -> Result<Vec<PhoneNumber>> {
        let mut numbers = Vec::new();
        for row in self.phone_number_rows(contact_id)? {
            if let Some(bytes) = self.phone_number.get(row_key(row))? {
                let record: PhoneNumberRecord = decode(&bytes)?;
                numbers.push(record.to_phone_number()?);
            }
        }
        // Row keys ascend with insertion, so a stable sort keeps that order within a type
        numbers.sort_by_key(|phone| phone.number_type);
        Ok(numbers)
    }

    fn list_contacts_brief(&self) -> Result<Vec<ContactBrief>> {
        Ok(self
            .contacts_by_name()?
            .into_iter()
            .map(|contact| ContactBrief {
                id: contact.id,
                name: contact.name,
            })
            .collect())
    }

    fn list_contacts(&self, sort: SortMode) -> Result<Vec<ContactListing>> {
        let contacts = match sort {
            SortMode::ById => self.all_contacts()?,
            SortMode::ByName => self.contacts_by_name()?,
            SortMode::ByRingIdName => {
                // No index covers (ring_id, name): sort a snapshot
                let mut contacts = self.all_contacts()?;
                contacts.sort_by(ring_id_then_name);
                contacts
            }
        };

        contacts
            .into_iter()
            .map(|contact| {
                let phone_numbers = self.phone_numbers(contact.id)?;
                Ok(ContactListing { contact, phone_numbers })
            })
            .collect()
    }

    fn picture_size(&self, id: ContactId) -> Result<Option<u64>> {
        self.stored_picture_len(id)
    }

    fn resize_picture(&mut self, id: ContactId, len: u64) -> Result<()> {
        self.picture_tree(id)?;
        let mut record = self.contact_record(id)?.ok_or(PhoneBookError::ContactNotFound(id))?;
        self.remove_picture_segments(id)?;
        record.picture_len = Some(len);
        self.contact.insert(row_key(id), encode(&record)?)?;
        Ok(())
    }

    fn write_picture(&mut self, id: ContactId, offset: u64, data: &[u8]) -> Result<()> {
        let len = self.picture_len(id)?;
        let end = offset + data.len() as u64;
        if end > len {
            return Err(PhoneBookError::InvalidInput(format!(
                "picture write of {} bytes at offset {offset} exceeds size {len}",
                data.len()
            )));
        }
        let segments = self.picture_tree(id)?;

        let mut position = offset;
        let mut remaining = data;
        while !remaining.is_empty() {
            let segment = position / SEGMENT_SIZE;
            let segment_start = segment * SEGMENT_SIZE;
            let segment_len = usize::try_from(SEGMENT_SIZE.min(len - segment_start))
                .map_err(|_| PhoneBookError::InvalidInput("segment too large".to_string()))?;
            let within = usize::try_from(position - segment_start)
                .map_err(|_| PhoneBookError::InvalidInput("segment offset too large".to_string()))?;
            let take = remaining.len().min(segment_len - within);

            let key = segment_key(id, segment);
            let mut bytes = segments
                .get(key)?
                .map_or_else(|| vec![0u8; segment_len], |existing| existing.to_vec());
            bytes.resize(segment_len, 0);
            bytes[within..within + take].copy_from_slice(&remaining[..take]);
            segments.insert(key, bytes)?;

            position += take as u64;
            remaining = &remaining[take..];
        }
        Ok(())
    }

    fn read_picture(&self, id: ContactId, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let len = self.picture_len(id)?;
        let segments = self.picture_tree(id)?;
        if offset >= len {
            return Ok(0);
        }

        let available = usize::try_from(len - offset).unwrap_or(usize::MAX);
        let total = buf.len().min(available);
        let mut filled = 0;
        while filled < total {
            let position = offset + filled as u64;
            let segment = position / SEGMENT_SIZE;
            let within = usize::try_from(position - segment * SEGMENT_SIZE)
                .map_err(|_| PhoneBookError::InvalidInput("segment offset too large".to_string()))?;
            let segment_len = usize::try_from(SEGMENT_SIZE.min(len - segment * SEGMENT_SIZE))
                .map_err(|_| PhoneBookError::InvalidInput("segment too large".to_string()))?;
            let take = (total - filled).min(segment_len - within);

            // Segments never written read back as zeros
            match segments.get(segment_key(id, segment))? {
                Some(bytes) => buf[filled..filled + take].copy_from_slice(&bytes[within..within + take]),
                None => buf[filled..filled + take].fill(0),
            }
            filled += take;
        }
        Ok(filled)
    }

    fn tx_start(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(PhoneBookError::Transaction("transaction already active".to_string()));
        }
        self.in_transaction = true;
        Ok(())
    }

    fn tx_commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(PhoneBookError::Transaction("no transaction is active".to_string()));
        }
        self.db.flush()?;
        self.in_transaction = false;
        if !self.locked_rows.is_empty() {
            debug!(rows = self.locked_rows.len(), "Released row locks");
            self.locked_rows.clear();
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.db.flush()?;
        self.in_transaction = false;
        self.locked_rows.clear();
        info!(path = %self.path, "Closed table database");
        Ok(())
    }
}
