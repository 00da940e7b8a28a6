//! SQL backend over SQLite.
//!
//! Every row operation is a parameterized statement with positional
//! placeholders. Pictures go through SQLite's incremental BLOB I/O, which is
//! independent of the row's other fields, so a picture is first sized with
//! `zeroblob` and then written chunk by chunk.

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, MAIN_DB};
use tracing::{debug, info};

use crate::config::{Backend, DatabaseConfig, StorageMode};
use crate::error::{PhoneBookError, Result};
use crate::models::{Contact, ContactBrief, ContactId, ContactListing, PhoneNumber, PhoneNumberType, SortMode};
use crate::schema::{self, contact, phone_number, sequences};

const PAGE_SIZE: u64 = 4096;

/// Phone book storage in a SQLite database
pub struct SqlStore {
    conn: Connection,
    path: String,
    has_picture: bool,
}

impl SqlStore {
    /// Open an existing database file. Memory storage never pre-exists.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        if config.storage == StorageMode::Memory || !Path::new(&config.path).exists() {
            return Err(PhoneBookError::DatabaseNotFound(config.path.clone()));
        }

        let conn = Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| connection_error(&config.path, &e))?;
        Self::configure(&conn, &config.path)?;

        let mut store = Self {
            conn,
            path: config.path.clone(),
            has_picture: false,
        };
        // An existing file without the schema belongs to someone else
        let has_schema = store
            .table_exists(contact::TABLE)
            .map_err(|e| connection_error(&config.path, &e))?;
        if !has_schema {
            return Err(connection_error(&config.path, &"not a phone book database"));
        }
        store.has_picture = store.column_exists(contact::TABLE, contact::PICTURE)?;

        info!(path = %store.path, pictures = store.has_picture, "Opened SQL database");
        Ok(store)
    }

    /// Create an empty database. File storage refuses a path that already exists.
    pub fn create(config: &DatabaseConfig) -> Result<Self> {
        let conn = match config.storage {
            StorageMode::File => {
                let path = Path::new(&config.path);
                if path.exists() {
                    return Err(connection_error(&config.path, &"path already exists"));
                }
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent).map_err(|e| connection_error(&config.path, &e))?;
                }
                Connection::open(path).map_err(|e| connection_error(&config.path, &e))?
            }
            StorageMode::Memory => {
                let conn = Connection::open_in_memory().map_err(|e| connection_error(":memory:", &e))?;
                // Cap the memory database at the configured capacity
                let max_pages = (config.memory_storage_size / PAGE_SIZE).max(1);
                conn.execute_batch(&format!(
                    "PRAGMA page_size = {PAGE_SIZE}; PRAGMA max_page_count = {max_pages};"
                ))
                .map_err(|e| connection_error(":memory:", &e))?;
                info!(bytes = config.memory_storage_size, "Creating memory storage");
                conn
            }
        };
        Self::configure(&conn, &config.path)?;

        Ok(Self {
            conn,
            path: config.path.clone(),
            has_picture: false,
        })
    }

    fn configure(conn: &Connection, path: &str) -> Result<()> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| connection_error(path, &e))
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM pragma_table_info(?1) WHERE name = ?2",
            params![table, column],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn map_contact(row: &Row<'_>) -> rusqlite::Result<Contact> {
        Ok(Contact {
            id: row.get(contact::ID)?,
            name: row.get(contact::NAME)?,
            ring_id: row.get(contact::RING_ID)?,
            picture_name: row.get(contact::PICTURE_NAME)?,
        })
    }

    fn open_picture(&self, id: ContactId, read_only: bool) -> Result<rusqlite::blob::Blob<'_>> {
        let row_id = i64::try_from(id).map_err(|_| PhoneBookError::ContactNotFound(id))?;
        Ok(self
            .conn
            .blob_open(MAIN_DB, contact::TABLE, contact::PICTURE, row_id, read_only)?)
    }

    fn require_picture_field(&self, id: ContactId) -> Result<()> {
        if self.has_picture {
            Ok(())
        } else {
            Err(PhoneBookError::PictureMissing(id))
        }
    }
}

fn connection_error(path: &str, err: &dyn std::fmt::Display) -> PhoneBookError {
    PhoneBookError::Connection {
        path: path.to_string(),
        message: err.to_string(),
    }
}

fn listing_query(sort: SortMode) -> String {
    let order = match sort {
        SortMode::ById => "A.id",
        SortMode::ByName => "A.name, A.id",
        SortMode::ByRingIdName => "A.ring_id NULLS FIRST, A.name, A.id",
    };
    format!(
        "SELECT A.id, A.name, A.ring_id, A.picture_name, B.number, B.type, B.speed_dial \
         FROM {contact} A LEFT JOIN {phone} B ON A.id = B.{contact_id} \
         ORDER BY {order}, B.type, B.rowid",
        contact = contact::TABLE,
        phone = phone_number::TABLE,
        contact_id = phone_number::CONTACT_ID,
    )
}

fn phone_number_type(code: u32) -> rusqlite::Result<PhoneNumberType> {
    PhoneNumberType::try_from(code)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Integer, Box::new(e)))
}

impl super::RowStore for SqlStore {
    fn backend(&self) -> Backend {
        Backend::Sql
    }

    fn has_picture_field(&self) -> bool {
        self.has_picture
    }

    fn create_tables(&mut self, with_picture: bool) -> Result<()> {
        self.conn
            .execute_batch(&schema::contact_ddl(with_picture))
            .map_err(|e| PhoneBookError::TableDefinition {
                table: contact::TABLE,
                message: e.to_string(),
            })?;
        self.conn
            .execute_batch(&schema::phone_number_ddl())
            .map_err(|e| PhoneBookError::TableDefinition {
                table: phone_number::TABLE,
                message: e.to_string(),
            })?;
        self.has_picture = with_picture;
        debug!(pictures = with_picture, "Created SQL tables");
        Ok(())
    }

    fn create_sequences(&mut self) -> Result<()> {
        self.conn
            .execute_batch(&schema::sequences_ddl())
            .map_err(|e| PhoneBookError::SequenceDefinition {
                sequence: sequences::CONTACT_ID,
                message: e.to_string(),
            })
    }

    fn next_contact_id(&mut self) -> Result<ContactId> {
        let sql = format!(
            "UPDATE {table} SET {next} = {next} + 1 WHERE {name} = ?1 RETURNING {next} - 1",
            table = sequences::TABLE,
            next = sequences::NEXT_VALUE,
            name = sequences::NAME,
        );
        self.conn
            .query_row(&sql, params![sequences::CONTACT_ID], |row| row.get(0))
            .optional()?
            .ok_or_else(|| PhoneBookError::DatabaseNotFound(format!("sequence {}", sequences::CONTACT_ID)))
    }

    fn insert_contact(&mut self, contact: &Contact) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4)",
            contact::TABLE,
            contact::ID,
            contact::NAME,
            contact::RING_ID,
            contact::PICTURE_NAME
        );
        self.conn.execute(
            &sql,
            params![contact.id, contact.name, contact.ring_id, contact.picture_name],
        )?;
        Ok(())
    }

    fn find_contact(&self, id: ContactId) -> Result<Option<Contact>> {
        let sql = format!(
            "SELECT {}, {}, {}, {} FROM {} WHERE {} = ?1",
            contact::ID,
            contact::NAME,
            contact::RING_ID,
            contact::PICTURE_NAME,
            contact::TABLE,
            contact::ID
        );
        Ok(self.conn.query_row(&sql, params![id], Self::map_contact).optional()?)
    }

    fn update_contact_name(&mut self, id: ContactId, name: &str) -> Result<bool> {
        let sql = format!("UPDATE {} SET {} = ?2 WHERE {} = ?1", contact::TABLE, contact::NAME, contact::ID);
        Ok(self.conn.execute(&sql, params![id, name])? > 0)
    }

    fn update_picture_name(&mut self, id: ContactId, picture_name: Option<String>) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET {} = ?2 WHERE {} = ?1",
            contact::TABLE,
            contact::PICTURE_NAME,
            contact::ID
        );
        Ok(self.conn.execute(&sql, params![id, picture_name])? > 0)
    }

    fn lock_contact(&mut self, id: ContactId) -> Result<()> {
        // A no-op write takes the database write lock for the rest of the transaction
        let sql = format!("UPDATE {} SET {name} = {name} WHERE {} = ?1", contact::TABLE, contact::ID, name = contact::NAME);
        self.conn.execute(&sql, params![id])?;
        Ok(())
    }

    fn delete_phone_numbers(&mut self, contact_id: ContactId) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE {} = ?1", phone_number::TABLE, phone_number::CONTACT_ID);
        Ok(self.conn.execute(&sql, params![contact_id])?)
    }

    fn delete_contact(&mut self, id: ContactId) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE {} = ?1", contact::TABLE, contact::ID);
        Ok(self.conn.execute(&sql, params![id])? > 0)
    }

    fn insert_phone_number(&mut self, phone: &PhoneNumber) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4)",
            phone_number::TABLE,
            phone_number::CONTACT_ID,
            phone_number::NUMBER,
            phone_number::TYPE,
            phone_number::SPEED_DIAL
        );
        self.conn.execute(
            &sql,
            params![phone.contact_id, phone.number, phone.number_type.code(), phone.speed_dial],
        )?;
        Ok(())
    }

    fn phone_numbers(&self, contact_id: ContactId) -> Result<Vec<PhoneNumber>> {
        let sql = format!(
            "SELECT {}, {}, {}, {} FROM {} WHERE {} = ?1 ORDER BY {}, rowid",
            phone_number::CONTACT_ID,
            phone_number::NUMBER,
            phone_number::TYPE,
            phone_number::SPEED_DIAL,
            phone_number::TABLE,
            phone_number::CONTACT_ID,
            phone_number::TYPE
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![contact_id], |row| {
            Ok(PhoneNumber {
                contact_id: row.get(0)?,
                number: row.get(1)?,
                number_type: phone_number_type(row.get(2)?)?,
                speed_dial: row.get(3)?,
            })
        })?;

        let mut results = Vec::new();
        for phone in rows {
            results.push(phone?);
        }
        Ok(results)
    }

    fn list_contacts_brief(&self) -> Result<Vec<ContactBrief>> {
        let sql = format!(
            "SELECT {id}, {name} FROM {table} ORDER BY {name}, {id}",
            id = contact::ID,
            name = contact::NAME,
            table = contact::TABLE
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(ContactBrief {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;

        let mut results = Vec::new();
        for brief in rows {
            results.push(brief?);
        }
        Ok(results)
    }

    fn list_contacts(&self, sort: SortMode) -> Result<Vec<ContactListing>> {
        let mut stmt = self.conn.prepare(&listing_query(sort))?;
        let mut rows = stmt.query([])?;

        // One result row per phone number; contact fields repeat until the id changes
        let mut listings: Vec<ContactListing> = Vec::new();
        while let Some(row) = rows.next()? {
            let id: ContactId = row.get(0)?;
            if listings.last().map(|listing| listing.contact.id) != Some(id) {
                listings.push(ContactListing {
                    contact: Contact {
                        id,
                        name: row.get(1)?,
                        ring_id: row.get(2)?,
                        picture_name: row.get(3)?,
                    },
                    phone_numbers: Vec::new(),
                });
            }

            let number: Option<String> = row.get(4)?;
            if let (Some(number), Some(listing)) = (number, listings.last_mut()) {
                listing.phone_numbers.push(PhoneNumber {
                    contact_id: id,
                    number,
                    number_type: phone_number_type(row.get(5)?)?,
                    speed_dial: row.get(6)?,
                });
            }
        }
        Ok(listings)
    }

    fn picture_size(&self, id: ContactId) -> Result<Option<u64>> {
        if !self.has_picture {
            return Ok(None);
        }
        let sql = format!(
            "SELECT length({}) FROM {} WHERE {} = ?1",
            contact::PICTURE,
            contact::TABLE,
            contact::ID
        );
        let size: Option<Option<u64>> = self.conn.query_row(&sql, params![id], |row| row.get(0)).optional()?;
        size.ok_or(PhoneBookError::ContactNotFound(id))
    }

    fn resize_picture(&mut self, id: ContactId, len: u64) -> Result<()> {
        self.require_picture_field(id)?;
        let sql = format!(
            "UPDATE {} SET {} = zeroblob(?2) WHERE {} = ?1",
            contact::TABLE,
            contact::PICTURE,
            contact::ID
        );
        if self.conn.execute(&sql, params![id, len])? == 0 {
            return Err(PhoneBookError::ContactNotFound(id));
        }
        Ok(())
    }

    fn write_picture(&mut self, id: ContactId, offset: u64, data: &[u8]) -> Result<()> {
        self.require_picture_field(id)?;
        let mut blob = self.open_picture(id, false)?;
        blob.seek(SeekFrom::Start(offset))?;
        blob.write_all(data)?;
        Ok(())
    }

    fn read_picture(&self, id: ContactId, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.require_picture_field(id)?;
        let mut blob = self.open_picture(id, true)?;
        blob.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            let read = blob.read(&mut buf[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        Ok(filled)
    }

    fn tx_start(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            return Err(PhoneBookError::Transaction("transaction already active".to_string()));
        }
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn tx_commit(&mut self) -> Result<()> {
        if self.conn.is_autocommit() {
            return Err(PhoneBookError::Transaction("no transaction is active".to_string()));
        }
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        info!(path = %self.path, "Closed SQL database");
        Ok(())
    }
}
