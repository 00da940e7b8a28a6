//! Phone book operations over a [`RowStore`].
//!
//! The business rules live here once for both engines: input validation,
//! id allocation before the row write, cascading contact removal, and
//! chunked picture transfer. Every public operation is timed, counted and,
//! on failure, reported with its status code before the error is returned.

use std::path::Path;

use tracing::{info, warn};

use crate::config::{Backend, DatabaseConfig};
use crate::error::{self, PhoneBookError, Result};
use crate::logging::OperationTimer;
use crate::metrics::MetricsCollector;
use crate::models::{
    Contact, ContactBrief, ContactId, ContactListing, NewContact, PhoneNumber, PhoneNumberType, SortMode,
};
use crate::picture;
use crate::store::{self, RowStore};
use crate::validation::InputValidator;

/// An open phone book database
pub struct PhoneBook {
    store: Box<dyn RowStore>,
    chunk_size: usize,
    metrics: MetricsCollector,
}

impl PhoneBook {
    pub fn new(store: Box<dyn RowStore>, chunk_size: usize) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
            metrics: MetricsCollector::default(),
        }
    }

    /// Open an existing database.
    ///
    /// Returns [`PhoneBookError::DatabaseNotFound`] when the database has to
    /// be created with [`PhoneBook::create_database`] first.
    pub fn open_database(config: &DatabaseConfig, chunk_size: usize) -> Result<Self> {
        let store = store::open(config)?;
        info!(backend = ?config.backend, storage = ?config.storage, path = %config.path, "Database opened");
        Ok(Self::new(store, chunk_size))
    }

    /// Create a fresh database with both tables and the id sequence.
    pub fn create_database(config: &DatabaseConfig, chunk_size: usize) -> Result<Self> {
        let mut store = store::create(config)?;
        store.create_tables(config.with_picture())?;
        store.create_sequences()?;
        info!(
            backend = ?config.backend,
            storage = ?config.storage,
            pictures = config.with_picture(),
            "Database created"
        );
        Ok(Self::new(store, chunk_size))
    }

    /// Release the engine. Consumes the phone book so it happens once.
    pub fn close_database(mut self) -> Result<()> {
        self.store.close()?;
        info!(
            operations = self.metrics.operations_total,
            errors = self.metrics.errors_total,
            picture_bytes_written = self.metrics.picture_bytes_written,
            picture_bytes_read = self.metrics.picture_bytes_read,
            "Database closed"
        );
        Ok(())
    }

    pub fn backend(&self) -> Backend {
        self.store.backend()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn tx_start(&mut self) -> Result<()> {
        self.observe("tx_start", |book| book.store.tx_start())
    }

    pub fn tx_commit(&mut self) -> Result<()> {
        self.observe("tx_commit", |book| book.store.tx_commit())
    }

    /// Run `operation` between `tx_start` and `tx_commit`.
    ///
    /// The commit is attempted even when the operation failed, and whatever
    /// it already wrote stays written. The operation's error wins over a
    /// commit error.
    pub fn in_transaction<T>(&mut self, operation: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.tx_start()?;
        let result = operation(self);
        let committed = self.tx_commit();
        let value = result?;
        committed?;
        Ok(value)
    }

    /// Add a contact and, when possible, its picture. Returns the new id.
    pub fn insert_contact(&mut self, new: &NewContact) -> Result<ContactId> {
        self.observe("insert_contact", |book| {
            InputValidator::validate_contact_name(&new.name)?;
            let picture_name = new.picture_name();
            if let Some(name) = &picture_name {
                InputValidator::validate_picture_name(name)?;
            }

            let id = book.store.next_contact_id()?;
            book.store.insert_contact(&Contact {
                id,
                name: new.name.clone(),
                ring_id: new.ring_id,
                picture_name,
            })?;
            info!(contact_id = id, name = %new.name, "Inserted contact");

            if let Some(path) = &new.picture_path {
                book.import_picture_if_possible(id, path)?;
            }
            Ok(id)
        })
    }

    /// The row is kept when the picture cannot be imported.
    fn import_picture_if_possible(&mut self, id: ContactId, path: &Path) -> Result<()> {
        if !self.store.has_picture_field() {
            warn!(contact_id = id, path = %path.display(), "Storage keeps no pictures, skipping picture");
            return Ok(());
        }
        let opened = match picture::open_picture(path) {
            Ok(opened) => opened,
            Err(err) => {
                warn!(contact_id = id, error = %err, "Picture not stored");
                return Ok(());
            }
        };
        let bytes = picture::store_picture(self.store.as_mut(), id, opened, path, self.chunk_size)?;
        self.metrics.record_picture_write(bytes);
        Ok(())
    }

    /// Replace a contact's picture and picture name from a file.
    pub fn update_contact_picture(&mut self, id: ContactId, path: &Path) -> Result<u64> {
        self.observe("update_contact_picture", |book| {
            let picture_name = NewContact::default().with_picture(path).picture_name();
            if let Some(name) = &picture_name {
                InputValidator::validate_picture_name(name)?;
            }
            if book.store.find_contact(id)?.is_none() {
                return Err(PhoneBookError::ContactNotFound(id));
            }
            if !book.store.has_picture_field() {
                return Err(PhoneBookError::InvalidInput("storage keeps no pictures".to_string()));
            }

            let opened = picture::open_picture(path)?;
            let bytes = picture::store_picture(book.store.as_mut(), id, opened, path, book.chunk_size)?;
            book.metrics.record_picture_write(bytes);
            book.store.update_picture_name(id, picture_name)?;
            info!(contact_id = id, bytes, "Updated contact picture");
            Ok(bytes)
        })
    }

    /// Add a phone number to an existing contact.
    pub fn insert_phone_number(
        &mut self,
        contact_id: ContactId,
        number: &str,
        number_type: PhoneNumberType,
        speed_dial: Option<i32>,
    ) -> Result<()> {
        self.observe("insert_phone_number", |book| {
            InputValidator::validate_phone_number(number)?;
            book.store
                .insert_phone_number(&PhoneNumber::new(contact_id, number, number_type, speed_dial))?;
            info!(contact_id, number, number_type = %number_type, "Inserted phone number");
            Ok(())
        })
    }

    /// Rename a contact in place.
    pub fn update_contact_name(&mut self, id: ContactId, name: &str) -> Result<()> {
        self.observe("update_contact_name", |book| {
            InputValidator::validate_contact_name(name)?;
            if !book.store.update_contact_name(id, name)? {
                return Err(PhoneBookError::ContactNotFound(id));
            }
            info!(contact_id = id, name, "Renamed contact");
            Ok(())
        })
    }

    /// Remove a contact and all of its phone numbers.
    ///
    /// Returns the number of phone numbers removed with it.
    pub fn remove_contact(&mut self, id: ContactId) -> Result<usize> {
        self.observe("remove_contact", |book| {
            if book.store.find_contact(id)?.is_none() {
                return Err(PhoneBookError::ContactNotFound(id));
            }
            book.store.lock_contact(id)?;
            let phone_numbers = book.store.delete_phone_numbers(id)?;
            if !book.store.delete_contact(id)? {
                return Err(PhoneBookError::ContactNotFound(id));
            }
            info!(contact_id = id, phone_numbers, "Removed contact");
            Ok(phone_numbers)
        })
    }

    pub fn list_contacts_brief(&mut self) -> Result<Vec<ContactBrief>> {
        self.observe("list_contacts_brief", |book| book.store.list_contacts_brief())
    }

    pub fn list_contacts(&mut self, sort: SortMode) -> Result<Vec<ContactListing>> {
        self.observe("list_contacts", |book| book.store.list_contacts(sort))
    }

    pub fn list_phone_numbers(&mut self, contact_id: ContactId) -> Result<Vec<PhoneNumber>> {
        self.observe("list_phone_numbers", |book| book.store.phone_numbers(contact_id))
    }

    /// Stored picture name, empty when the contact or the name is missing.
    pub fn get_picture_name(&mut self, id: ContactId) -> Result<String> {
        self.observe("get_picture_name", |book| {
            Ok(book
                .store
                .find_contact(id)?
                .and_then(|contact| contact.picture_name)
                .unwrap_or_default())
        })
    }

    /// Write a contact's picture to `output`. Returns the bytes written.
    ///
    /// No file is created when the contact or its picture is missing.
    pub fn export_picture(&mut self, id: ContactId, output: &Path) -> Result<u64> {
        self.observe("export_picture", |book| {
            if book.store.find_contact(id)?.is_none() {
                return Err(PhoneBookError::ContactNotFound(id));
            }
            let size = book.store.picture_size(id)?.ok_or(PhoneBookError::PictureMissing(id))?;
            let bytes = picture::export_picture(book.store.as_ref(), id, size, output, book.chunk_size)?;
            book.metrics.record_picture_read(bytes);
            Ok(bytes)
        })
    }

    /// Fill a new database with Bob, Sue and Fred.
    pub fn populate_sample_data(&mut self, default_picture: &Path) -> Result<()> {
        let bob = self.insert_contact(&NewContact::named("Bob").with_picture(default_picture))?;
        self.insert_phone_number(bob, "206-555-1000", PhoneNumberType::Mobile, None)?;

        let sue = self.insert_contact(&NewContact::named("Sue").with_ring_id(7).with_picture(default_picture))?;
        self.insert_phone_number(sue, "206-555-3890", PhoneNumberType::Home, Some(0))?;

        let fred = self.insert_contact(&NewContact::named("Fred").with_ring_id(7).with_picture(default_picture))?;
        self.insert_phone_number(fred, "206-555-1308", PhoneNumberType::Home, Some(5))?;
        self.insert_phone_number(fred, "206-555-2335", PhoneNumberType::Mobile, None)?;
        self.insert_phone_number(fred, "206-555-5361", PhoneNumberType::Pager, None)?;

        info!(contacts = 3, "Populated sample data");
        Ok(())
    }

    fn observe<T>(&mut self, operation: &'static str, body: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let timer = OperationTimer::new(operation);
        let result = body(self);
        self.metrics.record_operation(operation, timer.finish(), result.is_ok());
        if let Err(err) = &result {
            error::report(operation, err);
        }
        result
    }
}
