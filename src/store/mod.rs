//! Row storage backends.
//!
//! [`RowStore`] is the seam between the phone book operations and the storage
//! engine. Two backends implement it:
//!
//! - [`TableStore`]: navigational tables, indexes and cursors over sled
//! - [`SqlStore`]: parameterized SQL statements over SQLite
//!
//! Business rules (cascading removal, picture chunking, sentinel handling) live
//! in [`crate::phonebook`], never in a backend.

mod sql;
mod table;

pub use sql::SqlStore;
pub use table::TableStore;

use crate::config::{Backend, DatabaseConfig};
use crate::error::Result;
use crate::models::{Contact, ContactBrief, ContactId, ContactListing, PhoneNumber, SortMode};

/// Access to the `contact` and `phone_number` tables and the `contact_id` sequence.
#[cfg_attr(test, mockall::automock)]
pub trait RowStore {
    /// Which engine this is.
    fn backend(&self) -> Backend;

    /// Whether the `contact` table has a `picture` field.
    fn has_picture_field(&self) -> bool;

    /// Define both tables, their indexes and the foreign key.
    fn create_tables(&mut self, with_picture: bool) -> Result<()>;

    /// Define the `contact_id` sequence starting at 1.
    fn create_sequences(&mut self) -> Result<()>;

    /// Atomically take the next value of the `contact_id` sequence.
    fn next_contact_id(&mut self) -> Result<ContactId>;

    /// Write a new contact row.
    fn insert_contact(&mut self, contact: &Contact) -> Result<()>;

    /// Primary-key seek.
    fn find_contact(&self, id: ContactId) -> Result<Option<Contact>>;

    /// Edit the name in place. Returns false when no row has this id.
    fn update_contact_name(&mut self, id: ContactId, name: &str) -> Result<bool>;

    /// Edit the picture name in place. Returns false when no row has this id.
    fn update_picture_name(&mut self, id: ContactId, picture_name: Option<String>) -> Result<bool>;

    /// Take an exclusive lock on a contact row until the transaction commits.
    fn lock_contact(&mut self, id: ContactId) -> Result<()>;

    /// Delete every phone number of a contact through the contact index.
    fn delete_phone_numbers(&mut self, contact_id: ContactId) -> Result<usize>;

    /// Delete a contact row. Fails while phone numbers still reference it.
    fn delete_contact(&mut self, id: ContactId) -> Result<bool>;

    /// Write a new phone number row; the foreign key rejects unknown contacts.
    fn insert_phone_number(&mut self, phone_number: &PhoneNumber) -> Result<()>;

    /// Every phone number of a contact, ordered by type.
    fn phone_numbers(&self, contact_id: ContactId) -> Result<Vec<PhoneNumber>>;

    /// Ids and names ordered by name.
    fn list_contacts_brief(&self) -> Result<Vec<ContactBrief>>;

    /// Every contact with its phone numbers in the requested order.
    fn list_contacts(&self, sort: SortMode) -> Result<Vec<ContactListing>>;

    /// Size of a contact's picture, `None` when no picture is stored.
    fn picture_size(&self, id: ContactId) -> Result<Option<u64>>;

    /// Make the picture `len` bytes long (zero filled), replacing any old one.
    fn resize_picture(&mut self, id: ContactId, len: u64) -> Result<()>;

    /// Write bytes into the picture at `offset`; cannot grow it.
    fn write_picture(&mut self, id: ContactId, offset: u64, data: &[u8]) -> Result<()>;

    /// Read picture bytes at `offset` into `buf`, returning the count read.
    fn read_picture(&self, id: ContactId, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Begin a transaction.
    fn tx_start(&mut self) -> Result<()>;

    /// Commit the transaction, releasing row locks.
    fn tx_commit(&mut self) -> Result<()>;

    /// Flush and release the engine.
    fn close(&mut self) -> Result<()>;
}

/// Open an existing database.
///
/// Fails with [`crate::error::PhoneBookError::DatabaseNotFound`] when it has
/// to be created first.
pub fn open(config: &DatabaseConfig) -> Result<Box<dyn RowStore>> {
    Ok(match config.backend {
        Backend::Table => Box::new(TableStore::open(config)?),
        Backend::Sql => Box::new(SqlStore::open(config)?),
    })
}

/// Create an empty database, overwriting any existing one. No schema yet.
pub fn create(config: &DatabaseConfig) -> Result<Box<dyn RowStore>> {
    Ok(match config.backend {
        Backend::Table => Box::new(TableStore::create(config)?),
        Backend::Sql => Box::new(SqlStore::create(config)?),
    })
}
