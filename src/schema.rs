//! Database schema definitions
//!
//! Table, column, index and sequence names shared by both storage backends,
//! plus the SQL DDL used by the SQL backend.

/// Maximum contact name length in characters
pub const MAX_CONTACT_NAME: usize = 50;
/// Maximum picture name length in bytes
pub const MAX_PICTURE_NAME: usize = 50;
/// Maximum phone number length in bytes
pub const MAX_PHONE_NUMBER: usize = 20;

/// Contact table schema
pub mod contact {
    /// Table name
    pub const TABLE: &str = "contact";
    /// Primary key column
    pub const ID: &str = "id";
    /// Contact name column
    pub const NAME: &str = "name";
    /// Ring tone column
    pub const RING_ID: &str = "ring_id";
    /// Picture file name column
    pub const PICTURE_NAME: &str = "picture_name";
    /// Picture BLOB column, only present with picture support
    pub const PICTURE: &str = "picture";
    /// Primary key index
    pub const BY_ID: &str = "by_id";
    /// Non-unique name index
    pub const BY_NAME: &str = "by_name";
}

/// Phone number table schema
pub mod phone_number {
    /// Table name
    pub const TABLE: &str = "phone_number";
    /// Foreign key to contact.id
    pub const CONTACT_ID: &str = "contact_id";
    /// Number column
    pub const NUMBER: &str = "number";
    /// Number type code column
    pub const TYPE: &str = "type";
    /// Speed dial column
    pub const SPEED_DIAL: &str = "speed_dial";
    /// Non-unique contact index
    pub const BY_CONTACT_ID: &str = "by_contact_id";
    /// Foreign key constraint name
    pub const CONTACT_REF: &str = "contact_ref";
}

/// Sequence catalog
pub mod sequences {
    /// Catalog table name (SQL backend)
    pub const TABLE: &str = "sequences";
    /// Sequence name column
    pub const NAME: &str = "name";
    /// Next value column
    pub const NEXT_VALUE: &str = "next_value";
    /// Contact id sequence
    pub const CONTACT_ID: &str = "contact_id";
    /// First value handed out by a new sequence
    pub const START: u64 = 1;
}

/// DDL creating the `contact` table and its name index.
///
/// Without picture support the `picture` column is left out entirely.
#[must_use]
pub fn contact_ddl(with_picture: bool) -> String {
    let picture = if with_picture {
        format!("  {} BLOB,\n", contact::PICTURE)
    } else {
        String::new()
    };
    format!(
        "CREATE TABLE {table} (\n\
         \x20 {id} INTEGER NOT NULL,\n\
         \x20 {name} TEXT NOT NULL CHECK (length({name}) <= {max_name}),\n\
         \x20 {ring_id} INTEGER CHECK ({ring_id} >= 0),\n\
         \x20 {picture_name} TEXT CHECK (length(CAST({picture_name} AS BLOB)) <= {max_picture}),\n\
         {picture}\
         \x20 CONSTRAINT {by_id} PRIMARY KEY ({id})\n\
         );\n\
         CREATE INDEX {by_name} ON {table}({name});",
        table = contact::TABLE,
        id = contact::ID,
        name = contact::NAME,
        ring_id = contact::RING_ID,
        picture_name = contact::PICTURE_NAME,
        picture = picture,
        by_id = contact::BY_ID,
        by_name = contact::BY_NAME,
        max_name = MAX_CONTACT_NAME,
        max_picture = MAX_PICTURE_NAME,
    )
}

/// DDL creating the `phone_number` table, its contact index and foreign key.
#[must_use]
pub fn phone_number_ddl() -> String {
    format!(
        "CREATE TABLE {table} (\n\
         \x20 {contact_id} INTEGER NOT NULL,\n\
         \x20 {number} TEXT NOT NULL CHECK (length(CAST({number} AS BLOB)) <= {max_number}),\n\
         \x20 {kind} INTEGER NOT NULL CHECK ({kind} BETWEEN 0 AND 4),\n\
         \x20 {speed_dial} INTEGER,\n\
         \x20 CONSTRAINT {contact_ref} FOREIGN KEY ({contact_id}) REFERENCES {contact}({id})\n\
         \x20   MATCH SIMPLE ON UPDATE RESTRICT ON DELETE RESTRICT\n\
         );\n\
         CREATE INDEX {by_contact_id} ON {table}({contact_id});",
        table = phone_number::TABLE,
        contact_id = phone_number::CONTACT_ID,
        number = phone_number::NUMBER,
        kind = phone_number::TYPE,
        speed_dial = phone_number::SPEED_DIAL,
        contact_ref = phone_number::CONTACT_REF,
        contact = contact::TABLE,
        id = contact::ID,
        by_contact_id = phone_number::BY_CONTACT_ID,
        max_number = MAX_PHONE_NUMBER,
    )
}

/// DDL creating the sequence catalog and the contact id sequence.
#[must_use]
pub fn sequences_ddl() -> String {
    format!(
        "CREATE TABLE {table} (\n\
         \x20 {name} TEXT NOT NULL PRIMARY KEY,\n\
         \x20 {next_value} INTEGER NOT NULL\n\
         );\n\
         INSERT INTO {table} ({name}, {next_value}) VALUES ('{contact_id}', {start});",
        table = sequences::TABLE,
        name = sequences::NAME,
        next_value = sequences::NEXT_VALUE,
        contact_id = sequences::CONTACT_ID,
        start = sequences::START,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_ddl_branches_on_picture() {
        assert!(contact_ddl(true).contains("picture BLOB"));
        assert!(!contact_ddl(false).contains("picture BLOB"));
        assert!(contact_ddl(false).contains("picture_name TEXT"));
    }

    #[test]
    fn test_ddl_is_valid_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().expect("open");
        conn.execute_batch(&contact_ddl(true)).expect("contact");
        conn.execute_batch(&phone_number_ddl()).expect("phone_number");
        conn.execute_batch(&sequences_ddl()).expect("sequences");
        let next: i64 = conn
            .query_row("SELECT next_value FROM sequences WHERE name = 'contact_id'", [], |row| row.get(0))
            .expect("sequence row");
        assert_eq!(next, 1);
    }
}
