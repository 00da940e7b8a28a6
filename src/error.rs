//! Error types for the phone book library.
//!
//! This module provides custom error types using `thiserror`. Every variant maps to
//! an [`ErrorCode`] whose name and description are what gets logged when an
//! operation fails, mirroring the status-code lookup of the storage engines.

use std::path::PathBuf;

use thiserror::Error;
use tracing::error;

use crate::models::ContactId;

/// Errors that can occur in the phone book application.
#[derive(Error, Debug)]
pub enum PhoneBookError {
    /// The database does not exist yet and has to be created
    #[error("Database does not exist: {0}")]
    DatabaseNotFound(String),

    /// Storage could not be opened or created
    #[error("Cannot open storage {path}: {message}")]
    Connection {
        /// Path or URI of the storage
        path: String,
        /// Engine message
        message: String,
    },

    /// A table, index or foreign key could not be defined
    #[error("Cannot create table {table}: {message}")]
    TableDefinition {
        /// Table being defined
        table: &'static str,
        /// Engine message
        message: String,
    },

    /// A sequence could not be defined
    #[error("Cannot create sequence {sequence}: {message}")]
    SequenceDefinition {
        /// Sequence being defined
        sequence: &'static str,
        /// Engine message
        message: String,
    },

    /// Primary-key lookup found no contact
    #[error("Could not find contact with id {0}")]
    ContactNotFound(ContactId),

    /// The contact exists but has no picture stored
    #[error("No picture stored for contact with id {0}")]
    PictureMissing(ContactId),

    /// Foreign key or uniqueness violation reported by the engine
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Picture file could not be read or written
    #[error("Cannot open {path}: {source}")]
    File {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transaction bracket misuse (commit without start, nested start)
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// SQL engine failure
    #[error("SQL engine error: {0}")]
    Sql(rusqlite::Error),

    /// Table engine failure
    #[error("Table engine error: {0}")]
    Table(#[from] sled::Error),

    /// Row encoding errors in the table engine
    #[error("Row encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// Rejected user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience type alias for Result with `PhoneBookError`
pub type Result<T> = std::result::Result<T, PhoneBookError>;

impl From<rusqlite::Error> for PhoneBookError {
    fn from(err: rusqlite::Error) -> Self {
        if err.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
            Self::ConstraintViolation(err.to_string())
        } else {
            Self::Sql(err)
        }
    }
}

/// Stable status codes, one per failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Database does not exist
    NoEntry,
    /// Cannot reach or open storage
    Connect,
    /// Table definition failed
    Table,
    /// Sequence definition failed
    Sequence,
    /// Row not found
    NotFound,
    /// Foreign key or unique constraint
    Constraint,
    /// File I/O
    Io,
    /// Transaction misuse
    Transaction,
    /// Generic engine failure
    Engine,
    /// Invalid argument
    InvalidInput,
    /// Invalid configuration
    Config,
}

/// Human-readable name and description for an [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Short symbolic name
    pub name: &'static str,
    /// One-line description
    pub description: &'static str,
}

impl ErrorCode {
    /// Look up the name and description of this code.
    #[must_use]
    pub const fn info(self) -> ErrorInfo {
        let (name, description) = match self {
            Self::NoEntry => ("ENOENT", "database does not exist"),
            Self::Connect => ("ECONNECT", "cannot open or reach database storage"),
            Self::Table => ("ETABLE", "table definition failed"),
            Self::Sequence => ("ESEQ", "sequence definition failed"),
            Self::NotFound => ("ENOTFOUND", "no row matches the search key"),
            Self::Constraint => ("ECONSTRAINT", "constraint violation"),
            Self::Io => ("EIO", "file input/output failed"),
            Self::Transaction => ("ETX", "invalid transaction state"),
            Self::Engine => ("EENGINE", "database engine failure"),
            Self::InvalidInput => ("EINVAL", "invalid argument"),
            Self::Config => ("ECONFIG", "invalid configuration"),
        };
        ErrorInfo { name, description }
    }
}

impl PhoneBookError {
    /// Status code of this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::DatabaseNotFound(_) => ErrorCode::NoEntry,
            Self::Connection { .. } => ErrorCode::Connect,
            Self::TableDefinition { .. } => ErrorCode::Table,
            Self::SequenceDefinition { .. } => ErrorCode::Sequence,
            Self::ContactNotFound(_) | Self::PictureMissing(_) => ErrorCode::NotFound,
            Self::ConstraintViolation(_) => ErrorCode::Constraint,
            Self::File { .. } | Self::Io(_) => ErrorCode::Io,
            Self::Transaction(_) => ErrorCode::Transaction,
            Self::Sql(_) | Self::Table(_) | Self::Encoding(_) => ErrorCode::Engine,
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::InvalidConfig(_) => ErrorCode::Config,
        }
    }

    /// Engine-specific diagnostic attached to the last failed statement, if any.
    #[must_use]
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            Self::Sql(rusqlite::Error::SqliteFailure(_, Some(message))) => Some(message.clone()),
            Self::ConstraintViolation(message) => Some(message.clone()),
            Self::Connection { message, .. }
            | Self::TableDefinition { message, .. }
            | Self::SequenceDefinition { message, .. } => Some(message.clone()),
            _ => None,
        }
    }

    /// True when the error means "no such row".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code() == ErrorCode::NotFound
    }
}

/// Log a failed operation with its code name, description and diagnostic.
pub fn report(operation: &str, err: &PhoneBookError) {
    let info = err.code().info();
    match err.diagnostic() {
        Some(diagnostic) => error!(
            operation,
            code = info.name,
            description = info.description,
            diagnostic = %diagnostic,
            "{err}"
        ),
        None => error!(operation, code = info.name, description = info.description, "{err}"),
    }
}
