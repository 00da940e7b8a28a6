//! Phone Book - Contacts over Embedded Storage
//!
//! A Rust library for keeping contacts, their phone numbers and pictures in an
//! embedded database, with an interactive console on top.
//!
//! # Features
//!
//! - Two storage engines behind one trait: sled tables and SQLite
//! - File storage with pictures, or memory storage without
//! - Chunked picture import and export
//! - Listings by id, by name, or by ring tone and name
//! - Cascading contact removal

/// Configuration management
pub mod config;
/// Interactive console
pub mod console;
/// Error types and status codes
pub mod error;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Phone book operations
pub mod phonebook;
/// Picture streaming
pub mod picture;
/// Database schema definitions
pub mod schema;
/// Storage backends
pub mod store;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use config::{AppConfig, Backend, StorageMode};
pub use error::{PhoneBookError, Result};
pub use models::{Contact, ContactListing, NewContact, PhoneNumber, PhoneNumberType, SortMode};
pub use phonebook::PhoneBook;
