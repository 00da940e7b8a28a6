use anyhow::Result;
use clap::ValueEnum;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::PhoneBookError;

/// Default picture imported for new contacts
pub const DEFAULT_PICTURE: &str = "unknown.png";

/// Memory storage capacity used when none is configured (128 KiB)
pub const MEMORY_STORAGE_SIZE: u64 = 128 * 1024;

/// Which storage engine backs the phone book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Navigational tables, indexes and cursors over sled
    Table,
    /// Parameterized SQL over SQLite
    Sql,
}

/// Where the database lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Durable file storage, pictures supported
    File,
    /// Fixed-capacity memory storage, no durability, no pictures
    Memory,
}

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub picture: PictureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: Backend,
    pub storage: StorageMode,
    pub path: String,
    pub memory_storage_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PictureConfig {
    pub default_picture: String,
    pub chunk_size: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            picture: PictureConfig {
                default_picture: DEFAULT_PICTURE.to_string(),
                chunk_size: crate::picture::DEFAULT_CHUNK_SIZE,
            },
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Table,
            storage: StorageMode::File,
            path: "phone_book.db".to_string(),
            memory_storage_size: MEMORY_STORAGE_SIZE,
        }
    }
}

impl DatabaseConfig {
    /// File storage at `path` on the given backend.
    #[must_use]
    pub fn file(backend: Backend, path: &Path) -> Self {
        Self {
            backend,
            storage: StorageMode::File,
            path: path.display().to_string(),
            ..Self::default()
        }
    }

    /// Memory storage on the given backend.
    #[must_use]
    pub fn memory(backend: Backend) -> Self {
        Self {
            backend,
            storage: StorageMode::Memory,
            ..Self::default()
        }
    }

    /// Pictures are only stored in file storage.
    #[must_use]
    pub fn with_picture(&self) -> bool {
        self.storage == StorageMode::File
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            // Start with default values
            .add_source(
                Config::try_from(&Self::default())
                    .map_err(|e| anyhow::anyhow!("Failed to build default configuration: {}", e))?,
            )
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("phonebook").required(false));

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            // Add environment variables with prefix, e.g. PHONEBOOK__DATABASE__BACKEND=sql
            .add_source(Environment::with_prefix("PHONEBOOK").prefix_separator("__").separator("__"))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> crate::error::Result<()> {
        let invalid =
            |message: String| -> crate::error::Result<()> { Err(PhoneBookError::InvalidConfig(message)) };

        // Validate database config
        if self.database.path.trim().is_empty() {
            return invalid("database path must not be empty".to_string());
        }
        if self.database.memory_storage_size < 64 * 1024 {
            return invalid("memory_storage_size must be at least 65536 bytes".to_string());
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return invalid(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return invalid(format!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format, valid_formats
            ));
        }

        // Validate picture config
        if self.picture.chunk_size == 0 {
            return invalid("chunk_size must be greater than 0".to_string());
        }
        if self.picture.chunk_size > 1024 * 1024 {
            return invalid("chunk_size must be at most 1048576 bytes".to_string());
        }
        if self.picture.default_picture.trim().is_empty() {
            return invalid("default_picture must not be empty".to_string());
        }

        Ok(())
    }

    /// Render the effective configuration as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| anyhow::anyhow!("Failed to render configuration: {}", e))
    }
}
