//! Unit tests for config.rs module

use std::fs;
use std::path::Path;

use phone_book::config::{
    AppConfig, Backend, DatabaseConfig, LoggingConfig, StorageMode, DEFAULT_PICTURE, MEMORY_STORAGE_SIZE,
};
use phone_book::error::PhoneBookError;

#[test]
fn test_default_config_values() {
    let config = AppConfig::default();

    assert_eq!(config.database.backend, Backend::Table);
    assert_eq!(config.database.storage, StorageMode::File);
    assert_eq!(config.database.path, "phone_book.db");
    assert_eq!(config.database.memory_storage_size, MEMORY_STORAGE_SIZE);
}

#[test]
fn test_default_logging_config() {
    let config = AppConfig::default();

    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.file_path, None);
    assert_eq!(config.logging.format, "text");
}

#[test]
fn test_default_picture_config() {
    let config = AppConfig::default();

    assert_eq!(config.picture.default_picture, DEFAULT_PICTURE);
    assert_eq!(config.picture.chunk_size, 256);
}

#[test]
fn test_config_validation_success() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validation_empty_path() {
    let mut config = AppConfig::default();
    config.database.path = "  ".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_small_memory_storage() {
    let mut config = AppConfig::default();
    config.database.memory_storage_size = 1024;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_invalid_log_level() {
    let mut config = AppConfig::default();
    config.logging.level = "invalid".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_valid_log_levels() {
    let valid_levels = vec!["trace", "debug", "info", "warn", "error"];
    for level in valid_levels {
        let mut config = AppConfig::default();
        config.logging.level = level.to_string();
        assert!(config.validate().is_ok(), "Failed for level: {}", level);
    }
}

#[test]
fn test_config_validation_invalid_log_format() {
    let mut config = AppConfig::default();
    config.logging.format = "xml".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_valid_log_formats() {
    let valid_formats = vec!["text", "json"];
    for format in valid_formats {
        let mut config = AppConfig::default();
        config.logging.format = format.to_string();
        assert!(config.validate().is_ok(), "Failed for format: {}", format);
    }
}

#[test]
fn test_config_validation_zero_chunk_size() {
    let mut config = AppConfig::default();
    config.picture.chunk_size = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_empty_default_picture() {
    let mut config = AppConfig::default();
    config.picture.default_picture = String::new();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_boundary_values() {
    let mut config = AppConfig::default();
    config.database.memory_storage_size = 64 * 1024;
    config.picture.chunk_size = 1;
    assert!(config.validate().is_ok());

    config.picture.chunk_size = 1024 * 1024;
    assert!(config.validate().is_ok());

    config.picture.chunk_size = 1024 * 1024 + 1;
    assert!(config.validate().is_err());
}

#[test]
fn test_database_config_constructors() {
    let file = DatabaseConfig::file(Backend::Sql, Path::new("/tmp/contacts.db"));
    assert_eq!(file.backend, Backend::Sql);
    assert_eq!(file.storage, StorageMode::File);
    assert_eq!(file.path, "/tmp/contacts.db");
    assert!(file.with_picture());

    let memory = DatabaseConfig::memory(Backend::Table);
    assert_eq!(memory.storage, StorageMode::Memory);
    assert!(!memory.with_picture());
}

#[test]
fn test_logging_config_with_file_path() {
    let logging = LoggingConfig {
        level: "debug".to_string(),
        file_path: Some("/var/log/phonebook.log".to_string()),
        format: "json".to_string(),
    };

    let mut config = AppConfig::default();
    config.logging = logging;
    assert!(config.validate().is_ok());
    assert_eq!(config.logging.file_path.as_deref(), Some("/var/log/phonebook.log"));
}

#[test]
fn test_load_explicit_file_overrides_defaults() {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let path = dir.path().join("phonebook.yaml");
    fs::write(
        &path,
        "database:\n  backend: sql\n  storage: memory\npicture:\n  chunk_size: 512\n",
    )
    .expect("Failed to write config file");

    let config = AppConfig::load(Some(&path)).expect("Failed to load config");
    assert_eq!(config.database.backend, Backend::Sql);
    assert_eq!(config.database.storage, StorageMode::Memory);
    assert_eq!(config.picture.chunk_size, 512);
    // Untouched values keep their defaults
    assert_eq!(config.database.path, "phone_book.db");
    assert_eq!(config.picture.default_picture, DEFAULT_PICTURE);
}

#[test]
fn test_load_rejects_invalid_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let path = dir.path().join("phonebook.yaml");
    fs::write(&path, "picture:\n  chunk_size: 0\n").expect("Failed to write config file");

    let err = AppConfig::load(Some(&path)).unwrap_err();
    let err = err.downcast_ref::<PhoneBookError>().expect("Expected a phone book error");
    assert!(matches!(err, PhoneBookError::InvalidConfig(_)), "{err}");
    assert_eq!(err.code().info().name, "ECONFIG");
}

#[test]
fn test_load_missing_explicit_file_fails() {
    assert!(AppConfig::load(Some(Path::new("/nonexistent/phonebook.yaml"))).is_err());
}

#[test]
fn test_to_yaml_round_trips_backend() {
    let mut config = AppConfig::default();
    config.database.backend = Backend::Sql;
    let yaml = config.to_yaml().expect("Failed to render config");
    assert!(yaml.contains("backend: sql"));
    assert!(yaml.contains("storage: file"));
}

#[test]
fn test_config_clone() {
    let config = AppConfig::default();
    let cloned = config.clone();

    assert_eq!(config.database.path, cloned.database.path);
    assert_eq!(config.logging.level, cloned.logging.level);
    assert_eq!(config.picture.chunk_size, cloned.picture.chunk_size);
}
