use std::fs;
use std::path::Path;

use proptest::prelude::*;
use tempfile::tempdir;

use phone_book::config::{Backend, DatabaseConfig};
use phone_book::error::PhoneBookError;
use phone_book::models::NewContact;
use phone_book::PhoneBook;

const BACKENDS: [Backend; 2] = [Backend::Table, Backend::Sql];

fn picture_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Store a picture of `bytes` under a new contact, export it, and return the exported bytes.
fn round_trip(backend: Backend, bytes: &[u8], chunk_size: usize) -> Vec<u8> {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config = DatabaseConfig::file(backend, &temp_dir.path().join("phone_book.db"));
    let mut book = PhoneBook::create_database(&config, chunk_size).expect("Failed to create database");

    let source = temp_dir.path().join("face.png");
    fs::write(&source, bytes).expect("Failed to write picture");
    let id = book
        .insert_contact(&NewContact::named("Pat").with_picture(&source))
        .expect("Failed to insert");

    let output = temp_dir.path().join("exported.png");
    let written = book.export_picture(id, &output).expect("Failed to export");
    assert_eq!(written, bytes.len() as u64);
    fs::read(&output).expect("Failed to read export")
}

#[test]
fn test_round_trip_at_chunk_boundaries() {
    for backend in BACKENDS {
        for len in [0, 1, 255, 256, 257, 5000] {
            let bytes = picture_bytes(len);
            assert_eq!(round_trip(backend, &bytes, 256), bytes, "{backend:?} with {len} bytes");
        }
    }
}

#[test]
fn test_empty_picture_differs_from_no_picture() {
    for backend in BACKENDS {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let config = DatabaseConfig::file(backend, &temp_dir.path().join("phone_book.db"));
        let mut book = PhoneBook::create_database(&config, 256).expect("Failed to create database");

        let empty = temp_dir.path().join("empty.png");
        fs::write(&empty, b"").expect("Failed to write picture");
        let with_empty = book
            .insert_contact(&NewContact::named("Empty").with_picture(&empty))
            .expect("Failed to insert");
        let without = book.insert_contact(&NewContact::named("None")).expect("Failed to insert");

        let output = temp_dir.path().join("empty_out.png");
        assert_eq!(book.export_picture(with_empty, &output).expect("Failed to export"), 0);
        assert!(output.exists());

        let output = temp_dir.path().join("none_out.png");
        let err = book.export_picture(without, &output).unwrap_err();
        assert!(matches!(err, PhoneBookError::PictureMissing(_)), "{backend:?}: {err}");
        assert!(!output.exists());
    }
}

#[test]
fn test_export_missing_contact_creates_no_file() {
    for backend in BACKENDS {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let config = DatabaseConfig::file(backend, &temp_dir.path().join("phone_book.db"));
        let mut book = PhoneBook::create_database(&config, 256).expect("Failed to create database");

        let output = temp_dir.path().join("ghost.png");
        let err = book.export_picture(12, &output).unwrap_err();
        assert!(matches!(err, PhoneBookError::ContactNotFound(12)), "{backend:?}: {err}");
        assert!(!output.exists());
    }
}

#[test]
fn test_unreadable_picture_keeps_contact() {
    for backend in BACKENDS {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let config = DatabaseConfig::file(backend, &temp_dir.path().join("phone_book.db"));
        let mut book = PhoneBook::create_database(&config, 256).expect("Failed to create database");

        let missing = temp_dir.path().join("missing.png");
        let id = book
            .insert_contact(&NewContact::named("Kim").with_picture(&missing))
            .expect("Failed to insert");
        assert_eq!(book.get_picture_name(id).expect("lookup"), "missing.png", "{backend:?}");

        let err = book.export_picture(id, &temp_dir.path().join("out.png")).unwrap_err();
        assert!(matches!(err, PhoneBookError::PictureMissing(_)));
    }
}

#[test]
fn test_update_contact_picture_replaces_bytes_and_name() {
    for backend in BACKENDS {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let config = DatabaseConfig::file(backend, &temp_dir.path().join("phone_book.db"));
        let mut book = PhoneBook::create_database(&config, 256).expect("Failed to create database");

        let first = temp_dir.path().join("first.png");
        fs::write(&first, picture_bytes(700)).expect("Failed to write picture");
        let id = book
            .insert_contact(&NewContact::named("Lee").with_picture(&first))
            .expect("Failed to insert");

        let second = temp_dir.path().join("second.png");
        let replacement: Vec<u8> = picture_bytes(300).into_iter().rev().collect();
        fs::write(&second, &replacement).expect("Failed to write picture");
        assert_eq!(book.update_contact_picture(id, &second).expect("Failed to update"), 300);
        assert_eq!(book.get_picture_name(id).expect("lookup"), "second.png", "{backend:?}");

        let output = temp_dir.path().join("out.png");
        book.export_picture(id, &output).expect("Failed to export");
        assert_eq!(fs::read(&output).expect("Failed to read export"), replacement);

        let err = book.update_contact_picture(99, &second).unwrap_err();
        assert!(matches!(err, PhoneBookError::ContactNotFound(99)));
    }
}

#[test]
fn test_update_picture_needs_picture_storage() {
    for backend in BACKENDS {
        let mut book =
            PhoneBook::create_database(&DatabaseConfig::memory(backend), 256).expect("Failed to create database");
        let id = book.insert_contact(&NewContact::named("Mo")).expect("Failed to insert");
        assert!(book.update_contact_picture(id, Path::new("unknown.png")).is_err(), "{backend:?}");
    }
}

#[test]
fn test_metrics_count_picture_bytes() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config = DatabaseConfig::file(Backend::Table, &temp_dir.path().join("phone_book.db"));
    let mut book = PhoneBook::create_database(&config, 64).expect("Failed to create database");

    let source = temp_dir.path().join("face.png");
    fs::write(&source, picture_bytes(1000)).expect("Failed to write picture");
    let id = book
        .insert_contact(&NewContact::named("Pat").with_picture(&source))
        .expect("Failed to insert");
    book.export_picture(id, &temp_dir.path().join("out.png")).expect("Failed to export");

    assert_eq!(book.metrics().picture_bytes_written, 1000);
    assert_eq!(book.metrics().picture_bytes_read, 1000);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_round_trip_any_chunk_size(len in 0usize..9000, chunk_size in 1usize..2048, sql in any::<bool>()) {
        let backend = if sql { Backend::Sql } else { Backend::Table };
        let bytes = picture_bytes(len);
        prop_assert_eq!(round_trip(backend, &bytes, chunk_size), bytes);
    }
}
