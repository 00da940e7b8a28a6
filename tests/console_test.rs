use std::fs;

use tempfile::{tempdir, TempDir};

use phone_book::config::{AppConfig, Backend, StorageMode};
use phone_book::console::Console;

fn file_config(backend: Backend, temp_dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.backend = backend;
    config.database.path = temp_dir.path().join("phone_book.db").display().to_string();
    config.picture.default_picture = temp_dir.path().join("unknown.png").display().to_string();
    config
}

/// Connect with `storage`, run the main menu on `script`, and return everything written.
fn run_script(config: &AppConfig, storage: Option<StorageMode>, script: &str) -> String {
    let mut console = Console::new(script.as_bytes(), Vec::new());
    let mut book = console
        .connect(config, storage)
        .expect("Failed to connect")
        .expect("Console quit before connecting");
    console.run(&mut book, &config.picture).expect("Console failed");
    book.close_database().expect("Failed to close");
    String::from_utf8(console.into_output()).expect("Output is not UTF-8")
}

#[test]
fn test_new_database_is_seeded() {
    for backend in [Backend::Table, Backend::Sql] {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let config = file_config(backend, &temp_dir);

        let output = run_script(&config, Some(StorageMode::File), "6\n0\n");
        assert!(output.contains("Creating new database file"), "{backend:?}");
        assert!(output.contains("Populating tables with sample data"));
        assert!(output.contains("------ Contacts ------"));
        assert!(output.contains("Id: 1\nName: Bob\n"));
        assert!(output.contains("Phone number: 206-555-1308 (Home, speed dial 5)"));
    }
}

#[test]
fn test_connection_menu_selects_memory_storage() {
    for backend in [Backend::Table, Backend::Sql] {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let config = file_config(backend, &temp_dir);

        let output = run_script(&config, None, "2\n5\n0\n");
        assert!(output.contains("2) Open memory storage"), "{backend:?}");
        assert!(output.contains("Name: Fred"));
        // Memory storage leaves nothing on disk
        assert!(!temp_dir.path().join("phone_book.db").exists());
    }
}

#[test]
fn test_add_contact_then_phone_number() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config = file_config(Backend::Sql, &temp_dir);

    let script = "1\nAlice\n3\n\n206-555-0000\n1\n-1\n5\n0\n";
    let output = run_script(&config, Some(StorageMode::File), script);
    assert!(output.contains("Added contact with id 4"));
    assert!(output.contains("Name: Alice\nRing tone id: 3\nPicture name: unknown.png\nPhone number: 206-555-0000 (Mobile)\n"));
}

#[test]
fn test_remove_contact_from_menu() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config = file_config(Backend::Table, &temp_dir);

    let output = run_script(&config, Some(StorageMode::File), "2\n3\n7\n0\n");
    assert!(output.contains("Id\tName\n--\t----\n1\tBob\n3\tFred\n2\tSue\n"));
    assert!(output.contains("Removed contact 3 and 3 phone number(s)"));
    let listing = output.rsplit("------ Contacts ------").next().expect("listing");
    assert!(!listing.contains("Fred"));
}

#[test]
fn test_rename_and_unknown_option() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config = file_config(Backend::Sql, &temp_dir);

    let output = run_script(&config, Some(StorageMode::File), "4\n2\nSusan\n42\n5\n0\n");
    assert!(output.contains("Unknown option: 42"));
    assert!(output.contains("Name: Susan"));
}

#[test]
fn test_errors_are_shown_with_code() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config = file_config(Backend::Table, &temp_dir);

    let output = run_script(&config, Some(StorageMode::File), "4\n99\nNobody\n0\n");
    assert!(output.contains("Error [ENOTFOUND]: Could not find contact with id 99"));
}

#[test]
fn test_export_picture_defaults_to_stored_name() {
    for backend in [Backend::Table, Backend::Sql] {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let config = file_config(backend, &temp_dir);
        let picture = vec![42u8; 600];
        fs::write(&config.picture.default_picture, &picture).expect("Failed to write picture");

        let output_path = temp_dir.path().join("bob.png");
        let script = format!("8\n1\n{}\n0\n", output_path.display());
        let output = run_script(&config, Some(StorageMode::File), &script);

        assert!(output.contains("(default=\"unknown.png\")"), "{backend:?}");
        assert!(output.contains("Wrote 600 bytes"));
        assert_eq!(fs::read(&output_path).expect("Failed to read export"), picture);
    }
}

#[test]
fn test_end_of_input_quits() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config = file_config(Backend::Sql, &temp_dir);

    let output = run_script(&config, Some(StorageMode::File), "1\nHalf");
    assert!(output.contains("------ Add Contact ------"));
    assert!(!output.contains("Added contact"));
}

#[test]
fn test_existing_foreign_path_is_left_alone() {
    for backend in [Backend::Table, Backend::Sql] {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let mut config = file_config(backend, &temp_dir);
        let path = temp_dir.path().join("documents");
        fs::create_dir(&path).expect("Failed to create directory");
        fs::write(path.join("important.txt"), "keep me").expect("Failed to write file");
        config.database.path = path.display().to_string();

        let mut console = Console::new("6\n0\n".as_bytes(), Vec::new());
        let result = console.connect(&config, Some(StorageMode::File));
        assert!(result.is_err(), "{backend:?}");

        let output = String::from_utf8(console.into_output()).expect("Output is not UTF-8");
        assert!(!output.contains("Creating new database file"));
        assert_eq!(fs::read_to_string(path.join("important.txt")).expect("File was removed"), "keep me");
    }
}

#[test]
fn test_invalid_id_is_reported() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let config = file_config(Backend::Sql, &temp_dir);

    let output = run_script(&config, Some(StorageMode::File), "4\nabc\n0\n");
    assert!(output.contains("Invalid id: abc"));
    assert!(!output.contains("New name"));
    assert!(!output.contains("ENOTFOUND"));
}
