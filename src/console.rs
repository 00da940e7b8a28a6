//! Interactive menu shell over a [`PhoneBook`].
//!
//! Reads commands line by line from any `BufRead` and writes prompts and
//! listings to any `Write`, so a whole session can be scripted in tests.
//! End of input quits from any prompt.

use std::io::{BufRead, Write};
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::{AppConfig, PictureConfig, StorageMode};
use crate::error::PhoneBookError;
use crate::models::{ContactId, NewContact, PhoneNumberType, SortMode};
use crate::phonebook::PhoneBook;

const CONNECTION_MENU: &str = "------ Phone Book ------\n\
Choose a database connection method:\n\
\n\
1) Open file storage\n\
2) Open memory storage\n\
0) Quit\n\
\n\
Enter the number of your choice: ";

const MAIN_MENU: &str = "------ Phone Book ------\n\
\n\
1) Add contact\n\
2) Remove contact\n\
3) Add phone number to existing contact\n\
4) Rename contact\n\
5) List contacts by name\n\
6) List contacts by id\n\
7) List contacts by ring id, name\n\
8) Export picture from existing contact\n\
0) Quit\n\
\n\
Enter the number of your choice: ";

const PHONE_NUMBER_TYPES: &str = "Phone number type: \n\
0) Home\n\
1) Mobile\n\
2) Work\n\
3) Fax\n\
4) Pager\n\
Enter the number of your choice: ";

/// Console session
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Pick a storage mode and open the database, creating and seeding it
    /// when it does not exist yet.
    ///
    /// `storage` skips the connection menu. Returns `None` when the user quits.
    pub fn connect(&mut self, config: &AppConfig, storage: Option<StorageMode>) -> Result<Option<PhoneBook>> {
        let storage = match storage {
            Some(storage) => storage,
            None => match self.connection_menu()? {
                Some(storage) => storage,
                None => return Ok(None),
            },
        };

        let mut database = config.database.clone();
        database.storage = storage;
        let chunk_size = config.picture.chunk_size;

        match PhoneBook::open_database(&database, chunk_size) {
            Ok(book) => Ok(Some(book)),
            Err(PhoneBookError::DatabaseNotFound(_)) => {
                writeln!(self.output, "Creating new database file")?;
                let mut book = PhoneBook::create_database(&database, chunk_size)
                    .with_context(|| format!("Failed to create database {}", database.path))?;

                writeln!(self.output, "Populating tables with sample data")?;
                let default_picture = Path::new(&config.picture.default_picture);
                if let Err(err) = book.in_transaction(|book| book.populate_sample_data(default_picture)) {
                    writeln!(self.output, "Sample data incomplete: {err}")?;
                }
                Ok(Some(book))
            }
            Err(err) => Err(err).with_context(|| format!("Failed to open database {}", database.path)),
        }
    }

    fn connection_menu(&mut self) -> Result<Option<StorageMode>> {
        loop {
            let Some(choice) = self.prompt_choice(CONNECTION_MENU)? else {
                return Ok(None);
            };
            writeln!(self.output)?;
            match choice {
                0 => return Ok(None),
                1 => return Ok(Some(StorageMode::File)),
                2 => return Ok(Some(StorageMode::Memory)),
                other => writeln!(self.output, "Unknown option: {other}")?,
            }
        }
    }

    /// Main menu loop; returns when the user quits.
    pub fn run(&mut self, book: &mut PhoneBook, pictures: &PictureConfig) -> Result<()> {
        info!(backend = ?book.backend(), "Console session started");
        loop {
            let Some(choice) = self.prompt_choice(MAIN_MENU)? else {
                break;
            };
            writeln!(self.output)?;
            debug!(choice, "Menu choice");
            match choice {
                0 => break,
                1 => self.add_contact(book, pictures)?,
                2 => self.remove_contact(book)?,
                3 => self.add_phone_number(book, None)?,
                4 => self.rename_contact(book)?,
                5 => self.list_contacts(book, SortMode::ByName)?,
                6 => self.list_contacts(book, SortMode::ById)?,
                7 => self.list_contacts(book, SortMode::ByRingIdName)?,
                8 => self.export_picture(book)?,
                other => writeln!(self.output, "Unknown option: {other}")?,
            }
        }
        info!("Console session ended");
        Ok(())
    }

    fn add_contact(&mut self, book: &mut PhoneBook, pictures: &PictureConfig) -> Result<()> {
        writeln!(self.output, "------ Add Contact ------")?;
        let Some(name) = self.prompt("Name: ")? else {
            return Ok(());
        };
        let Some(ring_id) = self.prompt("Ring tone id number: ")? else {
            return Ok(());
        };
        let prompt = format!("Picture file (\"{}\"): ", pictures.default_picture);
        let Some(picture) = self.prompt(&prompt)? else {
            return Ok(());
        };

        let mut new = NewContact::named(&name);
        new.ring_id = parse_optional(&ring_id);
        new = if picture.is_empty() {
            new.with_picture(&pictures.default_picture)
        } else {
            new.with_picture(picture)
        };

        match book.in_transaction(|book| book.insert_contact(&new)) {
            Ok(id) => {
                writeln!(self.output, "Added contact with id {id}")?;
                self.add_phone_number(book, Some(id))
            }
            Err(err) => self.show_error(&err),
        }
    }

    fn select_contact(&mut self, book: &mut PhoneBook) -> Result<Option<ContactId>> {
        writeln!(self.output, "Id\tName")?;
        writeln!(self.output, "--\t----")?;
        match book.in_transaction(PhoneBook::list_contacts_brief) {
            Ok(contacts) => {
                for contact in contacts {
                    writeln!(self.output, "{}\t{}", contact.id, contact.name)?;
                }
            }
            Err(err) => self.show_error(&err)?,
        }

        let Some(id) = self.prompt("Enter id number: ")? else {
            return Ok(None);
        };
        match id.trim().parse() {
            Ok(id) => Ok(Some(id)),
            Err(_) => {
                writeln!(self.output, "Invalid id: {}", id.trim())?;
                Ok(None)
            }
        }
    }

    fn add_phone_number(&mut self, book: &mut PhoneBook, contact_id: Option<ContactId>) -> Result<()> {
        writeln!(self.output, "------ Add Phone Number ------")?;
        let contact_id = match contact_id {
            Some(id) => id,
            None => match self.select_contact(book)? {
                Some(id) => id,
                None => return Ok(()),
            },
        };

        let Some(number) = self.prompt("Phone number: ")? else {
            return Ok(());
        };
        let Some(number_type) = self.prompt(PHONE_NUMBER_TYPES)? else {
            return Ok(());
        };
        let Some(speed_dial) = self.prompt("Speed dial number (-1=none): ")? else {
            return Ok(());
        };

        let number_type = match parse_optional::<u32>(&number_type).map(PhoneNumberType::try_from) {
            Some(Ok(number_type)) => number_type,
            Some(Err(err)) => return self.show_error(&err),
            None => PhoneNumberType::Home,
        };
        let speed_dial = parse_optional(&speed_dial);

        if let Err(err) =
            book.in_transaction(|book| book.insert_phone_number(contact_id, &number, number_type, speed_dial))
        {
            self.show_error(&err)?;
        }
        Ok(())
    }

    fn remove_contact(&mut self, book: &mut PhoneBook) -> Result<()> {
        writeln!(self.output, "------ Remove Contact ------")?;
        let Some(id) = self.select_contact(book)? else {
            return Ok(());
        };
        match book.in_transaction(|book| book.remove_contact(id)) {
            Ok(phone_numbers) => {
                writeln!(self.output, "Removed contact {id} and {phone_numbers} phone number(s)")?;
                Ok(())
            }
            Err(err) => self.show_error(&err),
        }
    }

    fn rename_contact(&mut self, book: &mut PhoneBook) -> Result<()> {
        writeln!(self.output, "------ Rename Contact ------")?;
        let Some(id) = self.select_contact(book)? else {
            return Ok(());
        };
        let Some(name) = self.prompt("New name: ")? else {
            return Ok(());
        };
        if let Err(err) = book.in_transaction(|book| book.update_contact_name(id, &name)) {
            self.show_error(&err)?;
        }
        Ok(())
    }

    fn list_contacts(&mut self, book: &mut PhoneBook, sort: SortMode) -> Result<()> {
        writeln!(self.output, "------ Contacts ------")?;
        match book.in_transaction(|book| book.list_contacts(sort)) {
            Ok(listings) => {
                for listing in listings {
                    writeln!(self.output, "{listing}")?;
                }
                Ok(())
            }
            Err(err) => self.show_error(&err),
        }
    }

    fn export_picture(&mut self, book: &mut PhoneBook) -> Result<()> {
        writeln!(self.output, "------ Export Picture ------")?;
        let Some(id) = self.select_contact(book)? else {
            return Ok(());
        };

        let stored_name = match book.in_transaction(|book| book.get_picture_name(id)) {
            Ok(name) => name,
            Err(err) => return self.show_error(&err),
        };
        let prompt = format!("Choose a filename for picture (default=\"{stored_name}\"): ");
        let Some(file_name) = self.prompt(&prompt)? else {
            return Ok(());
        };
        let file_name = if file_name.is_empty() { stored_name } else { file_name };

        match book.in_transaction(|book| book.export_picture(id, Path::new(&file_name))) {
            Ok(bytes) => {
                writeln!(self.output, "Wrote {bytes} bytes to {file_name}")?;
                Ok(())
            }
            Err(err) => self.show_error(&err),
        }
    }

    fn show_error(&mut self, err: &PhoneBookError) -> Result<()> {
        writeln!(self.output, "Error [{}]: {err}", err.code().info().name)?;
        Ok(())
    }

    /// Write `text` and read one line without its terminator. `None` at end of input.
    fn prompt(&mut self, text: &str) -> Result<Option<String>> {
        write!(self.output, "{text}")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Menu choice; anything that is not a number is an unknown option.
    fn prompt_choice(&mut self, menu: &str) -> Result<Option<i64>> {
        Ok(self.prompt(menu)?.map(|line| line.trim().parse().unwrap_or(-1)))
    }
}

/// Empty or unparsable input means "not given".
fn parse_optional<T: FromStr>(input: &str) -> Option<T> {
    input.trim().parse().ok()
}
