//! Data models for the phone book
//!
//! Typed records for the `contact` and `phone_number` tables, the listing
//! structures handed to the console, and the text rendering of a listing.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::PhoneBookError;

/// Contact identifier allocated from the `contact_id` sequence. Never 0.
pub type ContactId = u64;

/// A row of the `contact` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Primary key
    pub id: ContactId,
    /// Display name, at most 50 characters
    pub name: String,
    /// Ring tone played when this contact calls
    pub ring_id: Option<u32>,
    /// File name the picture was imported from
    pub picture_name: Option<String>,
}

/// Data for creating a new contact
#[derive(Debug, Clone, Default)]
pub struct NewContact {
    /// Display name
    pub name: String,
    /// Ring tone id
    pub ring_id: Option<u32>,
    /// Picture file to import; its base name becomes `picture_name`
    pub picture_path: Option<PathBuf>,
}

impl NewContact {
    /// Contact with only a name.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Set the ring tone id.
    #[must_use]
    pub const fn with_ring_id(mut self, ring_id: u32) -> Self {
        self.ring_id = Some(ring_id);
        self
    }

    /// Set the picture file.
    #[must_use]
    pub fn with_picture(mut self, path: impl Into<PathBuf>) -> Self {
        self.picture_path = Some(path.into());
        self
    }

    /// Base name of the picture path, stored as `picture_name`.
    #[must_use]
    pub fn picture_name(&self) -> Option<String> {
        self.picture_path
            .as_ref()
            .and_then(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
    }
}

/// Kinds of telephone numbers, stored as integer codes 0-4
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PhoneNumberType {
    /// Home phone
    Home = 0,
    /// Mobile phone
    Mobile = 1,
    /// Work phone
    Work = 2,
    /// Fax machine
    Fax = 3,
    /// Pager
    Pager = 4,
}

impl PhoneNumberType {
    /// All types in code order.
    pub const ALL: [Self; 5] = [Self::Home, Self::Mobile, Self::Work, Self::Fax, Self::Pager];

    /// Integer code stored in the database.
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Home => "Home",
            Self::Mobile => "Mobile",
            Self::Work => "Work",
            Self::Fax => "Fax",
            Self::Pager => "Pager",
        }
    }
}

impl TryFrom<u32> for PhoneNumberType {
    type Error = PhoneBookError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .ok_or_else(|| PhoneBookError::InvalidInput(format!("unknown phone number type {code}")))
    }
}

impl fmt::Display for PhoneNumberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A row of the `phone_number` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber {
    /// Owning contact
    pub contact_id: ContactId,
    /// The number as dialed, at most 20 bytes
    pub number: String,
    /// Kind of device
    pub number_type: PhoneNumberType,
    /// Speed dial slot; negative or `None` means no slot
    pub speed_dial: Option<i32>,
}

impl PhoneNumber {
    /// Build a phone number row.
    #[must_use]
    pub fn new(contact_id: ContactId, number: &str, number_type: PhoneNumberType, speed_dial: Option<i32>) -> Self {
        Self {
            contact_id,
            number: number.to_string(),
            number_type,
            speed_dial,
        }
    }

    /// Speed dial slot, if one is assigned.
    #[must_use]
    pub fn assigned_speed_dial(&self) -> Option<i32> {
        self.speed_dial.filter(|slot| *slot >= 0)
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.number, self.number_type)?;
        if let Some(slot) = self.assigned_speed_dial() {
            write!(f, ", speed dial {slot}")?;
        }
        f.write_str(")")
    }
}

/// Id and name, used to pick a contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactBrief {
    /// Contact id
    pub id: ContactId,
    /// Contact name
    pub name: String,
}

/// A contact with all of its phone numbers, ordered by type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactListing {
    /// The contact row
    pub contact: Contact,
    /// Phone numbers ordered by type
    pub phone_numbers: Vec<PhoneNumber>,
}

impl fmt::Display for ContactListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Id: {}", self.contact.id)?;
        writeln!(f, "Name: {}", self.contact.name)?;
        if let Some(ring_id) = self.contact.ring_id {
            writeln!(f, "Ring tone id: {ring_id}")?;
        }
        if let Some(picture_name) = &self.contact.picture_name {
            writeln!(f, "Picture name: {picture_name}")?;
        }
        for phone_number in &self.phone_numbers {
            writeln!(f, "Phone number: {phone_number}")?;
        }
        Ok(())
    }
}

/// Order of a full contact listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    /// Ascending id
    ById = 0,
    /// Ascending name
    ByName = 1,
    /// Ascending ring tone id (NULL first), then name
    ByRingIdName = 2,
}

impl TryFrom<u32> for SortMode {
    type Error = PhoneBookError;

    fn try_from(mode: u32) -> Result<Self, Self::Error> {
        match mode {
            0 => Ok(Self::ById),
            1 => Ok(Self::ByName),
            2 => Ok(Self::ByRingIdName),
            other => Err(PhoneBookError::InvalidInput(format!("unknown sort mode {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn listing(ring_id: Option<u32>, picture_name: Option<&str>) -> ContactListing {
        ContactListing {
            contact: Contact {
                id: 2,
                name: "Sue".to_string(),
                ring_id,
                picture_name: picture_name.map(ToString::to_string),
            },
            phone_numbers: vec![PhoneNumber::new(2, "206-555-3890", PhoneNumberType::Home, Some(0))],
        }
    }

    #[test]
    fn test_listing_with_optional_fields() {
        let text = listing(Some(7), Some("unknown.png")).to_string();
        assert_eq!(
            text,
            "Id: 2\nName: Sue\nRing tone id: 7\nPicture name: unknown.png\nPhone number: 206-555-3890 (Home, speed dial 0)\n"
        );
    }

    #[test]
    fn test_listing_skips_null_fields() {
        let text = listing(None, None).to_string();
        assert!(!text.contains("Ring tone id"));
        assert!(!text.contains("Picture name"));
    }

    #[test]
    fn test_phone_number_type_codes() {
        for kind in PhoneNumberType::ALL {
            assert_eq!(PhoneNumberType::try_from(kind.code()).ok(), Some(kind));
        }
        assert!(PhoneNumberType::try_from(5).is_err());
    }

    #[test]
    fn test_sort_mode_codes() {
        assert_eq!(SortMode::try_from(0).ok(), Some(SortMode::ById));
        assert_eq!(SortMode::try_from(2).ok(), Some(SortMode::ByRingIdName));
        assert!(SortMode::try_from(3).is_err());
    }

    #[test]
    fn test_picture_name_is_base_name() {
        let contact = NewContact::named("Bob").with_picture("/tmp/pictures/bob.png");
        assert_eq!(contact.picture_name().as_deref(), Some("bob.png"));
        assert_eq!(NewContact::named("Bob").picture_name(), None);
    }

    proptest! {
        #[test]
        fn test_speed_dial_suffix(slot in -1000i32..1000, code in 0u32..5) {
            let kind = PhoneNumberType::try_from(code).unwrap();
            let text = PhoneNumber::new(1, "555-0100", kind, Some(slot)).to_string();
            if slot >= 0 {
                prop_assert_eq!(text, format!("555-0100 ({}, speed dial {slot})", kind.label()));
            } else {
                prop_assert_eq!(text, format!("555-0100 ({})", kind.label()));
            }
        }

        #[test]
        fn test_missing_speed_dial_has_no_suffix(code in 0u32..5) {
            let kind = PhoneNumberType::try_from(code).unwrap();
            let text = PhoneNumber::new(1, "555-0100", kind, None).to_string();
            prop_assert!(!text.contains("speed dial"));
        }
    }
}
