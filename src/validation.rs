use regex::Regex;
use std::sync::OnceLock;

use crate::error::{PhoneBookError, Result};
use crate::schema::{MAX_CONTACT_NAME, MAX_PHONE_NUMBER, MAX_PICTURE_NAME};

#[allow(clippy::expect_used)]
fn phone_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[0-9(][0-9 ().#*-]*$").expect("phone number pattern compiles"))
}

fn invalid(message: impl Into<String>) -> PhoneBookError {
    PhoneBookError::InvalidInput(message.into())
}

/// Validation utilities for input sanitization and edge case handling
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate contact name
    pub fn validate_contact_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(invalid("Contact name cannot be empty"));
        }

        // Names are wide strings: the limit counts characters, not bytes
        if name.chars().count() > MAX_CONTACT_NAME {
            return Err(invalid(format!(
                "Contact name too long (max {MAX_CONTACT_NAME} characters)"
            )));
        }

        // Check for potentially dangerous characters
        if name.contains('\0') || name.contains('\r') || name.contains('\n') {
            return Err(invalid("Contact name contains invalid characters"));
        }

        Ok(())
    }

    /// Validate phone number format
    pub fn validate_phone_number(number: &str) -> Result<()> {
        if number.trim().is_empty() {
            return Err(invalid("Phone number cannot be empty"));
        }

        if number.len() > MAX_PHONE_NUMBER {
            return Err(invalid(format!(
                "Phone number too long (max {MAX_PHONE_NUMBER} bytes)"
            )));
        }

        if !phone_number_pattern().is_match(number) {
            return Err(invalid(format!("Phone number contains invalid characters: {number}")));
        }

        Ok(())
    }

    /// Validate the stored picture name (base name of the imported file)
    pub fn validate_picture_name(picture_name: &str) -> Result<()> {
        if picture_name.is_empty() {
            return Err(invalid("Picture name cannot be empty"));
        }

        if picture_name.len() > MAX_PICTURE_NAME {
            return Err(invalid(format!(
                "Picture name too long (max {MAX_PICTURE_NAME} bytes)"
            )));
        }

        if picture_name.contains('\0') {
            return Err(invalid("Picture name contains invalid characters"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_numbers_are_valid() {
        for number in ["206-555-1000", "206-555-3890", "+1 (206) 555-5361"] {
            assert!(InputValidator::validate_phone_number(number).is_ok(), "{number}");
        }
    }

    #[test]
    fn test_name_limit_counts_characters() {
        let name = "é".repeat(MAX_CONTACT_NAME);
        assert!(name.len() > MAX_CONTACT_NAME);
        assert!(InputValidator::validate_contact_name(&name).is_ok());
    }
}
