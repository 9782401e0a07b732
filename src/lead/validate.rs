//! Field validators. Pure functions, no network checks.

use std::sync::LazyLock;

use regex::Regex;

use super::model::LeadField;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$")
        .unwrap()
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9 ().\-]+$").unwrap());

const PHONE_MIN_DIGITS: usize = 7;
const PHONE_MAX_DIGITS: usize = 15;

/// `local@domain.tld` shape.
pub fn validate_email(s: &str) -> bool {
    EMAIL_RE.is_match(s.trim())
}

/// Digits with optional separators and one leading `+`, 7–15 digits.
pub fn validate_phone(s: &str) -> bool {
    let s = s.trim();
    if !PHONE_RE.is_match(s) {
        return false;
    }
    let digits = s.chars().filter(char::is_ascii_digit).count();
    (PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&digits)
}

pub fn validate_non_empty(s: &str) -> bool {
    !s.trim().is_empty()
}

/// Validate a candidate for `field`, returning why it was rejected.
pub fn validate_field(field: LeadField, value: &str) -> Result<(), String> {
    match field {
        LeadField::Email if !validate_email(value) => {
            Err(format!("\"{}\" is not a valid email address", value.trim()))
        }
        LeadField::Phone if !validate_phone(value) => Err(format!(
            "\"{}\" is not a valid phone number (expected {}-{} digits)",
            value.trim(),
            PHONE_MIN_DIGITS,
            PHONE_MAX_DIGITS
        )),
        LeadField::Name | LeadField::Requirement if !validate_non_empty(value) => {
            Err(format!("the {} cannot be empty", field.label()))
        }
        _ => Ok(()),
    }
}
