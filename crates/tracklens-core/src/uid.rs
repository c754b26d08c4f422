//! Eleven-character identifiers used by every metadata object and record.

use crate::error::{CoreError, Result};

pub const UID_LENGTH: usize = 11;

/// A letter followed by ten ASCII alphanumerics.
pub fn is_valid_uid(uid: &str) -> bool {
    let bytes = uid.as_bytes();
    bytes.len() == UID_LENGTH
        && bytes[0].is_ascii_alphabetic()
        && bytes.iter().all(u8::is_ascii_alphanumeric)
}

pub fn validate_uid(uid: &str) -> Result<()> {
    if is_valid_uid(uid) {
        Ok(())
    } else {
        Err(CoreError::invalid_uid(uid))
    }
}
