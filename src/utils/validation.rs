//! Input validation primitives.
//!
//! Configuration problems surface as `config.*` errors naming the dotted key
//! that failed, so operators can find the line in their deploy file.

use crate::error::{Error, Result};

/// Require an Option to contain a value.
pub fn require<T>(opt: Option<T>, key: &str, path: Option<&str>) -> Result<T> {
    opt.ok_or_else(|| Error::config_missing_key(key, path.map(str::to_string)))
}

/// Require a string to be non-empty after trimming.
///
/// Returns the trimmed string on success.
pub fn require_non_empty<'a>(value: &'a str, key: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::config_invalid_value(key, Some(value.to_string()), "must not be empty"))
    } else {
        Ok(trimmed)
    }
}
