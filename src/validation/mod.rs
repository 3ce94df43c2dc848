//! Input validation for purge ids.
//!
//! Ids arrive in webhook URLs and end up compared against message fields, so
//! they are restricted to ASCII letters and digits.

use std::fmt;

/// Error constants for validation failures.
pub mod errmsg {
    pub const PURGE_ID_EMPTY: &str = "purge id cannot be empty";
    pub const PURGE_ID_INVALID_CHARS: &str =
        "purge id contains invalid characters (allowed: a-zA-Z0-9)";
}

/// Rejected purge id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{msg}", msg = errmsg::PURGE_ID_EMPTY)]
    Empty,

    #[error("{msg} (got: {0:?})", msg = errmsg::PURGE_ID_INVALID_CHARS)]
    InvalidChars(String),
}

/// A validated purge id: non-empty, ASCII alphanumeric only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PurgeId(String);

impl PurgeId {
    /// Validate `raw` as a purge id.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.is_empty() {
            return Err(ValidationError::Empty);
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidChars(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PurgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        for raw in ["a", "abc123", "ABC", "0", "Order42"] {
            assert_eq!(PurgeId::parse(raw).unwrap().as_str(), raw);
        }
    }

    #[test]
    fn test_empty_id() {
        assert_eq!(PurgeId::parse(""), Err(ValidationError::Empty));
    }

    #[test]
    fn test_invalid_chars() {
        for raw in ["abc-123", "a b", "a/b", "a_b", "id.1", "caf\u{e9}", "١٢٣"] {
            assert!(
                matches!(PurgeId::parse(raw), Err(ValidationError::InvalidChars(_))),
                "expected {:?} to be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_error_message() {
        let err = PurgeId::parse("a-b").unwrap_err();
        assert!(err.to_string().starts_with(errmsg::PURGE_ID_INVALID_CHARS));
    }
}
