//! Store error types
//!
//! Defines all errors that can occur in the persistence layer and the
//! domain rules enforced on top of it.

use thiserror::Error;

/// Errors that can occur in the store and its repositories
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O operation failed (creating the data directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON column could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Connection mutex was poisoned by a panicking writer
    #[error("Lock error: {0}")]
    Lock(String),

    /// Requested record does not exist (or is not visible to the caller)
    #[error("{0}")]
    NotFound(String),

    /// Input rejected by a domain rule
    #[error("{0}")]
    Invalid(String),

    /// Caller is not allowed to perform the action
    #[error("{0}")]
    Forbidden(String),

    /// Action conflicts with the current state of the record
    #[error("{0}")]
    Conflict(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl StoreError {
    pub fn not_found(message: impl Into<String>) -> Self {
        StoreError::NotFound(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        StoreError::Invalid(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        StoreError::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        StoreError::Conflict(message.into())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::invalid("You cannot invite yourself.");
        assert_eq!(err.to_string(), "You cannot invite yourself.");

        let err = StoreError::Lock("poisoned".to_string());
        assert_eq!(err.to_string(), "Lock error: poisoned");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let store_err: StoreError = io_err.into();
        assert!(matches!(store_err, StoreError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let store_err: StoreError = json_err.into();
        assert!(matches!(store_err, StoreError::Serialization(_)));
    }
}
