//! Storage error types for the read-side storage abstraction.

use std::fmt;

/// Errors that can occur during storage reads.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested record or metadata object was not found.
    #[error("Not found: {kind}/{uid}")]
    NotFound {
        /// The kind of object that was not found.
        kind: String,
        /// The UID that was looked up.
        uid: String,
    },

    /// The query handed to the backend is not supported or is malformed.
    #[error("Invalid query: {message}")]
    InvalidQuery {
        /// Description of why the query is invalid.
        message: String,
    },

    /// Stored data could not be decoded.
    #[error("Corrupt data: {message}")]
    CorruptData {
        /// Description of the decoding failure.
        message: String,
    },

    /// Failed to connect to the storage backend.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, uid: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            uid: uid.into(),
        }
    }

    /// Creates a new `InvalidQuery` error.
    #[must_use]
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates a new `CorruptData` error.
    #[must_use]
    pub fn corrupt_data(message: impl Into<String>) -> Self {
        Self::CorruptData {
            message: message.into(),
        }
    }

    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the backend could not be reached.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionError { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::InvalidQuery { .. } => ErrorCategory::Validation,
            Self::CorruptData { .. } => ErrorCategory::Data,
            Self::ConnectionError { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::corrupt_data(err.to_string())
    }
}

impl From<tracklens_core::CoreError> for StorageError {
    fn from(err: tracklens_core::CoreError) -> Self {
        if err.is_client_error() {
            Self::invalid_query(err.to_string())
        } else {
            Self::internal(err.to_string())
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Record not found.
    NotFound,
    /// Validation error.
    Validation,
    /// Undecodable stored data.
    Data,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Validation => write!(f, "validation"),
            Self::Data => write!(f, "data"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("Program", "IpHINAT79UW");
        assert_eq!(err.to_string(), "Not found: Program/IpHINAT79UW");

        let err = StorageError::connection_error("refused");
        assert_eq!(err.to_string(), "Connection error: refused");
    }

    #[test]
    fn test_error_predicates() {
        assert!(StorageError::not_found("Event", "x").is_not_found());
        assert!(!StorageError::internal("boom").is_not_found());
        assert!(StorageError::connection_error("down").is_connection_error());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::not_found("a", "b").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            StorageError::invalid_query("bad").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            StorageError::connection_error("x").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(ErrorCategory::Data.to_string(), "data");
    }

    #[test]
    fn test_from_core_error() {
        let err: StorageError = tracklens_core::CoreError::invalid_uid("bad").into();
        assert!(matches!(err, StorageError::InvalidQuery { .. }));
        let err: StorageError = tracklens_core::CoreError::configuration("bad").into();
        assert!(matches!(err, StorageError::Internal { .. }));
    }
}
