use thiserror::Error;

/// Core error types for TrackLens operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid UID: {0}")]
    InvalidUid(String),

    #[error("Invalid date/time: {0}")]
    InvalidDateTime(String),

    #[error("Invalid value type: {0}")]
    InvalidValueType(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Time formatting error: {0}")]
    TimeFormat(#[from] time::error::Format),

    #[error("Metadata object not found: {kind}/{uid}")]
    MetadataNotFound { kind: String, uid: String },

    #[error("Invalid metadata: {message}")]
    InvalidMetadata { message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Create a new InvalidUid error
    pub fn invalid_uid(uid: impl Into<String>) -> Self {
        Self::InvalidUid(uid.into())
    }

    /// Create a new InvalidDateTime error
    pub fn invalid_date_time(datetime: impl Into<String>) -> Self {
        Self::InvalidDateTime(datetime.into())
    }

    /// Create a new InvalidValueType error
    pub fn invalid_value_type(value_type: impl Into<String>) -> Self {
        Self::InvalidValueType(value_type.into())
    }

    /// Create a new MetadataNotFound error
    pub fn metadata_not_found(kind: impl Into<String>, uid: impl Into<String>) -> Self {
        Self::MetadataNotFound {
            kind: kind.into(),
            uid: uid.into(),
        }
    }

    /// Create a new InvalidMetadata error
    pub fn invalid_metadata(message: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            message: message.into(),
        }
    }

    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if this error is a client error (4xx category)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidUid(_)
                | Self::InvalidDateTime(_)
                | Self::InvalidValueType(_)
                | Self::MetadataNotFound { .. }
                | Self::JsonError(_)
        )
    }

    /// Check if this error is a server error (5xx category)
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::TimeFormat(_) | Self::InvalidMetadata { .. }
        )
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidUid(_) | Self::InvalidDateTime(_) | Self::InvalidValueType(_) => {
                ErrorCategory::Validation
            }
            Self::MetadataNotFound { .. } => ErrorCategory::NotFound,
            Self::InvalidMetadata { .. } => ErrorCategory::Metadata,
            Self::JsonError(_) => ErrorCategory::Serialization,
            Self::TimeFormat(_) => ErrorCategory::System,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Metadata,
    Serialization,
    System,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::NotFound => write!(f, "not_found"),
            Self::Metadata => write!(f, "metadata"),
            Self::Serialization => write!(f, "serialization"),
            Self::System => write!(f, "system"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
