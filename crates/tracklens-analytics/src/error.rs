use thiserror::Error;
use tracklens_core::{CoreError, ErrorCategory};
use tracklens_storage::StorageError;

/// Errors surfaced by the analytics pipeline. None of them are retried.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid dimension `{token}`: {message}")]
    InvalidDimension { token: String, message: String },

    #[error("Relative period `{0}` requires relativePeriodDate")]
    MissingAnchorDate(String),

    #[error("Unknown dimension `{0}`: not present in the query plan")]
    UnknownDimension(String),

    #[error("Invalid value for {param}: {message}")]
    InvalidParameter { param: String, message: String },

    #[error("{kind} not found: {uid}")]
    NotFound { kind: String, uid: String },

    #[error("Output error: {0}")]
    Output(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl QueryError {
    #[must_use]
    pub fn invalid_dimension(token: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDimension {
            token: token.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn missing_anchor_date(keyword: impl Into<String>) -> Self {
        Self::MissingAnchorDate(keyword.into())
    }

    #[must_use]
    pub fn unknown_dimension(key: impl Into<String>) -> Self {
        Self::UnknownDimension(key.into())
    }

    #[must_use]
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(kind: impl Into<String>, uid: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            uid: uid.into(),
        }
    }

    /// Check if this error was caused by the request (4xx category)
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::InvalidDimension { .. }
            | Self::MissingAnchorDate(_)
            | Self::UnknownDimension(_)
            | Self::InvalidParameter { .. }
            | Self::NotFound { .. } => true,
            Self::Core(err) => err.is_client_error(),
            Self::Output(_) | Self::Storage(_) => false,
        }
    }

    /// Returns the error category for logging/monitoring purposes.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidDimension { .. }
            | Self::MissingAnchorDate(_)
            | Self::UnknownDimension(_)
            | Self::InvalidParameter { .. } => ErrorCategory::Validation,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Output(_) => ErrorCategory::Serialization,
            Self::Storage(_) => ErrorCategory::System,
            Self::Core(err) => err.category(),
        }
    }

    /// Stable machine-readable code reported alongside the message.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidDimension { .. } => "E7100",
            Self::MissingAnchorDate(_) => "E7101",
            Self::UnknownDimension(_) => "E7102",
            Self::InvalidParameter { .. } => "E7103",
            Self::NotFound { .. } => "E7104",
            Self::Output(_) => "E7200",
            Self::Storage(_) => "E7300",
            Self::Core(_) => "E7301",
        }
    }
}
