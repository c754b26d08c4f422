use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracklens_analytics::csv::{CONTENT_TYPE as CSV_CONTENT_TYPE, CsvWriter};
use tracklens_analytics::{Grid, QueryError};

const JSON_CONTENT_TYPE: &str = "application/json";

/// JSON error body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Reason phrase, e.g. `Conflict`.
    pub http_status: String,
    pub http_status_code: u16,
    /// Always `ERROR`.
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ErrorBody {
    pub fn new(status: StatusCode, message: impl Into<String>, error_code: Option<&str>) -> Self {
        Self {
            http_status: status.canonical_reason().unwrap_or("Unknown").to_string(),
            http_status_code: status.as_u16(),
            status: "ERROR".to_string(),
            message: message.into(),
            error_code: error_code.map(str::to_string),
        }
    }
}

/// High-level API errors to be mapped to HTTP responses
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {message}")]
    BadRequest {
        message: String,
        code: Option<&'static str>,
    },
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        code: Option<&'static str>,
    },
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        code: Option<&'static str>,
    },
    #[error("Internal server error: {message}")]
    Internal {
        message: String,
        code: Option<&'static str>,
    },
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest {
            message: msg.into(),
            code: None,
        }
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound {
            message: msg.into(),
            code: None,
        }
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict {
            message: msg.into(),
            code: None,
        }
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            code: None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest { message, .. }
            | ApiError::NotFound { message, .. }
            | ApiError::Conflict { message, .. }
            | ApiError::Internal { message, .. } => message,
        }
    }

    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            ApiError::BadRequest { code, .. }
            | ApiError::NotFound { code, .. }
            | ApiError::Conflict { code, .. }
            | ApiError::Internal { code, .. } => *code,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody::new(self.status_code(), self.message(), self.error_code())
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        let code = Some(err.error_code());
        let message = err.to_string();
        match &err {
            QueryError::InvalidDimension { .. } => ApiError::Conflict { message, code },
            QueryError::MissingAnchorDate(_)
            | QueryError::UnknownDimension(_)
            | QueryError::InvalidParameter { .. } => ApiError::BadRequest { message, code },
            QueryError::NotFound { .. } => ApiError::NotFound { message, code },
            QueryError::Core(_) if err.is_client_error() => ApiError::BadRequest { message, code },
            QueryError::Core(_) | QueryError::Storage(_) | QueryError::Output(_) => {
                tracing::error!(error = %err, "query failed");
                ApiError::Internal { message, code }
            }
        }
    }
}

fn build_response(
    status: StatusCode,
    content_type: &'static str,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Vec<u8>,
) -> Response {
    let mut builder = axum::http::Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    for (n, v) in headers.into_iter() {
        builder = builder.header(n, v);
    }
    builder
        .body(axum::body::Body::from(body))
        .unwrap_or_else(|_| {
            let mut fallback = Response::new(axum::body::Body::from("{}"));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}

fn fallback_body() -> Vec<u8> {
    let fallback = ErrorBody::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Serialization failure",
        None,
    );
    serde_json::to_vec(&fallback).unwrap_or_else(|_| b"{}".to_vec())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::to_vec(&self.to_body()).unwrap_or_else(|_| fallback_body());
        build_response(self.status_code(), JSON_CONTENT_TYPE, Vec::new(), body)
    }
}

// -------------------------
// API Response Wrapper
// -------------------------

#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub value: T,
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl<T> ApiResponse<T> {
    pub fn new(value: T, status: StatusCode) -> Self {
        Self {
            value,
            status,
            headers: Vec::new(),
        }
    }

    pub fn ok(value: T) -> Self {
        Self::new(value, StatusCode::OK)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = serde_json::to_vec(&self.value).unwrap_or_else(|_| fallback_body());
        build_response(self.status, JSON_CONTENT_TYPE, self.headers, body)
    }
}

/// A grid rendered as CSV with a header line of column names.
#[derive(Debug, Clone)]
pub struct CsvGrid(pub Grid);

impl IntoResponse for CsvGrid {
    fn into_response(self) -> Response {
        match CsvWriter::new().to_string(&self.0) {
            Ok(text) => build_response(
                StatusCode::OK,
                CSV_CONTENT_TYPE,
                Vec::new(),
                text.into_bytes(),
            ),
            Err(err) => ApiError::from(err).into_response(),
        }
    }
}
