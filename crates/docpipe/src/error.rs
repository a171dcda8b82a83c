//! Error types for the document pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::types::ContentType;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Format-specific decode failure
    #[error("{message}")]
    Decode {
        content_type: ContentType,
        message: String,
    },

    /// No decoder matches the filename or declared type
    #[error("{0}")]
    UnsupportedFileType(String),

    /// Record (or its parsed content) not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upload exceeds the configured ceiling
    #[error("File too large. Maximum size is {}MB", .max / (1024 * 1024))]
    PayloadTooLarge { size: usize, max: usize },

    /// Malformed request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Record store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a decode error
    pub fn decode(content_type: ContentType, message: impl Into<String>) -> Self {
        Self::Decode {
            content_type,
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Content type attached to a decoder or dispatch failure
    pub fn content_type(&self) -> Option<ContentType> {
        match self {
            Self::Decode { content_type, .. } => Some(*content_type),
            Self::UnsupportedFileType(_) => Some(ContentType::Unknown),
            _ => None,
        }
    }

    /// Decode and dispatch failures end a job as `failed` with this message;
    /// any other error is unexpected.
    pub fn is_decode_failure(&self) -> bool {
        self.content_type().is_some()
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg.clone()),
            Error::Decode { message, .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "parse_error", message.clone())
            }
            Error::UnsupportedFileType(msg) => {
                (StatusCode::BAD_REQUEST, "unsupported_type", msg.clone())
            }
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            Error::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", self.to_string())
            }
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            Error::Storage(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg.clone())
            }
            Error::Io(err) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error", err.to_string()),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "json_error", err.to_string()),
            Error::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
        };

        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
