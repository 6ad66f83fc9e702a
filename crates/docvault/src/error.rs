//! Error types for the document service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for docvault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Document service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad or missing upload input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upload exceeds the configured size limit
    #[error("Upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    /// Sniffed content type is not on the allow-list
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Blob store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Metadata store failure
    #[error("Database error: {0}")]
    Database(String),

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
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error means the requested document does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::DocumentNotFound(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("Task join error: {}", err))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            Error::PayloadTooLarge { .. } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                self.to_string(),
            ),
            Error::UnsupportedFileType(mime) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_type",
                format!("Unsupported file type: {}", mime),
            ),
            Error::DocumentNotFound(id) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Document not found: {}", id),
            ),
            Error::Storage(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg.clone()),
            Error::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                err.to_string(),
            ),
            Error::Database(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", msg.clone())
            }
            Error::Json(err) => (StatusCode::BAD_REQUEST, "validation_error", err.to_string()),
            Error::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
        };

        if status.is_server_error() {
            tracing::error!("{} ({}): {}", status, error_type, message);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (Error::validation("missing name"), StatusCode::BAD_REQUEST),
            (
                Error::PayloadTooLarge { limit: 5 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                Error::UnsupportedFileType("application/x-executable".into()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (Error::DocumentNotFound("abc".into()), StatusCode::NOT_FOUND),
            (Error::storage("disk full"), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::database("locked"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_not_found_predicate() {
        assert!(Error::DocumentNotFound("x".into()).is_not_found());
        assert!(!Error::storage("x").is_not_found());
    }
}
