//! Error types for aural-ls
//!
//! [`Error`] is the domain taxonomy shared by the stores, the training index
//! and the sessions. [`ApiError`] maps it onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Domain error for clip storage, labeling and training
#[derive(Debug, Error)]
pub enum Error {
    /// Input failed a structural or shape invariant (client error, never retried)
    #[error("Malformed: {0}")]
    Malformed(String),

    /// The all-zero clip id is reserved for "no clip"
    #[error("Clip id is empty")]
    EmptyClipId,

    /// Clip bytes do not have the fixed clip length
    #[error("Invalid clip length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Missing entity
    #[error("Not found: {0}")]
    NotFound(String),

    /// Vocabulary is not configured
    #[error("Unknown vocabulary: {0}")]
    UnknownVocabulary(String),

    /// A durable label could not be recorded in the training index
    #[error("Training index inconsistent: {0}")]
    IndexInconsistency(String),

    /// Feature extraction backend failed
    #[error("Feature extraction failed: {0}")]
    FeatureExtractionFailed(String),

    /// Feature tensor shape disagrees with the vocabulary
    #[error("Feature shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// Training backend failed
    #[error("Backend failure: {0}")]
    BackendFailure(String),

    /// Durability layer error; the write did not happen
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// The session worker for a vocabulary is no longer running
    #[error("Training session closed: {0}")]
    SessionClosed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::StorageFailure(format!("database: {}", err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageFailure(format!("io: {}", err))
    }
}

impl From<aural_common::Error> for Error {
    fn from(err: aural_common::Error) -> Self {
        match err {
            aural_common::Error::Config(msg) => Error::Config(msg),
            other => Error::StorageFailure(other.to_string()),
        }
    }
}

impl Error {
    /// Client errors are caused by the request and never by server state
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Malformed(_) | Error::EmptyClipId | Error::InvalidLength { .. } | Error::NotFound(_)
        )
    }

    /// SQLite lock contention, worth retrying
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, Error::StorageFailure(msg) if msg.contains("database is locked"))
    }
}

/// Convenience Result type using the aural-ls Error
pub type Result<T> = std::result::Result<T, Error>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Domain error
    #[error(transparent)]
    Domain(#[from] Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Domain(err) => {
                let (status, code) = match &err {
                    Error::Malformed(_) => (StatusCode::BAD_REQUEST, "MALFORMED"),
                    Error::EmptyClipId => (StatusCode::BAD_REQUEST, "EMPTY_CLIP_ID"),
                    Error::InvalidLength { .. } => (StatusCode::BAD_REQUEST, "INVALID_LENGTH"),
                    Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    Error::UnknownVocabulary(_) => (StatusCode::NOT_FOUND, "UNKNOWN_VOCABULARY"),
                    Error::IndexInconsistency(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "INDEX_INCONSISTENCY")
                    }
                    Error::FeatureExtractionFailed(_)
                    | Error::ShapeMismatch { .. }
                    | Error::BackendFailure(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "BACKEND_FAILURE")
                    }
                    Error::StorageFailure(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_FAILURE")
                    }
                    Error::SessionClosed(_) => (StatusCode::SERVICE_UNAVAILABLE, "SESSION_CLOSED"),
                    Error::Config(_) | Error::Internal(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                    }
                };
                (status, code, err.to_string())
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;
