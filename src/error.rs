use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid coordinate ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidCoordinate { .. } => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Storage(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Failure of a single remote submission. Transient and permanent failures
/// both stop a drain at the head.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote rejected action: {0}")]
    Rejected(String),

    #[error("remote call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<tonic::Status> for RemoteError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::InvalidArgument
            | tonic::Code::FailedPrecondition
            | tonic::Code::NotFound
            | tonic::Code::PermissionDenied => RemoteError::Rejected(status.message().to_string()),
            _ => RemoteError::Transport(format!("{}: {}", status.code(), status.message())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GpsError {
    #[error("gps unavailable: {0}")]
    Unavailable(String),

    #[error("gps fix timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("gps fix is stale ({age_secs}s old)")]
    Stale { age_secs: i64 },

    #[error("gps fix is dated {ahead_secs}s in the future")]
    FutureDated { ahead_secs: i64 },

    #[error("gps fix has invalid coordinate")]
    InvalidFix,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage lock poisoned")]
    Poisoned,
}
