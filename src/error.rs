//! Top-level HTTP error type. Every handler returns `Result<_, ApiError>`;
//! storage and registry errors convert into it via `From` (§7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::registry::RegistryError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => Self::NotFound(id),
            StorageError::InvalidId(id) => Self::BadRequest(format!("invalid id: {id}")),
            StorageError::Io(msg) => Self::BackendUnavailable(msg),
            StorageError::Corrupt(msg) => Self::BackendUnavailable(msg),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        Self::PreconditionFailed(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BackendUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, axum::Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
