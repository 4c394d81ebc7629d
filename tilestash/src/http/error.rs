//! API error responses.

use crate::archive::ArchiveError;
use crate::import::ImportError;
use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// An error rendered as `{"message": ...}` with an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Server-side failure; logged here since the client only sees the message.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(error = %message, "Request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::NotFound(_) => Self::not_found(e.to_string()),
            ImportError::ShuttingDown => Self::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
            ImportError::Store(inner) => inner.into(),
            other => Self::bad_request(other.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => Self::not_found(e.to_string()),
            StoreError::InvalidIdentifier(_) => Self::bad_request(e.to_string()),
            StoreError::AlreadyExists(_) | StoreError::Rejected { .. } => {
                Self::new(StatusCode::CONFLICT, e.to_string())
            }
            StoreError::Backend(_) => Self::internal(e.to_string()),
        }
    }
}

impl From<ArchiveError> for ApiError {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::NotFound(_)
            | ArchiveError::TileNotFound { .. }
            | ArchiveError::InvalidName(_) => Self::not_found(e.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}
