//! Error types for the HTTP handlers.

use aspm_core::ingest::IngestError;
use aspm_core::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors a handler can return.
///
/// Detail stays in the `Display` output for logs; response bodies are
/// generic.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The body is malformed or incomplete.
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    /// The store failed and the affected transaction was rolled back.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Internal error (should not occur in normal operation).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    ///
    /// - Invalid submission: 400 Bad Request
    /// - Storage and internal: 500 Internal Server Error
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSubmission(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::InvalidSubmission { reason } => Self::InvalidSubmission(reason),
            IngestError::Store(e) => Self::Storage(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::InvalidSubmission(_) => "Invalid submission",
            Self::Storage(_) | Self::Internal(_) => "Internal server error",
        };

        (status, body).into_response()
    }
}
