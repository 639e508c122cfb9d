//! Error types for plexkw-labeler
//!
//! Every user-visible failure renders as `{"status": "error", "message": ...}`.
//! Internal failures log their detail and return a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Message returned for any 500; details go to the log only
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Wrong request content type (415)
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// plexkw-common error
    #[error("Common error: {0}")]
    Common(#[from] plexkw_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::UnsupportedMediaType(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg),
            ApiError::Internal(ref detail) => {
                tracing::error!(error = %detail, "Request failed with internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE.to_string())
            }
            ApiError::Other(ref err) => {
                tracing::error!(error = ?err, "Request failed with internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE.to_string())
            }
            ApiError::Common(plexkw_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, msg)
            }
            ApiError::Common(ref err) => {
                tracing::error!(error = %err, "Request failed with internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE.to_string())
            }
        };

        error_response(status, message)
    }
}

/// Build the stable `{status: "error", message}` body
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = Json(json!({
        "status": "error",
        "message": message.into(),
    }));

    (status, body).into_response()
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
