//! Error types for eq-gateway
//!
//! One taxonomy for the whole service: validation and auth failures bubble
//! to the endpoint as explicit HTTP errors; internal failures surface as a
//! generic 500 with the detail kept in the logs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// No usable identity on the request (401)
    #[error("Authentication required")]
    AuthMissing,

    /// Token present but failed verification (401)
    #[error("Invalid authentication: {0}")]
    AuthInvalid(String),

    /// Token expired (401)
    #[error("Authentication token expired")]
    AuthExpired,

    /// Caller-side validation failure (400), carries the machine code
    #[error("Validation failed ({code}): {message}")]
    Validation {
        code: &'static str,
        message: String,
    },

    /// Resource unknown or not visible to this tenant (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource in the wrong state for the requested transition (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500), carries the machine code
    #[error("Internal error ({code}): {message}")]
    Internal {
        code: &'static str,
        message: String,
    },

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// eq-common error (500)
    #[error("Common error: {0}")]
    Common(#[from] eq_common::Error),

    /// Generic error (500)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Internal {
            code,
            message: message.into(),
        }
    }

    /// Machine-readable code for logs and job records
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::AuthMissing => "AUTH_MISSING",
            ApiError::AuthInvalid(_) => "AUTH_INVALID",
            ApiError::AuthExpired => "AUTH_EXPIRED",
            ApiError::Validation { code, .. } => *code,
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Internal { code, .. } => *code,
            ApiError::Database(_) => "INTERNAL",
            ApiError::Common(_) => "INTERNAL",
            ApiError::Other(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::AuthMissing => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::AuthInvalid(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::AuthExpired => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Validation { message, .. } => (StatusCode::BAD_REQUEST, message.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Internal { message, .. } => {
                tracing::error!(code = self.code(), error = %message, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Common(err) => {
                tracing::error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Other(err) => {
                tracing::error!(error = %err, "Unhandled error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_taxonomy() {
        assert_eq!(ApiError::AuthMissing.code(), "AUTH_MISSING");
        assert_eq!(
            ApiError::validation("VALIDATION_EMPTY_TEXT", "empty").code(),
            "VALIDATION_EMPTY_TEXT"
        );
        assert_eq!(
            ApiError::internal("TRANSCRIPTION_FAILED", "boom").code(),
            "TRANSCRIPTION_FAILED"
        );
        assert_eq!(ApiError::NotFound("job".into()).code(), "NOT_FOUND");
        assert_eq!(ApiError::Conflict("state".into()).code(), "CONFLICT");
    }
}
