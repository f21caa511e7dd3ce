//! API error responses
//!
//! Service errors are converted to a JSON body with a machine-readable
//! code; the HTTP status is derived from the code. Storage failures are
//! logged here and surfaced as 5xx without being retried.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::services::{GroupRegistryError, PresenceError};

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CODE_GENERATION_EXHAUSTED" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<PresenceError> for ApiError {
    fn from(err: PresenceError) -> Self {
        match err {
            PresenceError::NotFound(message) => Self::not_found(message),
            PresenceError::ValidationError(message) => Self::validation_error(message),
            PresenceError::InternalError(e) => {
                tracing::error!("Presence operation failed: {:#}", e);
                Self::internal_error("Internal server error")
            }
        }
    }
}

impl From<GroupRegistryError> for ApiError {
    fn from(err: GroupRegistryError) -> Self {
        match err {
            GroupRegistryError::CodeGenerationExhausted => Self::new(
                "CODE_GENERATION_EXHAUSTED",
                "Could not generate an unused join code, try again",
            ),
            GroupRegistryError::InternalError(e) => {
                tracing::error!("Registry operation failed: {:#}", e);
                Self::internal_error("Internal server error")
            }
        }
    }
}
