use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub type ThrottlerResult<T> = Result<T, ThrottlerError>;

#[derive(Debug, Error)]
pub enum ThrottlerError {
    /// Invalid bucket configuration. Only raised while starting up.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Store operation timed out after {0:?}")]
    StoreTimeout(Duration),

    #[error("Could not decode bucket record: {0}")]
    RecordParse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ThrottlerError {
    /// True for failures talking to the backing store.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, ThrottlerError::Redis(_) | ThrottlerError::StoreTimeout(_))
    }
}

impl From<redis::RedisError> for ThrottlerError {
    fn from(err: redis::RedisError) -> Self {
        ThrottlerError::Redis(err.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
        }
    }

    pub fn from_error(err: &ThrottlerError) -> Self {
        let message = err.to_string();
        match err {
            ThrottlerError::ValidationError(_) => Self::new("validation_error", &message, 422),
            ThrottlerError::Redis(_) | ThrottlerError::StoreTimeout(_) => {
                Self::new("service_unavailable", &message, 503)
            }
            ThrottlerError::Configuration(_) => Self::new("configuration_error", &message, 500),
            ThrottlerError::RecordParse(_) | ThrottlerError::Internal(_) => {
                Self::new("internal_error", &message, 500)
            }
        }
    }
}

impl IntoResponse for ThrottlerError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_error(&self);
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        (status, Json(body)).into_response()
    }
}
