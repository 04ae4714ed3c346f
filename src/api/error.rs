//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::errors::FlightLoggerError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed request input
    #[error("{0}")]
    BadRequest(String),

    /// A settings document could not be written
    #[error("{0}")]
    Persistence(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Persistence(_) | Self::Database(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl From<FlightLoggerError> for ApiError {
    fn from(e: FlightLoggerError) -> Self {
        match e {
            FlightLoggerError::InvalidTimestamp(_) | FlightLoggerError::InvalidIcao(_) => {
                Self::BadRequest(e.to_string())
            }
            FlightLoggerError::DatabaseError(e) => Self::Database(e),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        (
            status,
            Json(json!({
                "success": false,
                "error": self.to_string(),
            })),
        )
            .into_response()
    }
}
