//! HTTP error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use storemetrics_core::{ErrorKind, StoreMetricsError};

/// JSON error body: `{error, message?, details?}`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                message: None,
                details: None,
            },
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    pub fn internal(details: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").with_details(details)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.body.message = Some(message.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.body.details = Some(details.into());
        self
    }

    /// Translate a core error. `context` names the failed operation and is
    /// only used for storage failures, whose raw text goes to `details`.
    pub fn from_core(err: StoreMetricsError, context: &str) -> Self {
        match err.kind() {
            ErrorKind::Validation => Self::bad_request(err.to_string()),
            ErrorKind::NotFound => match err {
                StoreMetricsError::TableNotFound(_) => Self::new(
                    StatusCode::NOT_FOUND,
                    "No data available. Please upload a file first.",
                ),
                other => Self::new(StatusCode::NOT_FOUND, "No data available")
                    .with_message(other.to_string()),
            },
            ErrorKind::Conflict => Self::new(StatusCode::CONFLICT, err.to_string()),
            ErrorKind::Timeout => Self::new(StatusCode::REQUEST_TIMEOUT, err.to_string()),
            ErrorKind::Storage => Self::new(StatusCode::INTERNAL_SERVER_ERROR, context)
                .with_details(err.to_string()),
        }
    }
}

impl From<StoreMetricsError> for ApiError {
    fn from(err: StoreMetricsError) -> Self {
        Self::from_core(err, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!(
                "{} {}: {}",
                self.status.as_u16(),
                self.body.error,
                self.body.details.as_deref().unwrap_or("")
            );
        } else {
            log::warn!("{} {}", self.status.as_u16(), self.body.error);
        }
        (self.status, Json(self.body)).into_response()
    }
}
