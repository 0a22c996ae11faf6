//! Error responses for API handlers

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pipstream_core::Error;
use serde::Serialize;
use tracing::warn;

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// Handler error carrying the response status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: message.into(),
                code,
            },
        }
    }

    /// Workflow routes hit while the `workflow` section is disabled.
    pub fn workflow_disabled() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "WORKFLOW_DISABLED",
            "Workflow engine is not configured",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::BackendUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "BACKEND_UNAVAILABLE"),
            Error::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, "SHUTTING_DOWN"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            Error::QueryUnsupported { .. } => (StatusCode::BAD_REQUEST, "QUERY_UNSUPPORTED"),
            Error::Workflow(_) => (StatusCode::BAD_GATEWAY, "WORKFLOW_ERROR"),
            Error::InvariantViolation(_)
            | Error::Format(_)
            | Error::Configuration(_)
            | Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };
        if status.is_server_error() {
            warn!(error = %err, "Request failed");
        }
        Self::new(status, code, err.client_message())
    }
}
