//! API error taxonomy and HTTP mapping
//!
//! Every error leaving a handler is rendered as an `ErrorResponse` body with a
//! stable `error_code` string, so clients can branch without parsing prose.

use crate::models::ErrorResponse;
use crate::worker::WorkerError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("No session slots available (max {0} concurrent sessions)")]
    NoSlotsAvailable(usize),

    #[error("Session already finished: {0}")]
    SessionAlreadyDone(String),

    #[error("Container error: {0}")]
    Container(String),

    #[error("Worker did not reply within {0:?}")]
    WorkerTimeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NoSlotsAvailable(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::SessionAlreadyDone(_) => StatusCode::CONFLICT,
            ApiError::Container(_) => StatusCode::BAD_GATEWAY,
            ApiError::WorkerTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::SessionNotFound(_) => "session_not_found",
            ApiError::NoSlotsAvailable(_) => "no_slots_available",
            ApiError::SessionAlreadyDone(_) => "session_already_done",
            ApiError::Container(_) => "container_error",
            ApiError::WorkerTimeout(_) => "worker_timeout",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<WorkerError> for ApiError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Timeout(d) => ApiError::WorkerTimeout(d),
            other => ApiError::Container(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            detail: self.to_string(),
            error_code: self.error_code().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
