use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::jobs::StoreError;
use crate::scheduler::{QueueError, SubmitError};

/// Message returned for any unexpected failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again later.";

/// Errors surfaced by the HTTP gateway as `{"detail": ...}` bodies.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    /// Missing or malformed form fields, one `"field: msg"` entry each.
    #[error("validation failed: {}", .0.join(", "))]
    Unprocessable(Vec<String>),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn task_not_found(task_id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("Task with ID {task_id} not found"))
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Unprocessable(errors) => {
                tracing::warn!(errors = ?errors, "validation error");
                json!({ "detail": errors })
            }
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "unhandled error");
                json!({ "detail": INTERNAL_ERROR_MESSAGE })
            }
            other => {
                tracing::debug!(status = status.as_u16(), detail = %other, "request rejected");
                json!({ "detail": other.to_string() })
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::Queue(QueueError::QueueFull { .. }) => {
                Self::Unavailable("The generation queue is full. Please try again later.".into())
            }
            SubmitError::Queue(QueueError::Closed) | SubmitError::ShuttingDown => {
                Self::Unavailable("The service is shutting down.".into())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::task_not_found(id),
            StoreError::InvalidTransition { id, from, .. } => {
                Self::Conflict(format!("Task with ID {id} is already {from}"))
            }
        }
    }
}
