//! Recipe errors and their retry classification.

use thiserror::Error;

use crate::models::RegistryError;

/// Errors raised while executing a generation recipe.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid input image: {0}")]
    InvalidImage(String),

    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("inference worker unreachable: {0}")]
    WorkerUnreachable(String),

    #[error("inference worker returned HTTP {status}: {message}")]
    WorkerStatus { status: u16, message: String },

    #[error("generation failed: {0}")]
    Generation(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("background task failed: {0}")]
    Join(String),
}

impl PipelineError {
    /// Whether the job may succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::WorkerUnreachable(_) => true,
            Self::WorkerStatus { status, .. } => *status >= 500,
            Self::Registry(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Join(e.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::WorkerStatus {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None if e.is_decode() => Self::Generation(format!("malformed worker response: {e}")),
            None => Self::WorkerUnreachable(e.to_string()),
        }
    }
}
