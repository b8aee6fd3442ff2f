//! Seam between the registry and whatever actually holds the weights.

use async_trait::async_trait;
use thiserror::Error;

use super::catalog::PipelineSpec;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("inference worker unreachable: {0}")]
    Unreachable(String),

    #[error("inference worker rejected request: {0}")]
    Rejected(String),
}

/// Loads and unloads pipelines on the accelerator.
#[async_trait]
pub trait PipelineLoader: Send + Sync {
    async fn load(&self, spec: &PipelineSpec) -> Result<(), LoadError>;

    async fn unload(&self, spec: &PipelineSpec) -> Result<(), LoadError>;
}
