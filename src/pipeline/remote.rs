//! HTTP client for the external inference worker.
//!
//! The worker owns the weights and the diffusion code. All paths exchanged
//! with it point into the shared data directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::error::PipelineError;
use crate::models::{LoadError, PipelineLoader, PipelineSpec};

/// Caption used when the captioning model fails.
pub const FALLBACK_CAPTION: &str = "A room with furniture and decorations.";

/// Florence-2 task token for long captions.
pub const CAPTION_TASK: &str = "<MORE_DETAILED_CAPTION>";

/// Produces a natural-language description of a room photo.
#[async_trait]
pub trait Captioner: Send + Sync {
    /// Never fails; returns [`FALLBACK_CAPTION`] on error.
    async fn caption(&self, spec: &PipelineSpec, image_path: &Path) -> String;
}

/// Runs a diffusion pipeline and writes the result to `output_path`.
#[async_trait]
pub trait DiffusionBackend: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<PathBuf, PipelineError>;
}

/// Body of a `/generate` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub pipeline: String,
    pub model_id: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_image_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_path: Option<PathBuf>,
    pub output_path: PathBuf,
    pub height: u32,
    pub width: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_sequence_length: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WorkerResponse {
    status: String,
    #[serde(default)]
    output_path: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl WorkerResponse {
    fn is_success(&self) -> bool {
        self.status == "success"
    }

    fn error_text(&self) -> String {
        self.error.clone().unwrap_or_else(|| format!("worker status '{}'", self.status))
    }
}

/// Timeouts for worker calls.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub base_url: String,
    /// Load/unload/caption calls.
    pub request_timeout: Duration,
    /// Generation calls.
    pub generate_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            request_timeout: Duration::from_secs(300),
            generate_timeout: Duration::from_secs(600),
        }
    }
}

/// reqwest client speaking the worker's JSON protocol.
#[derive(Clone)]
pub struct WorkerClient {
    client: reqwest::Client,
    config: WorkerConfig,
}

impl WorkerClient {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<WorkerResponse, PipelineError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .timeout(timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::WorkerStatus {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(response.json().await?)
    }
}

impl std::fmt::Debug for WorkerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerClient").field("base_url", &self.config.base_url).finish()
    }
}

fn load_error(e: PipelineError) -> LoadError {
    if e.is_transient() {
        LoadError::Unreachable(e.to_string())
    } else {
        LoadError::Rejected(e.to_string())
    }
}

#[async_trait]
impl PipelineLoader for WorkerClient {
    async fn load(&self, spec: &PipelineSpec) -> Result<(), LoadError> {
        let body = json!({"pipeline": spec.name, "model_id": spec.model_id});
        let resp = self
            .post("load", &body, self.config.request_timeout)
            .await
            .map_err(load_error)?;
        if resp.is_success() {
            Ok(())
        } else {
            Err(LoadError::Rejected(resp.error_text()))
        }
    }

    async fn unload(&self, spec: &PipelineSpec) -> Result<(), LoadError> {
        let body = json!({"pipeline": spec.name});
        let resp = self
            .post("unload", &body, self.config.request_timeout)
            .await
            .map_err(load_error)?;
        if resp.is_success() {
            Ok(())
        } else {
            Err(LoadError::Rejected(resp.error_text()))
        }
    }
}

#[async_trait]
impl Captioner for WorkerClient {
    async fn caption(&self, spec: &PipelineSpec, image_path: &Path) -> String {
        let body = json!({
            "model_id": spec.model_id,
            "task": CAPTION_TASK,
            "image_path": image_path,
            "max_new_tokens": 1024,
            "num_beams": 3,
        });
        match self.post("caption", &body, self.config.request_timeout).await {
            Ok(resp) if resp.is_success() => match resp.caption {
                Some(caption) if !caption.trim().is_empty() => caption,
                _ => {
                    tracing::warn!("captioner returned no text, using fallback caption");
                    FALLBACK_CAPTION.to_string()
                }
            },
            Ok(resp) => {
                tracing::error!(error = %resp.error_text(), "captioning failed, using fallback caption");
                FALLBACK_CAPTION.to_string()
            }
            Err(e) => {
                tracing::error!(error = %e, "captioning failed, using fallback caption");
                FALLBACK_CAPTION.to_string()
            }
        }
    }
}

#[async_trait]
impl DiffusionBackend for WorkerClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<PathBuf, PipelineError> {
        let resp = self
            .post("generate", request, self.config.generate_timeout)
            .await?;
        if !resp.is_success() {
            return Err(PipelineError::Generation(resp.error_text()));
        }
        Ok(resp
            .output_path
            .map(PathBuf::from)
            .unwrap_or_else(|| request.output_path.clone()))
    }
}
