//! HTTP request handlers

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use image::DynamicImage;
use uuid::Uuid;

use super::error::ApiError;
use super::form::{EmptyForm, FormData, InpaintingForm, PopulatedForm};
use super::schemas::{HealthResponse, ImageResponse, ModelInfo, ModelsResponse, TaskStatusResponse};
use super::validate::ValidationRules;
use crate::jobs::{JobId, JobInput, JobParams};
use crate::scheduler::Priority;
use crate::storage::{self, ImageStore};
use crate::Runtime;

pub const REDESIGN_MESSAGE: &str = "Room redesign processing started";
pub const INPAINTING_MESSAGE: &str = "Inpainting processing started";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<Runtime>,
    pub rules: Arc<ValidationRules>,
    pub api_base_url: Arc<str>,
}

impl AppState {
    pub fn new(runtime: Arc<Runtime>, rules: ValidationRules, api_base_url: &str) -> Self {
        Self {
            runtime,
            rules: Arc::new(rules),
            api_base_url: Arc::from(api_base_url.trim_end_matches('/')),
        }
    }

    fn images(&self) -> &ImageStore {
        &self.runtime.images
    }

    async fn save(&self, image: &DynamicImage, path: PathBuf) -> Result<PathBuf, ApiError> {
        self.images()
            .save_png(image, &path)
            .await
            .map_err(ApiError::internal)?;
        Ok(path)
    }

    /// Queue a job whose inputs are already on disk. Files are removed if
    /// the job is not admitted.
    async fn submit(
        &self,
        request_id: Uuid,
        params: JobParams,
        priority: Priority,
        message: &str,
        started: Instant,
    ) -> Result<ImageResponse, ApiError> {
        let image_path = self.images().input_path(&request_id);
        let input = JobInput {
            request_id,
            image_path: image_path.clone(),
            params,
        };
        let mask_path = match &input.params {
            JobParams::Inpainting { mask_path, .. } => Some(mask_path.clone()),
            _ => None,
        };

        let record = match self.runtime.scheduler.submit(input, priority).await {
            Ok(record) => record,
            Err(e) => {
                for path in std::iter::once(image_path).chain(mask_path) {
                    self.images().discard(&path).await;
                }
                return Err(e.into());
            }
        };

        Ok(ImageResponse {
            message: message.to_string(),
            output_url: storage::output_url(&self.api_base_url, &ImageStore::output_file_name(&request_id)),
            task_id: record.id.to_string(),
            processing_time: started.elapsed().as_secs_f64(),
        })
    }
}

async fn decode_image(rules: Arc<ValidationRules>, bytes: Bytes) -> Result<DynamicImage, ApiError> {
    tokio::task::spawn_blocking(move || rules.image(&bytes))
        .await
        .map_err(ApiError::internal)?
}

async fn decode_image_and_mask(
    rules: Arc<ValidationRules>,
    image: Bytes,
    mask: Bytes,
) -> Result<(DynamicImage, DynamicImage), ApiError> {
    tokio::task::spawn_blocking(move || {
        let image = rules.image(&image)?;
        let mask = rules.mask(&mask, &image)?;
        Ok::<_, ApiError>((image, mask))
    })
    .await
    .map_err(ApiError::internal)?
}

/// `POST /redesign/populated`
pub async fn redesign_populated(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImageResponse>, ApiError> {
    let started = Instant::now();
    let data = FormData::read(multipart).await?;
    let form = PopulatedForm::try_from(&data)?;

    let style = state.rules.style(&form.style)?;
    let room_type = state.rules.room_type(&form.room_type)?;
    let color_palette = state.rules.color_palette(form.color_palette)?;
    let image = decode_image(state.rules.clone(), form.file).await?;

    let request_id = Uuid::new_v4();
    state.save(&image, state.images().input_path(&request_id)).await?;
    tracing::info!(%request_id, %style, %room_type, "populated redesign requested");

    let params = JobParams::PopulatedRedesign {
        style,
        room_type,
        color_palette,
    };
    let response = state
        .submit(request_id, params, form.priority, REDESIGN_MESSAGE, started)
        .await?;
    Ok(Json(response))
}

/// `POST /redesign/empty`
pub async fn redesign_empty(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImageResponse>, ApiError> {
    let started = Instant::now();
    let data = FormData::read(multipart).await?;
    let form = EmptyForm::try_from(&data)?;

    let style = state.rules.style(&form.style)?;
    let room_type = state.rules.room_type(&form.room_type)?;
    let furniture = state.rules.furniture(&form.furniture)?;
    let color_palette = state.rules.color_palette(form.color_palette)?;
    let image = decode_image(state.rules.clone(), form.file).await?;

    let request_id = Uuid::new_v4();
    state.save(&image, state.images().input_path(&request_id)).await?;
    tracing::info!(%request_id, %style, %room_type, furniture = furniture.len(), "empty room redesign requested");

    let params = JobParams::EmptyRedesign {
        style,
        room_type,
        furniture,
        color_palette,
    };
    let response = state
        .submit(request_id, params, form.priority, REDESIGN_MESSAGE, started)
        .await?;
    Ok(Json(response))
}

/// `POST /inpainting`
pub async fn inpainting(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImageResponse>, ApiError> {
    let started = Instant::now();
    let data = FormData::read(multipart).await?;
    let form = InpaintingForm::try_from(&data)?;

    let prompt = state.rules.prompt(&form.prompt)?;
    let strength = state.rules.strength(form.strength)?;
    let (image, mask) = decode_image_and_mask(state.rules.clone(), form.file, form.mask).await?;

    let request_id = Uuid::new_v4();
    state.save(&image, state.images().input_path(&request_id)).await?;
    let mask_path = match state.save(&mask, state.images().mask_path(&request_id)).await {
        Ok(path) => path,
        Err(e) => {
            state.images().discard(&state.images().input_path(&request_id)).await;
            return Err(e);
        }
    };
    tracing::info!(%request_id, strength, "inpainting requested");

    let params = JobParams::Inpainting {
        prompt,
        strength,
        mask_path,
    };
    let response = state
        .submit(request_id, params, form.priority, INPAINTING_MESSAGE, started)
        .await?;
    Ok(Json(response))
}

/// Unparseable ids are reported like unknown ones.
fn parse_task_id(task_id: &str) -> Result<JobId, ApiError> {
    task_id
        .parse::<JobId>()
        .map_err(|_| ApiError::task_not_found(task_id))
}

/// `GET /tasks/{task_id}`
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let id = parse_task_id(&task_id)?;
    let record = state
        .runtime
        .scheduler
        .status(&id)
        .ok_or_else(|| ApiError::task_not_found(&task_id))?;
    Ok(Json(record.into()))
}

/// `DELETE /tasks/{task_id}`
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let id = parse_task_id(&task_id)?;
    let record = state.runtime.scheduler.cancel(&id).await?;
    Ok(Json(record.into()))
}

/// `GET /models`
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let registry = &state.runtime.registry;
    let loaded = registry.snapshot();
    let pipelines = registry
        .catalog()
        .specs()
        .into_iter()
        .map(|spec| {
            let status = loaded.iter().find(|s| s.name == spec.name).cloned();
            ModelInfo {
                name: spec.name.clone(),
                model_id: spec.model_id.clone(),
                memory_bytes: spec.memory_bytes,
                loaded: status.is_some(),
                status,
            }
        })
        .collect();
    Json(ModelsResponse {
        pipelines,
        memory_used_bytes: registry.memory().allocated(),
        memory_capacity_bytes: registry.memory().capacity(),
    })
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

pub async fn health_live(State(state): State<AppState>) -> impl IntoResponse {
    if state.runtime.health.is_alive() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE")
    }
}

/// Full report; 503 while not ready.
pub async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    let inputs = state.runtime.health_inputs().await;
    let report = state.runtime.health.report(&inputs);
    let status = if report.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
