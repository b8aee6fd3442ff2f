//! Per-operation generation recipes.

use std::path::PathBuf;
use std::sync::Arc;

use image::imageops::FilterType;
use image::DynamicImage;

use super::canny::{self, CannyParams};
use super::error::PipelineError;
use super::preprocess::{binarize_mask, resize_image, WORKING_SIZE};
use super::prompts::{PromptGenerator, PromptPair, PromptRequest};
use super::remote::{Captioner, DiffusionBackend, GenerateRequest};
use crate::jobs::{JobInput, JobParams};
use crate::models::{PipelineCatalog, PipelineLease, PipelineSpec, FLORENCE_2, FLUX_CANNY, FLUX_FILL};
use crate::storage::ImageStore;

/// Fixed sampling parameters of the Flux pipelines.
#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub width: u32,
    pub height: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub max_sequence_length: u32,
    /// Longest side of inpainting inputs.
    pub inpaint_max_side: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            num_inference_steps: 50,
            guidance_scale: 30.0,
            max_sequence_length: 512,
            inpaint_max_side: 1024,
        }
    }
}

/// Intermediate files a recipe may leave in the work directory.
const WORK_FILES: &[&str] = &["resized", "control", "image", "mask"];

/// Result of a successful recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutput {
    pub output_path: PathBuf,
    pub file_name: String,
}

/// Runs the recipe for a job's operation against leased pipelines.
pub struct JobExecutor {
    store: ImageStore,
    catalog: PipelineCatalog,
    captioner: Arc<dyn Captioner>,
    prompts: Arc<dyn PromptGenerator>,
    backend: Arc<dyn DiffusionBackend>,
    settings: GenerationSettings,
    canny: CannyParams,
}

impl JobExecutor {
    pub fn new(
        store: ImageStore,
        catalog: PipelineCatalog,
        captioner: Arc<dyn Captioner>,
        prompts: Arc<dyn PromptGenerator>,
        backend: Arc<dyn DiffusionBackend>,
    ) -> Self {
        Self {
            store,
            catalog,
            captioner,
            prompts,
            backend,
            settings: GenerationSettings::default(),
            canny: CannyParams::default(),
        }
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub async fn execute(&self, input: &JobInput, lease: &PipelineLease) -> Result<JobOutput, PipelineError> {
        let outcome = self.render(input, lease).await;
        self.store.remove_work_files(&input.request_id, WORK_FILES).await;
        let output_path = outcome?;

        let file_name = output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ImageStore::output_file_name(&input.request_id));
        Ok(JobOutput { output_path, file_name })
    }

    /// Run the recipe for the job's operation. Leaves intermediate files in
    /// the work directory.
    async fn render(&self, input: &JobInput, lease: &PipelineLease) -> Result<PathBuf, PipelineError> {
        match &input.params {
            JobParams::PopulatedRedesign {
                style,
                room_type,
                color_palette,
            } => {
                let resized = self.store.work_path(&input.request_id, "resized");
                let control = self.prepare_control(input, Some(resized.clone())).await?;

                let florence = self.spec(lease, FLORENCE_2)?;
                let caption = self.captioner.caption(florence, &resized).await;
                tracing::debug!(caption = %caption, "room captioned");

                let prompts = self
                    .prompts
                    .generate(&PromptRequest {
                        style,
                        room_type,
                        color_palette: color_palette.as_deref(),
                        caption: Some(&caption),
                        furniture: &[],
                    })
                    .await;
                self.generate_canny(input, lease, control, prompts).await
            }
            JobParams::EmptyRedesign {
                style,
                room_type,
                furniture,
                color_palette,
            } => {
                let control = self.prepare_control(input, None).await?;
                let prompts = self
                    .prompts
                    .generate(&PromptRequest {
                        style,
                        room_type,
                        color_palette: color_palette.as_deref(),
                        caption: None,
                        furniture,
                    })
                    .await;
                self.generate_canny(input, lease, control, prompts).await
            }
            JobParams::Inpainting {
                prompt,
                strength,
                mask_path,
            } => self.inpaint(input, lease, prompt, *strength, mask_path.clone()).await,
        }
    }

    fn spec<'a>(&'a self, lease: &PipelineLease, name: &str) -> Result<&'a PipelineSpec, PipelineError> {
        if !lease.holds(name) {
            return Err(PipelineError::Generation(format!("pipeline {name} is not leased")));
        }
        self.catalog
            .get(name)
            .ok_or_else(|| PipelineError::Generation(format!("pipeline {name} is not in the catalog")))
    }

    /// Resize the input, optionally keep the resized copy, and write the
    /// Canny control image. Returns the control image path.
    async fn prepare_control(
        &self,
        input: &JobInput,
        keep_resized: Option<PathBuf>,
    ) -> Result<PathBuf, PipelineError> {
        let image_path = input.image_path.clone();
        let params = self.canny;
        let (resized, control) = tokio::task::spawn_blocking(move || {
            let img = image::open(&image_path)?;
            let resized = resize_image(&img, WORKING_SIZE);
            let control = canny::control_image(&resized, &params);
            Ok::<_, PipelineError>((resized, DynamicImage::ImageRgb8(control)))
        })
        .await??;

        if let Some(path) = keep_resized {
            self.store.save_png(&resized, &path).await?;
        }
        let control_path = self.store.work_path(&input.request_id, "control");
        self.store.save_png(&control, &control_path).await?;
        Ok(control_path)
    }

    async fn generate_canny(
        &self,
        input: &JobInput,
        lease: &PipelineLease,
        control_path: PathBuf,
        prompts: PromptPair,
    ) -> Result<PathBuf, PipelineError> {
        let spec = self.spec(lease, FLUX_CANNY)?;
        let request = GenerateRequest {
            pipeline: spec.name.clone(),
            model_id: spec.model_id.clone(),
            prompt: prompts.clip,
            prompt_2: Some(prompts.t5),
            image_path: None,
            control_image_path: Some(control_path),
            mask_path: None,
            output_path: self.store.output_path(&input.request_id),
            height: self.settings.height,
            width: self.settings.width,
            num_inference_steps: self.settings.num_inference_steps,
            guidance_scale: self.settings.guidance_scale,
            strength: None,
            max_sequence_length: Some(self.settings.max_sequence_length),
        };
        self.backend.generate(&request).await
    }

    async fn inpaint(
        &self,
        input: &JobInput,
        lease: &PipelineLease,
        prompt: &str,
        strength: f32,
        mask_path: PathBuf,
    ) -> Result<PathBuf, PipelineError> {
        let spec = self.spec(lease, FLUX_FILL)?;
        let image_path = input.image_path.clone();
        let max_side = self.settings.inpaint_max_side;
        let (image, mask) = tokio::task::spawn_blocking(move || {
            let img = image::open(&image_path)?;
            let (w, h) = inpaint_dimensions(img.width(), img.height(), max_side);
            let img = img.resize_exact(w, h, FilterType::Lanczos3);
            let mask = image::open(&mask_path)?;
            let mask = binarize_mask(&mask, w, h);
            Ok::<_, PipelineError>((img, DynamicImage::ImageLuma8(mask)))
        })
        .await??;

        let image_work = self.store.work_path(&input.request_id, "image");
        let mask_work = self.store.work_path(&input.request_id, "mask");
        self.store.save_png(&image, &image_work).await?;
        self.store.save_png(&mask, &mask_work).await?;

        let request = GenerateRequest {
            pipeline: spec.name.clone(),
            model_id: spec.model_id.clone(),
            prompt: prompt.to_string(),
            prompt_2: None,
            image_path: Some(image_work),
            control_image_path: None,
            mask_path: Some(mask_work),
            output_path: self.store.output_path(&input.request_id),
            height: image.height(),
            width: image.width(),
            num_inference_steps: self.settings.num_inference_steps,
            guidance_scale: self.settings.guidance_scale,
            strength: Some(strength),
            max_sequence_length: Some(self.settings.max_sequence_length),
        };
        self.backend.generate(&request).await
    }
}

/// Fit within `max_side`, both sides rounded down to multiples of 16.
pub fn inpaint_dimensions(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let scale = (max_side as f64 / width.max(height) as f64).min(1.0);
    let snap = |v: u32| ((((v as f64) * scale) as u32) / 16 * 16).max(16);
    (snap(width), snap(height))
}
