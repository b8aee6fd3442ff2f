//! Pipeline executors: preprocessing, control images, prompts and the calls
//! into the inference worker.

pub mod canny;
mod error;
mod executor;
pub mod preprocess;
pub mod prompts;
mod remote;

pub use error::PipelineError;
pub use executor::{inpaint_dimensions, GenerationSettings, JobExecutor, JobOutput};
pub use prompts::{DefaultPrompter, OpenAiConfig, OpenAiPrompter, PromptGenerator, PromptPair, PromptRequest};
pub use remote::{
    Captioner, DiffusionBackend, GenerateRequest, WorkerClient, WorkerConfig, CAPTION_TASK,
    FALLBACK_CAPTION,
};
