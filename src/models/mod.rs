//! Model management: the pipeline catalog, the loader seam and the registry
//! of pipelines resident on the accelerator.

mod catalog;
mod loader;
mod registry;

pub use catalog::{PipelineCatalog, PipelineSpec, FLORENCE_2, FLUX_CANNY, FLUX_FILL};
pub use loader::{LoadError, PipelineLoader};
pub use registry::{ModelRegistry, PipelineLease, PipelineStatus, RegistryError};
