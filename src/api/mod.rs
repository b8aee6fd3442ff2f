//! Request gateway: multipart submission endpoints, task status and health.

mod error;
mod form;
mod handlers;
mod routes;
mod schemas;
mod validate;

pub use error::{ApiError, INTERNAL_ERROR_MESSAGE};
pub use form::DEFAULT_STRENGTH;
pub use handlers::{AppState, INPAINTING_MESSAGE, REDESIGN_MESSAGE};
pub use routes::{api_routes, router};
pub use schemas::{HealthResponse, ImageResponse, ModelInfo, ModelsResponse, TaskStatusResponse};
pub use validate::{ValidationRules, VALID_ROOM_TYPES, VALID_STYLES};
