//! Route definitions

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::handlers::{
    cancel_task, health, health_live, health_ready, inpainting, list_models, redesign_empty,
    redesign_populated, task_status, AppState,
};

/// Multipart overhead allowed on top of the uploads themselves.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Versioned API routes, to be nested under e.g. `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/redesign/populated", post(redesign_populated))
        .route("/redesign/empty", post(redesign_empty))
        .route("/inpainting", post(inpainting))
        .route("/tasks/{task_id}", get(task_status).delete(cancel_task))
        .route("/models", get(list_models))
}

/// Full application: API, health checks, static data files, CORS, tracing.
pub fn router(state: AppState, api_prefix: &str) -> Router {
    // Inpainting carries an image and a mask.
    let body_limit = state.rules.max_upload_bytes * 2 + FORM_OVERHEAD_BYTES;
    let data_dir = state.runtime.images.root().to_path_buf();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest(api_prefix, api_routes())
        .route("/health", get(health))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .nest_service("/data", ServeDir::new(data_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
