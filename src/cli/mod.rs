//! CLI subcommands for the img2img service.
//!
//! ## Usage
//!
//! ```bash
//! img2img-api health            # Query /health of a running server, exits 0 on healthy
//! img2img-api config show       # Print effective configuration
//! img2img-api config validate   # Check configuration for misconfigurations
//! ```

pub mod config_cmd;
pub mod health;

pub use health::{run_health, HealthCheckError};

/// Default server URL probed by `health`.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";

/// Get the server URL from environment or use default.
pub fn get_server_url() -> String {
    std::env::var("IMG2IMG_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string())
}
