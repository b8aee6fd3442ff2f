//! `health` subcommand: probe a running server over HTTP.

use std::time::Duration;

use thiserror::Error;

use crate::api::HealthResponse;

#[derive(Error, Debug)]
pub enum HealthCheckError {
    #[error("connection failed: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("server returned HTTP {0}")]
    Status(u16),

    #[error("server reported '{0}'")]
    Unhealthy(String),
}

/// Fetch `{base_url}/health` and require `{"status": "healthy"}`.
pub async fn check_health(base_url: &str, timeout: Duration) -> Result<(), HealthCheckError> {
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    let response = reqwest::Client::new().get(&url).timeout(timeout).send().await?;
    if !response.status().is_success() {
        return Err(HealthCheckError::Status(response.status().as_u16()));
    }
    let body: HealthResponse = response.json().await?;
    if body.status != "healthy" {
        return Err(HealthCheckError::Unhealthy(body.status));
    }
    Ok(())
}

/// Returns the process exit code: 0 healthy, 1 unhealthy, 3 unreachable.
pub async fn run_health(base_url: &str) -> i32 {
    match check_health(base_url, Duration::from_secs(5)).await {
        Ok(()) => {
            println!("healthy");
            0
        }
        Err(HealthCheckError::Connection(e)) => {
            eprintln!("Health check failed: cannot reach {base_url}: {e}");
            3
        }
        Err(e) => {
            eprintln!("Health check failed: {e}");
            1
        }
    }
}
