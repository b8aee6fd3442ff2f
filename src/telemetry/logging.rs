//! Logging configuration and initialization.
//!
//! Supports JSON and pretty-printed formats, to stderr or a file.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logging (default for production).
    #[default]
    Json,
    /// Human-readable output for development.
    Pretty,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(LogError::InvalidFormat(other.to_string())),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Filter directive, e.g. "info" or "img2img_core=debug,tower_http=info".
    pub level: String,
    /// Log file. Stderr when unset.
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
            output_path: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Build the filter, letting `RUST_LOG` override the configured level.
pub fn build_filter(level: &str) -> Result<EnvFilter, LogError> {
    match std::env::var("RUST_LOG") {
        Ok(directive) if !directive.trim().is_empty() => {
            EnvFilter::try_new(directive).map_err(|e| LogError::InvalidFilter(e.to_string()))
        }
        _ => EnvFilter::try_new(level).map_err(|e| LogError::InvalidFilter(e.to_string())),
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = build_filter(&config.level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let file = match &config.output_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| LogError::FileOpen(e.to_string()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| LogError::FileOpen(format!("{}: {e}", path.display())))?;
            Some(std::sync::Mutex::new(file))
        }
        None => None,
    };

    let result = match (config.format, file) {
        (LogFormat::Json, Some(file)) => registry
            .with(fmt::layer().json().with_writer(file))
            .try_init(),
        (LogFormat::Json, None) => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        (LogFormat::Pretty, Some(file)) => registry
            .with(fmt::layer().with_ansi(false).with_writer(file))
            .try_init(),
        (LogFormat::Pretty, None) => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|_| LogError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn rejects_bad_filter() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(matches!(
            EnvFilter::try_new("=[").map_err(|e| LogError::InvalidFilter(e.to_string())),
            Err(LogError::InvalidFilter(_))
        ));
    }
}
