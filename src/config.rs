//! Runtime configuration loading.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `IMG2IMG_*` environment variables. Invalid values fall back to the layer
//! below without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `IMG2IMG_HOST` | 0.0.0.0 | Bind address |
//! | `IMG2IMG_PORT` | 8000 | Bind port |
//! | `IMG2IMG_DEBUG` | false | Debug mode (`true` enables debug logging) |
//! | `IMG2IMG_API_BASE_URL` | http://localhost:8000 | Prefix of returned image URLs |
//! | `IMG2IMG_API_VERSION` | v1 | API version segment |
//! | `IMG2IMG_DATA_DIR` | ./data | Inputs, outputs and work files |
//! | `IMG2IMG_WORKER_URL` | http://127.0.0.1:5000 | Inference worker |
//! | `IMG2IMG_WORKER_TIMEOUT` | 300 | Worker load/caption timeout (secs) |
//! | `IMG2IMG_OPENAI_API_KEY` | unset | Prompt generation key (`OPENAI_API_KEY` also read) |
//! | `IMG2IMG_OPENAI_MODEL` | gpt-4o | Prompt generation model |
//! | `IMG2IMG_OPENAI_URL` | https://api.openai.com/v1 | Prompt generation endpoint |
//! | `IMG2IMG_MAX_QUEUE_DEPTH` | 64 | Max pending jobs |
//! | `IMG2IMG_MAX_CONCURRENT` | 1 | Worker count |
//! | `IMG2IMG_ACCELERATOR_MEMORY` | 25769803776 | Accelerator budget (bytes) |
//! | `IMG2IMG_JOB_TIMEOUT` | 600 | Per-job timeout (secs) |
//! | `IMG2IMG_JOB_TTL` | 3600 | Finished job retention (secs) |
//! | `IMG2IMG_MAX_ATTEMPTS` | 2 | Attempts for transient failures |
//! | `IMG2IMG_PIPELINE_IDLE_TIMEOUT` | 0 | Unload idle pipelines after (secs, 0 = never) |
//! | `IMG2IMG_JANITOR_INTERVAL` | 60 | Housekeeping interval (secs) |
//! | `IMG2IMG_SHUTDOWN_TIMEOUT` | 30 | Graceful shutdown timeout (secs) |
//! | `IMG2IMG_MAX_UPLOAD_BYTES` | 10485760 | Max image upload (bytes) |
//! | `IMG2IMG_LOG_FORMAT` | json | `json` or `pretty` |
//! | `IMG2IMG_LOG_LEVEL` | info | Filter directive |
//! | `IMG2IMG_LOG_FILE` | unset | Log to a file instead of stderr |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::ValidationRules;
use crate::memory::{AcceleratorConfig, GIB};
use crate::pipeline::{OpenAiConfig, WorkerConfig};
use crate::scheduler::{JanitorSettings, JobQueueConfig, WorkerSettings};
use crate::telemetry::{LogConfig, LogFormat};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub api_base_url: String,
    pub api_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            debug: false,
            api_base_url: "http://localhost:8000".to_string(),
            api_version: "v1".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Optional TOML overlay. Every key is optional; absent keys keep defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub debug: Option<bool>,
    pub api_base_url: Option<String>,
    pub api_version: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub worker_url: Option<String>,
    pub worker_timeout_secs: Option<u64>,
    pub openai_model: Option<String>,
    pub openai_url: Option<String>,
    pub max_queue_depth: Option<usize>,
    pub max_concurrent: Option<usize>,
    pub accelerator_memory_bytes: Option<usize>,
    pub job_timeout_secs: Option<u64>,
    pub job_ttl_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub pipeline_idle_timeout_secs: Option<u64>,
    pub janitor_interval_secs: Option<u64>,
    pub shutdown_timeout_secs: Option<u64>,
    pub max_upload_bytes: Option<usize>,
    pub log_format: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub styles: Option<Vec<String>>,
    pub room_types: Option<Vec<String>>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Effective runtime configuration summary (serializable).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EffectiveConfig {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub api_base_url: String,
    pub api_version: String,
    pub data_dir: String,
    pub worker_url: String,
    pub worker_timeout_secs: u64,
    pub openai_configured: bool,
    pub openai_model: String,
    pub max_queue_depth: usize,
    pub max_concurrent: usize,
    pub accelerator_memory_bytes: usize,
    pub job_timeout_secs: u64,
    pub job_ttl_secs: u64,
    pub max_attempts: u32,
    pub pipeline_idle_timeout_secs: u64,
    pub janitor_interval_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub max_upload_bytes: usize,
    pub log_format: String,
    pub log_level: String,
    pub styles: usize,
    pub room_types: usize,
}

/// All runtime configuration.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub server: ServerConfig,
    pub data_dir: PathBuf,
    pub worker: WorkerConfig,
    pub openai: OpenAiConfig,
    pub queue: JobQueueConfig,
    pub max_concurrent: usize,
    pub accelerator: AcceleratorConfig,
    pub job: WorkerSettings,
    pub janitor: JanitorSettings,
    pub shutdown_timeout: Duration,
    pub validation: ValidationRules,
    pub logging: LogConfig,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u32` env var, returning `default` on missing or invalid.
fn parse_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u32>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_u16(key: &str, default: u16) -> u16 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u16>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Only the literal `true` (any case) enables a flag.
fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => val.trim().eq_ignore_ascii_case("true"),
        Err(_) => default,
    }
}

/// Non-empty string env var, or `default`.
fn parse_string(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val.trim().to_string(),
        _ => default,
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn load_server_config(file: &FileConfig) -> ServerConfig {
    let defaults = ServerConfig::default();
    let host = parse_string("IMG2IMG_HOST", file.host.clone().unwrap_or(defaults.host));
    let port = parse_u16("IMG2IMG_PORT", file.port.unwrap_or(defaults.port));
    let debug = parse_bool("IMG2IMG_DEBUG", file.debug.unwrap_or(defaults.debug));
    let api_base_url = parse_string(
        "IMG2IMG_API_BASE_URL",
        file.api_base_url.clone().unwrap_or(defaults.api_base_url),
    );
    let api_version = parse_string(
        "IMG2IMG_API_VERSION",
        file.api_version.clone().unwrap_or(defaults.api_version),
    );
    ServerConfig {
        host,
        port,
        debug,
        api_base_url: api_base_url.trim_end_matches('/').to_string(),
        api_version,
    }
}

fn load_worker_config(file: &FileConfig) -> WorkerConfig {
    let defaults = WorkerConfig::default();
    let base_url = parse_string(
        "IMG2IMG_WORKER_URL",
        file.worker_url.clone().unwrap_or(defaults.base_url),
    );
    let timeout = parse_u64(
        "IMG2IMG_WORKER_TIMEOUT",
        file.worker_timeout_secs.unwrap_or(defaults.request_timeout.as_secs()),
    );
    let timeout = timeout.max(1);
    WorkerConfig {
        base_url,
        request_timeout: Duration::from_secs(timeout),
        generate_timeout: defaults.generate_timeout,
    }
}

fn load_openai_config(file: &FileConfig) -> OpenAiConfig {
    let defaults = OpenAiConfig::default();
    let api_key = env_opt("IMG2IMG_OPENAI_API_KEY").or_else(|| env_opt("OPENAI_API_KEY"));
    let model = parse_string(
        "IMG2IMG_OPENAI_MODEL",
        file.openai_model.clone().unwrap_or(defaults.model),
    );
    let base_url = parse_string(
        "IMG2IMG_OPENAI_URL",
        file.openai_url.clone().unwrap_or(defaults.base_url),
    );
    OpenAiConfig {
        api_key,
        base_url,
        model,
        ..defaults
    }
}

fn load_validation_rules(file: &FileConfig) -> ValidationRules {
    let defaults = ValidationRules::default();
    let max_upload_bytes = parse_usize(
        "IMG2IMG_MAX_UPLOAD_BYTES",
        file.max_upload_bytes.unwrap_or(defaults.max_upload_bytes),
    );
    let max_upload_bytes = max_upload_bytes.max(64 * 1024); // floor: 64 KiB
    let styles = file
        .styles
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or(defaults.styles.clone());
    let room_types = file
        .room_types
        .clone()
        .filter(|r| !r.is_empty())
        .unwrap_or(defaults.room_types.clone());
    ValidationRules {
        styles,
        room_types,
        max_upload_bytes,
        ..defaults
    }
}

fn load_log_config(file: &FileConfig, debug: bool) -> LogConfig {
    let defaults = LogConfig::default();
    let format = env_opt("IMG2IMG_LOG_FORMAT")
        .or_else(|| file.log_format.clone())
        .and_then(|f| f.parse::<LogFormat>().ok())
        .unwrap_or(defaults.format);
    let default_level = if debug { "debug".to_string() } else { defaults.level };
    let level = parse_string(
        "IMG2IMG_LOG_LEVEL",
        file.log_level.clone().unwrap_or(default_level),
    );
    let output_path = env_opt("IMG2IMG_LOG_FILE")
        .map(PathBuf::from)
        .or_else(|| file.log_file.clone());
    LogConfig {
        format,
        level,
        output_path,
    }
}

/// Load configuration from defaults and environment variables.
pub fn load() -> EnvConfig {
    load_layered(&FileConfig::default())
}

/// Load configuration with a TOML file between defaults and environment.
pub fn load_with_file(path: &Path) -> Result<EnvConfig, ConfigError> {
    let file = FileConfig::from_path(path)?;
    Ok(load_layered(&file))
}

/// Apply `file` over defaults, then environment variables over both.
pub fn load_layered(file: &FileConfig) -> EnvConfig {
    let server = load_server_config(file);
    let data_dir = env_opt("IMG2IMG_DATA_DIR")
        .map(PathBuf::from)
        .or_else(|| file.data_dir.clone())
        .unwrap_or_else(|| PathBuf::from("./data"));

    let max_pending = parse_usize("IMG2IMG_MAX_QUEUE_DEPTH", file.max_queue_depth.unwrap_or(64));
    let max_concurrent = parse_usize("IMG2IMG_MAX_CONCURRENT", file.max_concurrent.unwrap_or(1));
    let accelerator_bytes = parse_usize(
        "IMG2IMG_ACCELERATOR_MEMORY",
        file.accelerator_memory_bytes.unwrap_or(24 * GIB),
    );
    let max_pending = max_pending.max(1);
    let max_concurrent = max_concurrent.max(1);
    let accelerator_bytes = accelerator_bytes.max(GIB); // floor: 1 GiB

    let job_timeout = parse_u64("IMG2IMG_JOB_TIMEOUT", file.job_timeout_secs.unwrap_or(600));
    let job_ttl = parse_u64("IMG2IMG_JOB_TTL", file.job_ttl_secs.unwrap_or(3600));
    let max_attempts = parse_u32("IMG2IMG_MAX_ATTEMPTS", file.max_attempts.unwrap_or(2));
    let idle = parse_u64(
        "IMG2IMG_PIPELINE_IDLE_TIMEOUT",
        file.pipeline_idle_timeout_secs.unwrap_or(0),
    );
    let janitor_interval = parse_u64(
        "IMG2IMG_JANITOR_INTERVAL",
        file.janitor_interval_secs.unwrap_or(60),
    );
    let shutdown_secs = parse_u64(
        "IMG2IMG_SHUTDOWN_TIMEOUT",
        file.shutdown_timeout_secs.unwrap_or(30),
    );
    let job_timeout = job_timeout.max(1);
    let job_ttl = job_ttl.max(60);
    let max_attempts = max_attempts.max(1);
    let janitor_interval = janitor_interval.max(1);
    let shutdown_secs = shutdown_secs.max(1);

    let logging = load_log_config(file, server.debug);

    EnvConfig {
        job: WorkerSettings {
            job_timeout: Duration::from_secs(job_timeout),
            max_attempts,
            api_base_url: server.api_base_url.clone(),
        },
        server,
        data_dir,
        worker: load_worker_config(file),
        openai: load_openai_config(file),
        queue: JobQueueConfig { max_pending },
        max_concurrent,
        accelerator: AcceleratorConfig {
            memory_bytes: accelerator_bytes,
        },
        janitor: JanitorSettings {
            interval: Duration::from_secs(janitor_interval),
            job_ttl: Duration::from_secs(job_ttl),
            pipeline_idle_timeout: (idle > 0).then(|| Duration::from_secs(idle)),
        },
        shutdown_timeout: Duration::from_secs(shutdown_secs),
        validation: load_validation_rules(file),
        logging,
    }
}

impl EnvConfig {
    /// Return a serializable summary of all effective values. Secrets are
    /// reported only as present or absent.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            debug: self.server.debug,
            api_base_url: self.server.api_base_url.clone(),
            api_version: self.server.api_version.clone(),
            data_dir: self.data_dir.display().to_string(),
            worker_url: self.worker.base_url.clone(),
            worker_timeout_secs: self.worker.request_timeout.as_secs(),
            openai_configured: self.openai.api_key.is_some(),
            openai_model: self.openai.model.clone(),
            max_queue_depth: self.queue.max_pending,
            max_concurrent: self.max_concurrent,
            accelerator_memory_bytes: self.accelerator.memory_bytes,
            job_timeout_secs: self.job.job_timeout.as_secs(),
            job_ttl_secs: self.janitor.job_ttl.as_secs(),
            max_attempts: self.job.max_attempts,
            pipeline_idle_timeout_secs: self
                .janitor
                .pipeline_idle_timeout
                .map(|d| d.as_secs())
                .unwrap_or(0),
            janitor_interval_secs: self.janitor.interval.as_secs(),
            shutdown_timeout_secs: self.shutdown_timeout.as_secs(),
            max_upload_bytes: self.validation.max_upload_bytes,
            log_format: self.logging.format.as_str().to_string(),
            log_level: self.logging.level.clone(),
            styles: self.validation.styles.len(),
            room_types: self.validation.room_types.len(),
        }
    }

    /// Prefix of every versioned route, e.g. `/api/v1`.
    pub fn api_prefix(&self) -> String {
        format!("/api/{}", self.server.api_version)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    pub(crate) static ENV_LOCK: Mutex<()> = Mutex::new(());

    pub(crate) const ENV_KEYS: &[&str] = &[
        "IMG2IMG_HOST",
        "IMG2IMG_PORT",
        "IMG2IMG_DEBUG",
        "IMG2IMG_API_BASE_URL",
        "IMG2IMG_API_VERSION",
        "IMG2IMG_DATA_DIR",
        "IMG2IMG_WORKER_URL",
        "IMG2IMG_WORKER_TIMEOUT",
        "IMG2IMG_OPENAI_API_KEY",
        "IMG2IMG_OPENAI_MODEL",
        "IMG2IMG_OPENAI_URL",
        "OPENAI_API_KEY",
        "IMG2IMG_MAX_QUEUE_DEPTH",
        "IMG2IMG_MAX_CONCURRENT",
        "IMG2IMG_ACCELERATOR_MEMORY",
        "IMG2IMG_JOB_TIMEOUT",
        "IMG2IMG_JOB_TTL",
        "IMG2IMG_MAX_ATTEMPTS",
        "IMG2IMG_PIPELINE_IDLE_TIMEOUT",
        "IMG2IMG_JANITOR_INTERVAL",
        "IMG2IMG_SHUTDOWN_TIMEOUT",
        "IMG2IMG_MAX_UPLOAD_BYTES",
        "IMG2IMG_LOG_FORMAT",
        "IMG2IMG_LOG_LEVEL",
        "IMG2IMG_LOG_FILE",
    ];

    pub(crate) fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg.server.bind_addr(), "0.0.0.0:8000");
        assert!(!cfg.server.debug);
        assert_eq!(cfg.server.api_base_url, "http://localhost:8000");
        assert_eq!(cfg.api_prefix(), "/api/v1");
        assert_eq!(cfg.data_dir, PathBuf::from("./data"));
        assert_eq!(cfg.worker.base_url, "http://127.0.0.1:5000");
        assert_eq!(cfg.openai.api_key, None);
        assert_eq!(cfg.queue.max_pending, 64);
        assert_eq!(cfg.max_concurrent, 1);
        assert_eq!(cfg.accelerator.memory_bytes, 24 * GIB);
        assert_eq!(cfg.job.job_timeout.as_secs(), 600);
        assert_eq!(cfg.job.max_attempts, 2);
        assert_eq!(cfg.janitor.job_ttl.as_secs(), 3600);
        assert_eq!(cfg.janitor.pipeline_idle_timeout, None);
        assert_eq!(cfg.shutdown_timeout.as_secs(), 30);
        assert_eq!(cfg.validation.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("IMG2IMG_PORT", "9000");
        std::env::set_var("IMG2IMG_API_BASE_URL", "https://rooms.example.com/");
        std::env::set_var("IMG2IMG_MAX_QUEUE_DEPTH", "8");
        std::env::set_var("IMG2IMG_MAX_CONCURRENT", "2");
        std::env::set_var("IMG2IMG_PIPELINE_IDLE_TIMEOUT", "900");
        std::env::set_var("OPENAI_API_KEY", "sk-test");
        let cfg = load();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.api_base_url, "https://rooms.example.com");
        assert_eq!(cfg.job.api_base_url, "https://rooms.example.com");
        assert_eq!(cfg.queue.max_pending, 8);
        assert_eq!(cfg.max_concurrent, 2);
        assert_eq!(cfg.janitor.pipeline_idle_timeout, Some(Duration::from_secs(900)));
        assert_eq!(cfg.openai.api_key.as_deref(), Some("sk-test"));
        clear_env_vars();
    }

    #[test]
    fn test_debug_flag_lowers_log_level() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("IMG2IMG_DEBUG", "True");
        let cfg = load();
        assert!(cfg.server.debug);
        assert_eq!(cfg.logging.level, "debug");

        std::env::set_var("IMG2IMG_DEBUG", "1");
        assert!(!load().server.debug, "only 'true' enables debug");

        std::env::set_var("IMG2IMG_DEBUG", "true");
        std::env::set_var("IMG2IMG_LOG_LEVEL", "warn");
        assert_eq!(load().logging.level, "warn");
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("IMG2IMG_PORT", "not_a_port");
        std::env::set_var("IMG2IMG_MAX_QUEUE_DEPTH", "abc");
        std::env::set_var("IMG2IMG_LOG_FORMAT", "xml");
        let cfg = load();
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.queue.max_pending, 64);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        clear_env_vars();
    }

    #[test]
    fn test_floors_apply() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("IMG2IMG_MAX_QUEUE_DEPTH", "0");
        std::env::set_var("IMG2IMG_MAX_CONCURRENT", "0");
        std::env::set_var("IMG2IMG_MAX_ATTEMPTS", "0");
        std::env::set_var("IMG2IMG_ACCELERATOR_MEMORY", "1024");
        std::env::set_var("IMG2IMG_SHUTDOWN_TIMEOUT", "0");
        let cfg = load();
        assert_eq!(cfg.queue.max_pending, 1);
        assert_eq!(cfg.max_concurrent, 1);
        assert_eq!(cfg.job.max_attempts, 1);
        assert_eq!(cfg.accelerator.memory_bytes, GIB);
        assert!(cfg.shutdown_timeout.as_secs() >= 1);
        clear_env_vars();
    }

    #[test]
    fn test_file_overlays_defaults_and_env_wins() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "port = 8080\nmax_concurrent = 3\nlog_format = \"pretty\"\nstyles = [\"modern\", \"zen\"]"
        )
        .unwrap();
        std::env::set_var("IMG2IMG_PORT", "9001");

        let cfg = load_with_file(file.path()).unwrap();
        assert_eq!(cfg.server.port, 9001);
        assert_eq!(cfg.max_concurrent, 3);
        assert_eq!(cfg.logging.format, LogFormat::Pretty);
        assert_eq!(cfg.validation.styles, vec!["modern", "zen"]);
        assert_eq!(cfg.validation.room_types.len(), 16);
        clear_env_vars();
    }

    #[test]
    fn test_bad_file_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"eighty\"").unwrap();
        assert!(matches!(load_with_file(file.path()), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            load_with_file(Path::new("/nonexistent/img2img.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_effective_config_hides_secrets() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("IMG2IMG_OPENAI_API_KEY", "sk-secret");
        let eff = load().effective_config();
        assert!(eff.openai_configured);
        let json = serde_json::to_string(&eff).unwrap();
        assert!(!json.contains("sk-secret"));
        assert_eq!(eff.styles, 16);
        assert_eq!(eff.pipeline_idle_timeout_secs, 0);
        clear_env_vars();
    }
}
