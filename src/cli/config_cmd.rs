//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read configuration directly from the environment (and an
//! optional TOML file) without contacting a running server.

use std::path::Path;

use crate::config::{self, EffectiveConfig, EnvConfig};

fn load(file: Option<&Path>) -> Result<EnvConfig, config::ConfigError> {
    match file {
        Some(path) => config::load_with_file(path),
        None => Ok(config::load()),
    }
}

/// Print effective config as key-value pairs to stdout.
pub fn run_show(file: Option<&Path>) -> i32 {
    match load(file) {
        Ok(cfg) => {
            print_config(&cfg.effective_config());
            0
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            2
        }
    }
}

/// Print default config values (no file or env overrides) to stdout.
pub fn run_defaults() {
    print_config(&default_config());
}

/// Built-in values, independent of the environment.
fn default_config() -> EffectiveConfig {
    use crate::api::ValidationRules;
    use crate::memory::AcceleratorConfig;
    use crate::pipeline::{OpenAiConfig, WorkerConfig};
    use crate::scheduler::{JanitorSettings, JobQueueConfig, WorkerSettings};
    use crate::telemetry::LogConfig;

    let server = config::ServerConfig::default();
    let worker = WorkerConfig::default();
    let openai = OpenAiConfig::default();
    let job = WorkerSettings::default();
    let janitor = JanitorSettings::default();
    let rules = ValidationRules::default();
    let logging = LogConfig::default();
    EffectiveConfig {
        host: server.host,
        port: server.port,
        debug: server.debug,
        api_base_url: server.api_base_url,
        api_version: server.api_version,
        data_dir: "./data".to_string(),
        worker_url: worker.base_url,
        worker_timeout_secs: worker.request_timeout.as_secs(),
        openai_configured: false,
        openai_model: openai.model,
        max_queue_depth: JobQueueConfig::default().max_pending,
        max_concurrent: 1,
        accelerator_memory_bytes: AcceleratorConfig::default().memory_bytes,
        job_timeout_secs: job.job_timeout.as_secs(),
        job_ttl_secs: janitor.job_ttl.as_secs(),
        max_attempts: job.max_attempts,
        pipeline_idle_timeout_secs: 0,
        janitor_interval_secs: janitor.interval.as_secs(),
        shutdown_timeout_secs: 30,
        max_upload_bytes: rules.max_upload_bytes,
        log_format: logging.format.as_str().to_string(),
        log_level: logging.level,
        styles: rules.styles.len(),
        room_types: rules.room_types.len(),
    }
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found, 2 if the file is unusable.
pub fn run_validate(file: Option<&Path>) -> i32 {
    let env = match load(file) {
        Ok(env) => env,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return 2;
        }
    };
    let warnings = validate(&env);
    for warning in &warnings {
        eprintln!("WARNING: {warning}");
    }

    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

/// Problems that do not prevent startup but are almost certainly mistakes.
pub fn validate(env: &EnvConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let catalog = crate::models::PipelineCatalog::default();

    if let Some(largest) = catalog.specs().iter().map(|s| s.memory_bytes).max() {
        if env.accelerator.memory_bytes < largest {
            warnings.push(format!(
                "IMG2IMG_ACCELERATOR_MEMORY ({}) is smaller than the largest pipeline ({largest}); jobs needing it will fail",
                env.accelerator.memory_bytes
            ));
        }
    }

    if env.queue.max_pending < env.max_concurrent {
        warnings.push(format!(
            "IMG2IMG_MAX_QUEUE_DEPTH ({}) < IMG2IMG_MAX_CONCURRENT ({})",
            env.queue.max_pending, env.max_concurrent
        ));
    }

    if !env.server.api_base_url.starts_with("http://") && !env.server.api_base_url.starts_with("https://") {
        warnings.push(format!(
            "IMG2IMG_API_BASE_URL ({}) is not an http(s) URL; output URLs will be unusable",
            env.server.api_base_url
        ));
    }

    if env.openai.api_key.is_none() {
        warnings.push("no OpenAI API key set; default prompts will be used".to_string());
    }

    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    println!("IMG2IMG_HOST={}", cfg.host);
    println!("IMG2IMG_PORT={}", cfg.port);
    println!("IMG2IMG_DEBUG={}", cfg.debug);
    println!("IMG2IMG_API_BASE_URL={}", cfg.api_base_url);
    println!("IMG2IMG_API_VERSION={}", cfg.api_version);
    println!("IMG2IMG_DATA_DIR={}", cfg.data_dir);
    println!("IMG2IMG_WORKER_URL={}", cfg.worker_url);
    println!("IMG2IMG_WORKER_TIMEOUT={}", cfg.worker_timeout_secs);
    println!("IMG2IMG_OPENAI_API_KEY={}", if cfg.openai_configured { "<set>" } else { "<unset>" });
    println!("IMG2IMG_OPENAI_MODEL={}", cfg.openai_model);
    println!("IMG2IMG_MAX_QUEUE_DEPTH={}", cfg.max_queue_depth);
    println!("IMG2IMG_MAX_CONCURRENT={}", cfg.max_concurrent);
    println!("IMG2IMG_ACCELERATOR_MEMORY={}", cfg.accelerator_memory_bytes);
    println!("IMG2IMG_JOB_TIMEOUT={}", cfg.job_timeout_secs);
    println!("IMG2IMG_JOB_TTL={}", cfg.job_ttl_secs);
    println!("IMG2IMG_MAX_ATTEMPTS={}", cfg.max_attempts);
    println!("IMG2IMG_PIPELINE_IDLE_TIMEOUT={}", cfg.pipeline_idle_timeout_secs);
    println!("IMG2IMG_JANITOR_INTERVAL={}", cfg.janitor_interval_secs);
    println!("IMG2IMG_SHUTDOWN_TIMEOUT={}", cfg.shutdown_timeout_secs);
    println!("IMG2IMG_MAX_UPLOAD_BYTES={}", cfg.max_upload_bytes);
    println!("IMG2IMG_LOG_FORMAT={}", cfg.log_format);
    println!("IMG2IMG_LOG_LEVEL={}", cfg.log_level);
}
