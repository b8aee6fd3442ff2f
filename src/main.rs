//! img2img API entry point.
//!
//! Bootstraps the generation service with:
//! - `.env` and configuration loading
//! - Structured logging
//! - Worker pool, janitor and the HTTP gateway
//! - Signal handling for graceful shutdown
//!
//! ## CLI Subcommands
//!
//! - `img2img-api` or `img2img-api serve` - Run the HTTP server (default)
//! - `img2img-api health` - Query a running server (exit 0/1)
//! - `img2img-api config show|defaults|validate` - Inspect configuration

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use img2img_core::api::{self, AppState};
use img2img_core::cli::{config_cmd, get_server_url, run_health};
use img2img_core::config::{self, EnvConfig};
use img2img_core::shutdown::ShutdownResult;
use img2img_core::telemetry::init_logging;
use img2img_core::{Runtime, RuntimeConfig, RuntimeServices};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let command = match args.get(1).map(|s| s.as_str()) {
        None => "serve",
        Some(flag) if flag.starts_with("--") && !matches!(flag, "--help" | "--version") => "serve",
        Some(cmd) => cmd,
    };
    // Options start after the command word, or at argv[1] for a bare `--flag`.
    let options = if args.get(1).map(|s| s.as_str()) == Some(command) {
        &args[2..]
    } else {
        &args[1..]
    };

    match command {
        "serve" => {
            let serve_args = match ServeArgs::parse(options) {
                Ok(a) => a,
                Err(e) => {
                    eprintln!("Error: {e}");
                    print_command_help("serve");
                    return ExitCode::from(2u8);
                }
            };
            let env = match serve_args.load_config() {
                Ok(env) => env,
                Err(e) => {
                    eprintln!("Configuration error: {e}");
                    return ExitCode::from(2u8);
                }
            };
            if let Err(e) = init_logging(&env.logging) {
                eprintln!("Failed to initialize logging: {e}");
                return ExitCode::from(2u8);
            }
            match run_server(env).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %format!("{e:#}"), "server error");
                    eprintln!("Server error: {e:#}");
                    ExitCode::FAILURE
                }
            }
        }
        "health" => {
            let url = flag_value(options, "--url").unwrap_or_else(get_server_url);
            let code = run_health(&url).await;
            ExitCode::from(code as u8)
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("img2img-api {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "config" => {
            let subcommand = options.first().map(|s| s.as_str()).unwrap_or("show");
            let file = flag_value(options, "--config").map(PathBuf::from);
            match subcommand {
                "show" => ExitCode::from(config_cmd::run_show(file.as_deref()) as u8),
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => ExitCode::from(config_cmd::run_validate(file.as_deref()) as u8),
                _ => {
                    eprintln!("Unknown config subcommand: {subcommand}");
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        _ => {
            eprintln!("Unknown command: {command}");
            print_usage();
            ExitCode::FAILURE
        }
    }
}

/// Options of the `serve` command. Command-line values win over
/// environment and file values.
#[derive(Debug, Default, PartialEq)]
struct ServeArgs {
    host: Option<String>,
    port: Option<u16>,
    debug: bool,
    config: Option<PathBuf>,
}

impl ServeArgs {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut out = Self::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--host" => out.host = Some(next_value(&mut iter, "--host")?),
                "--port" => {
                    let raw = next_value(&mut iter, "--port")?;
                    out.port = Some(raw.parse().map_err(|_| format!("invalid port '{raw}'"))?);
                }
                "--debug" => out.debug = true,
                "--config" => out.config = Some(PathBuf::from(next_value(&mut iter, "--config")?)),
                other => return Err(format!("unknown option '{other}'")),
            }
        }
        Ok(out)
    }

    fn load_config(&self) -> Result<EnvConfig, config::ConfigError> {
        let mut env = match &self.config {
            Some(path) => config::load_with_file(path)?,
            None => config::load(),
        };
        if let Some(host) = &self.host {
            env.server.host = host.clone();
        }
        if let Some(port) = self.port {
            env.server.port = port;
        }
        if self.debug {
            env.server.debug = true;
            if std::env::var("IMG2IMG_LOG_LEVEL").is_err() {
                env.logging.level = "debug".to_string();
            }
        }
        Ok(env)
    }
}

fn next_value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<String, String> {
    iter.next()
        .cloned()
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

async fn run_server(env: EnvConfig) -> anyhow::Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        debug = env.server.debug,
        config = ?env.effective_config(),
        "starting img2img api"
    );

    let services = RuntimeServices::remote(env.worker.clone(), env.openai.clone());
    let runtime = Runtime::start(RuntimeConfig::from(&env), services)
        .await
        .with_context(|| format!("failed to prepare data directory {}", env.data_dir.display()))?;
    let runtime = Arc::new(runtime);

    let state = AppState::new(runtime.clone(), env.validation.clone(), &env.server.api_base_url);
    let app = api::router(state, &env.api_prefix());

    let addr = env.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, prefix = %env.api_prefix(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    tracing::info!("shutdown signal received, draining");
    match runtime.shutdown().await {
        ShutdownResult::Complete => tracing::info!("shutdown complete"),
        ShutdownResult::Timeout { remaining } => {
            tracing::warn!(remaining, "shutdown timeout, running jobs were cancelled");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "img2img-api - Interior design image generation service v{version}

USAGE:
    img2img-api [COMMAND] [OPTIONS]

COMMANDS:
    serve        Run the HTTP server (default when no command given)
    health       Query a running server (exit 0 if healthy)
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

EXAMPLES:
    img2img-api                              # Run the server (default)
    img2img-api serve --port 8080 --debug    # Custom port, debug logging
    img2img-api serve --config img2img.toml  # Layer a TOML file over defaults
    img2img-api health                       # Health check
    img2img-api config validate              # Validate configuration

ENVIRONMENT:
    IMG2IMG_*            See `img2img-api config defaults` for every key
    OPENAI_API_KEY       Prompt generation key (fallback for IMG2IMG_OPENAI_API_KEY)
    IMG2IMG_SERVER_URL   Server probed by `health` (default: {url})
    RUST_LOG             Overrides the log filter

EXIT CODES:
    0  Success / Healthy
    1  Failure / Unhealthy
    2  Configuration error
    3  Connection error
",
        url = img2img_core::cli::DEFAULT_SERVER_URL,
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "serve" => {
            eprintln!(
                "img2img-api serve - Run the HTTP server

USAGE:
    img2img-api serve [OPTIONS]

OPTIONS:
    --host HOST     Bind address (default: 0.0.0.0)
    --port PORT     Bind port (default: 8000)
    --debug         Enable debug mode and debug logging
    --config FILE   Load configuration from a TOML file

DESCRIPTION:
    Starts the worker pool and serves the API under /api/v1, health checks
    under /health and generated images under /data. Ctrl+C or SIGTERM stops
    admission, waits for running jobs, then exits.
"
            );
        }
        "health" => {
            eprintln!(
                "img2img-api health - Query a running server

USAGE:
    img2img-api health [--url URL]

EXIT CODES:
    0  Server is healthy
    1  Server is unhealthy
    3  Connection error
"
            );
        }
        "config" => {
            eprintln!(
                "img2img-api config - Inspect configuration

USAGE:
    img2img-api config [show|defaults|validate] [--config FILE]

SUBCOMMANDS:
    show       Print effective values (defaults < file < environment)
    defaults   Print built-in defaults
    validate   Warn about likely misconfigurations (exit 1 on warnings)
"
            );
        }
        _ => {
            eprintln!("No help available for '{command}'");
            print_usage();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_serve_options() {
        let parsed = ServeArgs::parse(&args(&["--host", "127.0.0.1", "--port", "9000", "--debug"])).unwrap();
        assert_eq!(parsed.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(parsed.port, Some(9000));
        assert!(parsed.debug);
        assert_eq!(parsed.config, None);
    }

    #[test]
    fn rejects_bad_serve_options() {
        assert!(ServeArgs::parse(&args(&["--port", "eighty"])).is_err());
        assert!(ServeArgs::parse(&args(&["--port"])).is_err());
        assert!(ServeArgs::parse(&args(&["--verbose"])).is_err());
    }

    #[test]
    fn finds_flag_values() {
        let list = args(&["validate", "--config", "a.toml"]);
        assert_eq!(flag_value(&list, "--config").as_deref(), Some("a.toml"));
        assert_eq!(flag_value(&list, "--url"), None);
    }
}
