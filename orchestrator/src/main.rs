//! Deckhand - Entry Point
//!
//! Deployment orchestrator for the containerized project stack. Sequences
//! precondition checks, a database backup, dependency-ordered service
//! startup and post-deploy health verification around a Docker Compose
//! manifest, and exposes the day-two operator commands around it.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use deckhand::app::dispatch::{self, Command};
use deckhand::app::options::AppOptions;
use deckhand::config::settings::Settings;
use deckhand::logs::{init_logging, LogOptions};
use deckhand::utils::version_info;

const DEFAULT_SETTINGS_PATH: &str = "/etc/deckhand/settings.json";

#[derive(Parser, Debug)]
#[command(
    name = "deckhand",
    about = "Deployment orchestrator for the project stack",
    version
)]
struct Cli {
    /// Path to the orchestrator settings document.
    #[arg(long, env = "DECKHAND_SETTINGS", default_value = DEFAULT_SETTINGS_PATH)]
    config: PathBuf,

    /// Override the compose manifest path from the settings document.
    #[arg(long, env = "DECKHAND_COMPOSE_FILE")]
    compose_file: Option<PathBuf>,

    /// Override the stack env file path.
    #[arg(long, env = "DECKHAND_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// Directory for orchestrator log files (stdout only when unset).
    #[arg(long, env = "DECKHAND_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Emit stdout logs as JSON.
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Retrieve the settings document
    let mut settings = match Settings::load(&cli.config).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };
    if let Some(compose_file) = cli.compose_file {
        settings.compose_file = compose_file;
    }
    if let Some(env_file) = cli.env_file {
        settings.env_file = env_file;
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level,
        stdout: true,
        log_dir: cli.log_dir,
        json_format: cli.json_logs,
    };
    let _guard = match init_logging(&log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let version = version_info();
    info!(version = %version.version, git = %version.git_hash, "deckhand starting");

    let options = AppOptions::from_settings(settings);

    // The pipeline has no cancellation of its own; an interrupt signal
    // aborts between polls and the operator inspects with `status`.
    let code = tokio::select! {
        code = dispatch::execute(cli.command, &options) => code,
        _ = await_shutdown_signal() => {
            error!("interrupted; the stack may be partially started - run `deckhand status`");
            130
        }
    };
    std::process::exit(code);
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("signal handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("signal handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
