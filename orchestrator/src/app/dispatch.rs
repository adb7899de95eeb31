//! Command dispatch
//!
//! Maps each subcommand onto the stage pipeline and the attempt outcome
//! onto a process exit code. Fatal stages abort the attempt; verification
//! failures are downgraded to warnings.

use colored::Colorize;
use tracing::{error, info, warn};

use crate::app::options::AppOptions;
use crate::backup;
use crate::config::env_file::DeploymentConfig;
use crate::deploy::attempt::{AttemptEvent, AttemptState, DeploymentAttempt, Stage};
use crate::deploy::compose::{Compose, ContainerRuntime, PsEntry};
use crate::deploy::driver;
use crate::deploy::graph::ServiceGraph;
use crate::errors::OrchestratorError;
use crate::preflight;
use crate::stack::permissions;
use crate::verify::{self, VerifyOutcome};

/// Operator-facing subcommands
#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// Run the full pipeline: preconditions, backup, deploy, verify
    Deploy,

    /// Stop the stack, re-provision directories and ownership, then deploy
    Reset,

    /// Bring services up and wait for readiness, without backup or verify
    Start,

    /// Take the stack down (data volumes are retained)
    Stop,

    /// Show the state of every service
    Status,

    /// Print recent service logs
    Logs {
        /// Restrict to one service
        service: Option<String>,

        /// Number of trailing lines per container
        #[arg(long, default_value_t = 100)]
        tail: u32,
    },

    /// Reconcile data directory ownership (stack must be stopped)
    FixPermissions,
}

/// Execute a subcommand and return the process exit code.
pub async fn execute(command: Command, options: &AppOptions) -> i32 {
    match run_command(command, options).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("{} {}", "error:".red().bold(), e);
            e.exit_code()
        }
    }
}

async fn run_command(command: Command, options: &AppOptions) -> Result<i32, OrchestratorError> {
    match command {
        Command::Deploy => run_deploy(options).await,
        Command::Reset => run_reset(options).await,
        Command::Start => run_start(options).await,
        Command::Stop => run_stop(options).await,
        Command::Status => run_status(options).await,
        Command::Logs { service, tail } => run_logs(options, service.as_deref(), tail).await,
        Command::FixPermissions => run_fix_permissions(options).await,
    }
}

async fn runtime(options: &AppOptions) -> Result<Compose, OrchestratorError> {
    Compose::detect(
        options.settings.compose_file.clone(),
        options.settings.project_name.clone(),
        Some(options.settings.env_file.clone()),
    )
    .await
}

// ================================ DEPLOY ===================================== //

async fn run_deploy(options: &AppOptions) -> Result<i32, OrchestratorError> {
    let mut attempt = DeploymentAttempt::new();
    info!(attempt = %attempt.id(), "deployment attempt starting");

    // Preconditions: read-only, no side effect precedes them.
    begin(&mut attempt, Stage::Preconditions)?;
    let (runtime, graph) = match prepare(options).await {
        Ok(prepared) => {
            pass(&mut attempt)?;
            prepared
        }
        Err(e) => return Ok(abort(&mut attempt, e)),
    };

    // Backup: the only recovery path if the deployment corrupts state. A
    // cold database (reset path) has nothing to snapshot yet.
    begin(&mut attempt, Stage::Backup)?;
    match backup::database_running(&runtime, &options.settings.backup.service).await {
        Ok(false) => {
            info!(service = %options.settings.backup.service, "database not running, nothing to snapshot");
            println!(
                "{} skipping backup: service {} is not running",
                "ok:".green().bold(),
                options.settings.backup.service
            );
            pass(&mut attempt)?;
        }
        Ok(true) => {
            match backup::run(&runtime, &options.settings.backup, &options.layout.backup_dir).await
            {
                Ok(artifact) => {
                    println!(
                        "{} backup artifact {} ({} bytes)",
                        "ok:".green().bold(),
                        artifact.path.display(),
                        artifact.size_bytes
                    );
                    pass(&mut attempt)?;
                }
                Err(e) => return Ok(abort(&mut attempt, e)),
            }
        }
        Err(e) => return Ok(abort(&mut attempt, e)),
    }

    // Deploy: directories first (safe while running), then the driver.
    begin(&mut attempt, Stage::Deploy)?;
    if let Err(e) = options
        .layout
        .provision(&options.settings.services)
        .await
        .map_err(|e| OrchestratorError::Deploy(format!("cannot provision data directories: {}", e)))
    {
        return Ok(abort(&mut attempt, e));
    }
    if let Err(e) = driver::deploy(&runtime, &graph, &options.driver).await {
        let text = e.to_string();
        if let Some(idx) = text.find(driver::LOG_TAIL_MARKER) {
            attempt.record_log_tail(text[idx..].to_string());
        }
        // No automatic rollback: the stack stays up for inspection and the
        // newest artifact is the manual recovery path.
        if let Some(artifact) = backup::latest_artifact(&options.layout.backup_dir).await {
            eprintln!(
                "{} stack left running for inspection; manual rollback artifact: {}",
                "hint:".yellow().bold(),
                artifact.display()
            );
        }
        return Ok(abort(&mut attempt, e));
    }
    pass(&mut attempt)?;

    // Verify: advisory only.
    begin(&mut attempt, Stage::Verify)?;
    match verify::probe(options.settings.external_url.as_deref(), options.probe_timeout).await {
        VerifyOutcome::Passed { target } => {
            println!("{} {} reachable", "ok:".green().bold(), target);
            attempt
                .process(AttemptEvent::StagePassed)
                .map_err(OrchestratorError::Internal)?;
        }
        VerifyOutcome::Warning { message } => {
            warn!("{}", message);
            eprintln!("{} {}", "warning:".yellow().bold(), message);
            attempt
                .process(AttemptEvent::VerifyWarned(message))
                .map_err(OrchestratorError::Internal)?;
        }
    }

    let elapsed = chrono::Utc::now() - attempt.started_at();
    match attempt.state() {
        AttemptState::Succeeded { warning: None } => {
            println!("{} deployment complete in {}s", "ok:".green().bold(), elapsed.num_seconds());
        }
        AttemptState::Succeeded { warning: Some(_) } => {
            println!(
                "{} deployment complete in {}s (with verification warning)",
                "ok:".green().bold(),
                elapsed.num_seconds()
            );
        }
        _ => {}
    }
    Ok(attempt.exit_code())
}

/// Read-only preparation for a deploy: topology, config, runtime, preflight.
async fn prepare(
    options: &AppOptions,
) -> Result<(Compose, ServiceGraph), OrchestratorError> {
    let graph = ServiceGraph::build(options.settings.services.clone())?;
    let config = DeploymentConfig::load(
        &options.settings.env_file,
        &options.settings.required_keys,
        &options.settings.secret_keys,
    )
    .await?;
    preflight::check(&options.settings, &config)?;

    let runtime = runtime(options)
        .await
        .map_err(|e| OrchestratorError::Config(e.to_string()))?;
    preflight::check_runtime(&runtime).await?;

    Ok((runtime, graph))
}

fn begin(attempt: &mut DeploymentAttempt, stage: Stage) -> Result<(), OrchestratorError> {
    println!("{} {}", "==>".blue().bold(), stage.label().bold());
    attempt
        .process(AttemptEvent::StageStarted(stage))
        .map_err(OrchestratorError::Internal)
}

fn pass(attempt: &mut DeploymentAttempt) -> Result<(), OrchestratorError> {
    attempt
        .process(AttemptEvent::StagePassed)
        .map_err(OrchestratorError::Internal)
}

fn abort(attempt: &mut DeploymentAttempt, e: OrchestratorError) -> i32 {
    error!("{}", e);
    eprintln!("{} {}", "error:".red().bold(), e);
    if attempt
        .process(AttemptEvent::StageFailed(e.to_string()))
        .is_err()
    {
        return e.exit_code();
    }
    if let Some(stage) = attempt.failing_stage() {
        eprintln!(
            "{} deployment aborted in {} stage",
            "error:".red().bold(),
            stage.label()
        );
    }
    attempt.exit_code()
}

// ============================= OTHER COMMANDS ================================ //

async fn run_reset(options: &AppOptions) -> Result<i32, OrchestratorError> {
    println!("{} resetting stack", "==>".blue().bold());
    let runtime = runtime(options).await?;

    // Stop first, for every prior state.
    runtime.down().await?;

    // Re-provision directories and ownership while nothing is running.
    options.layout.provision(&options.settings.services).await?;
    let entries = runtime.ps().await?;
    permissions::assert_stopped(&entries)?;
    permissions::fix(&options.layout, &options.settings.services).await?;

    run_deploy(options).await
}

async fn run_start(options: &AppOptions) -> Result<i32, OrchestratorError> {
    println!("{} starting stack", "==>".blue().bold());
    let runtime = runtime(options).await?;
    let graph = ServiceGraph::build(options.settings.services.clone())?;

    runtime
        .up_detached()
        .await
        .map_err(|e| OrchestratorError::Deploy(format!("service startup failed: {}", e)))?;
    driver::await_ready(&runtime, &graph, &options.driver).await?;

    println!("{} stack is running", "ok:".green().bold());
    Ok(0)
}

async fn run_stop(options: &AppOptions) -> Result<i32, OrchestratorError> {
    println!("{} stopping stack", "==>".blue().bold());
    let runtime = runtime(options).await?;
    runtime.down().await?;
    println!("{} stack is down (volumes retained)", "ok:".green().bold());
    Ok(0)
}

async fn run_status(options: &AppOptions) -> Result<i32, OrchestratorError> {
    let runtime = runtime(options).await?;
    let entries = runtime.ps().await?;

    if entries.is_empty() {
        println!("no service containers exist; the stack is down");
        return Ok(0);
    }

    println!("{:<12} {:<12} {:<12}", "SERVICE", "STATE", "HEALTH");
    for entry in &entries {
        let state = paint_state(entry);
        let health = if entry.has_health() {
            entry.health.clone()
        } else {
            "-".to_string()
        };
        println!("{:<12} {:<12} {:<12}", entry.service, state, health);
    }
    Ok(0)
}

fn paint_state(entry: &PsEntry) -> String {
    if entry.is_exited() || entry.is_unhealthy() {
        entry.state.red().to_string()
    } else if entry.is_running() && (!entry.has_health() || entry.is_healthy()) {
        entry.state.green().to_string()
    } else {
        entry.state.yellow().to_string()
    }
}

async fn run_logs(
    options: &AppOptions,
    service: Option<&str>,
    tail: u32,
) -> Result<i32, OrchestratorError> {
    let runtime = runtime(options).await?;
    let text = runtime.logs_tail(service, tail).await?;
    print!("{}", text);
    Ok(0)
}

async fn run_fix_permissions(options: &AppOptions) -> Result<i32, OrchestratorError> {
    let runtime = runtime(options).await?;
    let entries = runtime.ps().await?;
    permissions::assert_stopped(&entries)?;

    options.layout.provision(&options.settings.services).await?;
    permissions::fix(&options.layout, &options.settings.services).await?;
    println!("{} ownership reconciled", "ok:".green().bold());
    Ok(0)
}
