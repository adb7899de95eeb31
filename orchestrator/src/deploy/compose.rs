//! Container runtime collaborator (Docker Compose)

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::errors::OrchestratorError;

/// Observed state of one service container, parsed from `ps` output
#[derive(Debug, Clone, Deserialize)]
pub struct PsEntry {
    #[serde(rename = "Name", default)]
    pub name: String,

    #[serde(rename = "Service", default)]
    pub service: String,

    #[serde(rename = "State", default)]
    pub state: String,

    #[serde(rename = "Health", default)]
    pub health: String,

    #[serde(rename = "ExitCode", default)]
    pub exit_code: i64,
}

impl PsEntry {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    pub fn is_exited(&self) -> bool {
        matches!(self.state.as_str(), "exited" | "dead")
    }

    pub fn is_healthy(&self) -> bool {
        self.health == "healthy"
    }

    pub fn is_unhealthy(&self) -> bool {
        self.health == "unhealthy"
    }

    /// Whether the manifest defines a healthcheck for this container
    pub fn has_health(&self) -> bool {
        !self.health.is_empty()
    }
}

/// Captured output of a command run inside a service container
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub status_ok: bool,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Abstraction over the container runtime.
///
/// The deployment driver and backup stage only speak this trait, so they can
/// be exercised against a scripted fake in tests.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime version string; doubles as the availability probe
    async fn version(&self) -> Result<String, OrchestratorError>;

    /// Pull/refresh every image in the manifest
    async fn pull(&self) -> Result<(), OrchestratorError>;

    /// Start the whole stack detached, removing orphan containers
    async fn up_detached(&self) -> Result<(), OrchestratorError>;

    /// Take the stack down, removing orphans. Volumes are never removed.
    async fn down(&self) -> Result<(), OrchestratorError>;

    /// Container states for every service in the manifest, stopped included
    async fn ps(&self) -> Result<Vec<PsEntry>, OrchestratorError>;

    /// Trailing log lines, optionally restricted to one service
    async fn logs_tail(
        &self,
        service: Option<&str>,
        lines: u32,
    ) -> Result<String, OrchestratorError>;

    /// Run a command inside a service container (no TTY)
    async fn exec(
        &self,
        service: &str,
        command: &[String],
    ) -> Result<ExecOutput, OrchestratorError>;
}

/// How `docker compose` is spelled on this host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Launcher {
    /// `docker compose` (compose v2 plugin)
    Plugin,
    /// Standalone `docker-compose` binary on older hosts
    Legacy,
}

impl Launcher {
    fn command(&self) -> Command {
        match self {
            Launcher::Plugin => {
                let mut cmd = Command::new("docker");
                cmd.arg("compose");
                cmd
            }
            Launcher::Legacy => Command::new("docker-compose"),
        }
    }
}

/// Docker Compose invocation wrapper
#[derive(Debug, Clone)]
pub struct Compose {
    launcher: Launcher,
    compose_file: PathBuf,
    project_name: Option<String>,
    env_file: Option<PathBuf>,
}

impl Compose {
    /// Detect the compose launcher available on this host and bind it to
    /// the given manifest.
    pub async fn detect(
        compose_file: PathBuf,
        project_name: Option<String>,
        env_file: Option<PathBuf>,
    ) -> Result<Self, OrchestratorError> {
        for launcher in [Launcher::Plugin, Launcher::Legacy] {
            let mut cmd = launcher.command();
            cmd.arg("version")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
            if let Ok(status) = cmd.status().await {
                if status.success() {
                    debug!(?launcher, "container runtime detected");
                    return Ok(Self {
                        launcher,
                        compose_file,
                        project_name,
                        env_file,
                    });
                }
            }
        }

        Err(OrchestratorError::Runtime(
            "docker compose is not available on this host (tried `docker compose` and `docker-compose`)"
                .to_string(),
        ))
    }

    fn base_command(&self) -> Command {
        let mut cmd = self.launcher.command();
        cmd.arg("--file").arg(&self.compose_file);
        if let Some(project) = &self.project_name {
            cmd.arg("--project-name").arg(project);
        }
        if let Some(env_file) = &self.env_file {
            cmd.arg("--env-file").arg(env_file);
        }
        cmd
    }

    /// Run a subcommand with the operator's terminal attached, for commands
    /// whose progress output matters (pull, up, down).
    async fn run_streamed(&self, args: &[&str]) -> Result<(), OrchestratorError> {
        let mut cmd = self.base_command();
        cmd.args(args).stdin(Stdio::null());
        debug!(?args, "compose (streamed)");

        let status = cmd.status().await.map_err(|e| {
            OrchestratorError::Runtime(format!("failed to run docker compose {}: {}", args[0], e))
        })?;

        if !status.success() {
            return Err(OrchestratorError::Runtime(format!(
                "docker compose {} exited with {}",
                args[0], status
            )));
        }
        Ok(())
    }

    /// Run a subcommand and capture its output.
    async fn run_captured(&self, args: &[&str]) -> Result<std::process::Output, OrchestratorError> {
        let mut cmd = self.base_command();
        cmd.args(args).stdin(Stdio::null());
        debug!(?args, "compose (captured)");

        cmd.output().await.map_err(|e| {
            OrchestratorError::Runtime(format!("failed to run docker compose {}: {}", args[0], e))
        })
    }
}

#[async_trait]
impl ContainerRuntime for Compose {
    async fn version(&self) -> Result<String, OrchestratorError> {
        let mut cmd = self.launcher.command();
        cmd.arg("version").arg("--short").stdin(Stdio::null());
        let output = cmd.output().await.map_err(|e| {
            OrchestratorError::Runtime(format!("failed to run docker compose version: {}", e))
        })?;
        if !output.status.success() {
            return Err(OrchestratorError::Runtime(
                "docker compose version failed".to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn pull(&self) -> Result<(), OrchestratorError> {
        self.run_streamed(&["pull"]).await
    }

    async fn up_detached(&self) -> Result<(), OrchestratorError> {
        self.run_streamed(&["up", "--detach", "--remove-orphans"])
            .await
    }

    async fn down(&self) -> Result<(), OrchestratorError> {
        self.run_streamed(&["down", "--remove-orphans"]).await
    }

    async fn ps(&self) -> Result<Vec<PsEntry>, OrchestratorError> {
        let output = self
            .run_captured(&["ps", "--all", "--format", "json"])
            .await?;
        if !output.status.success() {
            return Err(OrchestratorError::Runtime(format!(
                "docker compose ps failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_ps_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn logs_tail(
        &self,
        service: Option<&str>,
        lines: u32,
    ) -> Result<String, OrchestratorError> {
        let tail = lines.to_string();
        let mut args = vec!["logs", "--no-color", "--tail", tail.as_str()];
        if let Some(service) = service {
            args.push(service);
        }
        let output = self.run_captured(&args).await?;
        if !output.status.success() {
            return Err(OrchestratorError::Runtime(format!(
                "docker compose logs failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn exec(
        &self,
        service: &str,
        command: &[String],
    ) -> Result<ExecOutput, OrchestratorError> {
        let mut args: Vec<&str> = vec!["exec", "-T", service];
        args.extend(command.iter().map(String::as_str));
        let output = self.run_captured(&args).await?;
        Ok(ExecOutput {
            status_ok: output.status.success(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Parse `ps --format json` output.
///
/// Compose v2.21+ emits one JSON object per line; older releases emit a
/// single JSON array. Both are accepted.
pub fn parse_ps_output(raw: &str) -> Result<Vec<PsEntry>, OrchestratorError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        let entries: Vec<PsEntry> = serde_json::from_str(trimmed)?;
        return Ok(entries);
    }

    let mut entries = Vec::new();
    for line in trimmed.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }
    Ok(entries)
}
