//! Settings document for the orchestrator

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::deploy::graph::{HealthCheck, Owner, Probe, ServiceDescriptor};
use crate::errors::OrchestratorError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Compose manifest describing the stack
    #[serde(default = "default_compose_file")]
    pub compose_file: PathBuf,

    /// Compose project name; derived from the manifest directory when unset
    #[serde(default)]
    pub project_name: Option<String>,

    /// KEY=VALUE runtime configuration consumed by the stack at startup
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,

    /// Root directory for per-service persistent data
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    /// Directory receiving backup artifacts
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Externally reachable base URL probed after a deployment
    #[serde(default)]
    pub external_url: Option<String>,

    /// Keys that must be present and non-empty before deploying
    #[serde(default = "default_required_keys")]
    pub required_keys: Vec<String>,

    /// Subset of keys treated as secrets and never logged
    #[serde(default = "default_secret_keys")]
    pub secret_keys: Vec<String>,

    /// Backup stage configuration
    #[serde(default)]
    pub backup: BackupSettings,

    /// Pipeline timing knobs
    #[serde(default)]
    pub timing: TimingSettings,

    /// Stack topology
    #[serde(default = "default_services")]
    pub services: Vec<ServiceDescriptor>,
}

impl Settings {
    /// Read the settings document at `path`, falling back to the built-in
    /// defaults when the file does not exist.
    pub async fn load(path: &Path) -> Result<Self, OrchestratorError> {
        let file = File::new(path);
        if !file.exists().await {
            info!(path = %path.display(), "no settings document, using built-in defaults");
            return Ok(Self::default());
        }
        file.read_json().await.map_err(|e| {
            OrchestratorError::Config(format!(
                "unable to read settings document {}: {}",
                path.display(),
                e
            ))
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            compose_file: default_compose_file(),
            project_name: None,
            env_file: default_env_file(),
            data_root: default_data_root(),
            backup_dir: default_backup_dir(),
            external_url: None,
            required_keys: default_required_keys(),
            secret_keys: default_secret_keys(),
            backup: BackupSettings::default(),
            timing: TimingSettings::default(),
            services: default_services(),
        }
    }
}

fn default_compose_file() -> PathBuf {
    PathBuf::from("/opt/projectboard/docker-compose.yml")
}

fn default_env_file() -> PathBuf {
    PathBuf::from("/opt/projectboard/.env")
}

fn default_data_root() -> PathBuf {
    PathBuf::from("/var/lib/projectboard")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("/var/backups/projectboard")
}

fn default_required_keys() -> Vec<String> {
    [
        "POSTGRES_USER",
        "POSTGRES_PASSWORD",
        "POSTGRES_DB",
        "REDIS_PASSWORD",
        "SECRET_KEY_BASE",
        "APP_HOSTNAME",
    ]
    .map(String::from)
    .to_vec()
}

fn default_secret_keys() -> Vec<String> {
    ["POSTGRES_PASSWORD", "REDIS_PASSWORD", "SECRET_KEY_BASE"]
        .map(String::from)
        .to_vec()
}

/// Backup stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Service the dump command runs in
    #[serde(default = "default_backup_service")]
    pub service: String,

    /// Dump command, executed inside the service container. The container's
    /// own environment supplies credentials.
    #[serde(default = "default_dump_command")]
    pub dump_command: Vec<String>,

    /// Free-space floor for the backup filesystem, in MiB
    #[serde(default = "default_min_free_mb")]
    pub min_free_mb: u64,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            service: default_backup_service(),
            dump_command: default_dump_command(),
            min_free_mb: default_min_free_mb(),
        }
    }
}

fn default_backup_service() -> String {
    "db".to_string()
}

fn default_dump_command() -> Vec<String> {
    vec![
        "sh".to_string(),
        "-lc".to_string(),
        "pg_dump -U \"$POSTGRES_USER\" \"$POSTGRES_DB\"".to_string(),
    ]
}

fn default_min_free_mb() -> u64 {
    512
}

/// Pipeline timing knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Readiness grace period for services with no retry budget of their own
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// First readiness poll delay; doubles up to the max
    #[serde(default = "default_poll_base_secs")]
    pub poll_base_delay_secs: u64,

    /// Cap on the readiness poll delay
    #[serde(default = "default_poll_max_secs")]
    pub poll_max_delay_secs: u64,

    /// Timeout for the external health probe
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Log lines collected from a failing service
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: u32,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
            poll_base_delay_secs: default_poll_base_secs(),
            poll_max_delay_secs: default_poll_max_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            log_tail_lines: default_log_tail_lines(),
        }
    }
}

fn default_grace_period_secs() -> u64 {
    60
}

fn default_poll_base_secs() -> u64 {
    2
}

fn default_poll_max_secs() -> u64 {
    10
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_log_tail_lines() -> u32 {
    50
}

/// Built-in topology: db and cache first, web and worker on top of both.
fn default_services() -> Vec<ServiceDescriptor> {
    vec![
        ServiceDescriptor {
            name: "db".to_string(),
            image: "docker.io/library/postgres:16-alpine".to_string(),
            depends_on: vec![],
            data_dir: Some("postgres".to_string()),
            owner: Some(Owner { uid: 70, gid: 70 }),
            health: HealthCheck {
                start_period_secs: 5,
                probe: Probe::Exec {
                    command: vec![
                        "sh".to_string(),
                        "-lc".to_string(),
                        "pg_isready -U \"$POSTGRES_USER\"".to_string(),
                    ],
                },
                ..HealthCheck::default()
            },
        },
        ServiceDescriptor {
            name: "cache".to_string(),
            image: "docker.io/library/redis:7-alpine".to_string(),
            depends_on: vec![],
            data_dir: Some("redis".to_string()),
            owner: Some(Owner { uid: 999, gid: 999 }),
            health: HealthCheck {
                probe: Probe::Exec {
                    command: vec![
                        "sh".to_string(),
                        "-lc".to_string(),
                        "redis-cli -a \"$REDIS_PASSWORD\" ping | grep -q PONG".to_string(),
                    ],
                },
                ..HealthCheck::default()
            },
        },
        ServiceDescriptor {
            name: "web".to_string(),
            image: "ghcr.io/projectboard/app:stable".to_string(),
            depends_on: vec!["db".to_string(), "cache".to_string()],
            data_dir: Some("assets".to_string()),
            owner: Some(Owner {
                uid: 1000,
                gid: 1000,
            }),
            health: HealthCheck {
                start_period_secs: 15,
                probe: Probe::Http {
                    url: "http://127.0.0.1:8080/health".to_string(),
                },
                ..HealthCheck::default()
            },
        },
        ServiceDescriptor {
            name: "worker".to_string(),
            image: "ghcr.io/projectboard/app:stable".to_string(),
            depends_on: vec!["db".to_string(), "cache".to_string()],
            data_dir: None,
            owner: None,
            health: HealthCheck {
                start_period_secs: 15,
                probe: Probe::Runtime,
                ..HealthCheck::default()
            },
        },
    ]
}
