//! Precondition checks
//!
//! Everything here is read-only: the checks run before any backup or
//! service command, and a failure halts the attempt with the specific
//! missing item named.

use std::path::Path;

use sysinfo::Disks;
use tracing::{debug, info};

use crate::config::env_file::DeploymentConfig;
use crate::config::settings::Settings;
use crate::deploy::compose::ContainerRuntime;
use crate::errors::OrchestratorError;

/// Report of the static (no-runtime) checks
#[derive(Debug, Clone, Default)]
pub struct PreflightReport {
    /// Free space on the backup filesystem, when it could be determined
    pub free_space_mb: Option<u64>,
}

/// Static preconditions: manifest present, required keys set, disk floor.
pub fn check(
    settings: &Settings,
    config: &DeploymentConfig,
) -> Result<PreflightReport, OrchestratorError> {
    if !settings.compose_file.exists() {
        return Err(OrchestratorError::Config(format!(
            "compose manifest not found: {}",
            settings.compose_file.display()
        )));
    }

    let missing = missing_keys(config, &settings.required_keys);
    if !missing.is_empty() {
        return Err(OrchestratorError::Config(format!(
            "missing or empty required configuration keys: {}",
            missing.join(", ")
        )));
    }
    debug!(
        keys = settings.required_keys.len(),
        config = %config.path().display(),
        "required configuration keys present"
    );

    let free_space_mb = free_space_mb(&settings.backup_dir);
    if let Some(free) = free_space_mb {
        if free < settings.backup.min_free_mb {
            return Err(OrchestratorError::Config(format!(
                "only {} MiB free under {}, need at least {} MiB for the backup",
                free,
                settings.backup_dir.display(),
                settings.backup.min_free_mb
            )));
        }
    }

    info!("static preconditions satisfied");
    Ok(PreflightReport { free_space_mb })
}

/// Runtime precondition: the container runtime answers a version query.
pub async fn check_runtime(
    runtime: &dyn ContainerRuntime,
) -> Result<String, OrchestratorError> {
    let version = runtime
        .version()
        .await
        .map_err(|e| OrchestratorError::Config(format!("container runtime unavailable: {}", e)))?;
    info!(%version, "container runtime available");
    Ok(version)
}

/// Required keys that are absent or blank, in the order they were required
pub fn missing_keys(config: &DeploymentConfig, required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|key| config.is_blank(key))
        .cloned()
        .collect()
}

/// Free space of the filesystem holding `path`, in MiB.
///
/// The deepest mount point that is a prefix of `path` wins. `None` when the
/// disk list gives no answer (unusual filesystems, containers).
fn free_space_mb(path: &Path) -> Option<u64> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space() / (1024 * 1024))
}
