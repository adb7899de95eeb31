//! Data directory ownership
//!
//! Each service's data directory must belong to the uid/gid the container
//! runs as. Changing ownership under a live, mounted tree while a service
//! is writing to it is unsafe, so callers must verify the stack is stopped
//! first (`assert_stopped`).

use std::path::Path;

use tracing::info;

use crate::deploy::compose::PsEntry;
use crate::deploy::graph::{Owner, ServiceDescriptor};
use crate::errors::OrchestratorError;
use crate::stack::layout::StackLayout;

/// Refuse ownership changes while any service container is running.
pub fn assert_stopped(entries: &[PsEntry]) -> Result<(), OrchestratorError> {
    let running: Vec<&str> = entries
        .iter()
        .filter(|e| e.is_running())
        .map(|e| e.service.as_str())
        .collect();
    if !running.is_empty() {
        return Err(OrchestratorError::Config(format!(
            "refusing to change ownership while services are running: {}",
            running.join(", ")
        )));
    }
    Ok(())
}

/// Recursively apply each service's expected uid/gid to its data directory.
pub async fn fix(
    layout: &StackLayout,
    services: &[ServiceDescriptor],
) -> Result<(), OrchestratorError> {
    for service in services {
        let Some(dir) = layout.service_data_dir(service) else {
            continue;
        };
        let Some(owner) = service.owner else {
            continue;
        };
        if !dir.exists().await {
            continue;
        }

        let path = dir.path().to_path_buf();
        info!(
            service = %service.name,
            path = %path.display(),
            uid = owner.uid,
            gid = owner.gid,
            "applying ownership"
        );
        tokio::task::spawn_blocking(move || chown_tree(&path, owner))
            .await
            .map_err(|e| OrchestratorError::Internal(e.to_string()))??;
    }
    Ok(())
}

#[cfg(unix)]
fn chown_tree(path: &Path, owner: Owner) -> Result<(), OrchestratorError> {
    use nix::unistd::{chown, Gid, Uid};

    let uid = Uid::from_raw(owner.uid);
    let gid = Gid::from_raw(owner.gid);

    chown(path, Some(uid), Some(gid))
        .map_err(|e| OrchestratorError::Runtime(format!("chown {}: {}", path.display(), e)))?;

    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            continue;
        }
        let child = entry.path();
        if file_type.is_dir() {
            chown_tree(&child, owner)?;
        } else {
            chown(&child, Some(uid), Some(gid)).map_err(|e| {
                OrchestratorError::Runtime(format!("chown {}: {}", child.display(), e))
            })?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn chown_tree(_path: &Path, _owner: Owner) -> Result<(), OrchestratorError> {
    Ok(())
}
