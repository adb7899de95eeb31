//! Host filesystem layout for the stack

use std::path::PathBuf;

use crate::deploy::graph::ServiceDescriptor;
use crate::errors::OrchestratorError;
use crate::filesys::dir::Dir;

/// Fixed host paths holding the stack's persistent state
#[derive(Debug, Clone)]
pub struct StackLayout {
    pub data_root: PathBuf,
    pub backup_dir: PathBuf,
}

impl StackLayout {
    pub fn new(data_root: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            backup_dir: backup_dir.into(),
        }
    }

    /// Persistent data directory for one service, when it has one
    pub fn service_data_dir(&self, service: &ServiceDescriptor) -> Option<Dir> {
        service
            .data_dir
            .as_ref()
            .map(|dir| Dir::new(self.data_root.join(dir)))
    }

    /// Directory receiving backup artifacts
    pub fn backups(&self) -> Dir {
        Dir::new(&self.backup_dir)
    }

    /// Create every directory the stack expects. Idempotent and safe with
    /// services running; ownership is reconciled separately.
    pub async fn provision(
        &self,
        services: &[ServiceDescriptor],
    ) -> Result<(), OrchestratorError> {
        Dir::new(&self.data_root).create().await?;
        self.backups().create().await?;
        for service in services {
            if let Some(dir) = self.service_data_dir(service) {
                dir.create().await?;
            }
        }
        Ok(())
    }
}
