//! Backup stage
//!
//! Runs the database dump inside its container, compresses the stream, and
//! writes a uniquely named artifact. Runs strictly before the deployment
//! driver mutates the running stack; a failure here aborts the attempt.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::settings::BackupSettings;
use crate::deploy::compose::ContainerRuntime;
use crate::errors::OrchestratorError;
use crate::filesys::dir::Dir;
use crate::utils::hex_encode;

const ARTIFACT_PREFIX: &str = "pre-deploy-";
const ARTIFACT_SUFFIX: &str = ".sql.gz";

/// A point-in-time snapshot taken before a deployment.
///
/// Never mutated after creation; rotation is an external concern.
#[derive(Debug, Clone)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Artifact file name for a dump taken at `now`
pub fn artifact_name(now: DateTime<Utc>) -> String {
    format!(
        "{}{}{}",
        ARTIFACT_PREFIX,
        now.format("%Y%m%d-%H%M%S"),
        ARTIFACT_SUFFIX
    )
}

/// Pick a path that does not collide with an existing artifact.
///
/// Re-running within the same second gets a `-N` suffix; an existing
/// artifact is never overwritten.
pub fn unique_artifact_path(dir: &Path, now: DateTime<Utc>) -> PathBuf {
    let base = artifact_name(now);
    let mut candidate = dir.join(&base);
    let stem = base.trim_end_matches(ARTIFACT_SUFFIX).to_string();
    let mut n = 1u32;
    while candidate.exists() {
        candidate = dir.join(format!("{}-{}{}", stem, n, ARTIFACT_SUFFIX));
        n += 1;
    }
    candidate
}

/// Newest artifact in the backup directory, by file name
pub async fn latest_artifact(backup_dir: &Path) -> Option<PathBuf> {
    let mut artifacts: Vec<PathBuf> = Dir::new(backup_dir)
        .list_files()
        .await
        .ok()?
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(ARTIFACT_PREFIX))
                .unwrap_or(false)
        })
        .collect();
    artifacts.sort();
    artifacts.pop()
}

/// Whether the database service has a running container to dump from.
///
/// A cold stack has nothing to snapshot: `deploy` after `stop` (the reset
/// path) skips the dump instead of failing it.
pub async fn database_running(
    runtime: &dyn ContainerRuntime,
    service: &str,
) -> Result<bool, OrchestratorError> {
    let entries = runtime
        .ps()
        .await
        .map_err(|e| OrchestratorError::Backup(format!("cannot inspect services: {}", e)))?;
    Ok(entries
        .iter()
        .any(|e| e.service == service && e.is_running()))
}

/// Run the backup stage
pub async fn run(
    runtime: &dyn ContainerRuntime,
    settings: &BackupSettings,
    backup_dir: &Path,
) -> Result<BackupArtifact, OrchestratorError> {
    tokio::fs::create_dir_all(backup_dir).await.map_err(|e| {
        OrchestratorError::Backup(format!(
            "cannot create backup directory {}: {}",
            backup_dir.display(),
            e
        ))
    })?;

    let created_at = Utc::now();
    let path = unique_artifact_path(backup_dir, created_at);
    info!(service = %settings.service, path = %path.display(), "dumping database");

    let output = runtime
        .exec(&settings.service, &settings.dump_command)
        .await
        .map_err(|e| OrchestratorError::Backup(format!("dump command failed to run: {}", e)))?;

    if !output.status_ok {
        return Err(OrchestratorError::Backup(format!(
            "dump command failed in service {}: {}",
            settings.service,
            output.stderr.trim()
        )));
    }
    if output.stdout.is_empty() {
        return Err(OrchestratorError::Backup(format!(
            "dump command in service {} produced no output",
            settings.service
        )));
    }

    let write_path = path.clone();
    let dump = output.stdout;
    let (sha256, size_bytes) =
        tokio::task::spawn_blocking(move || write_artifact(&write_path, &dump))
            .await
            .map_err(|e| OrchestratorError::Internal(e.to_string()))??;

    info!(path = %path.display(), size_bytes, %sha256, "backup artifact written");
    Ok(BackupArtifact {
        path,
        created_at,
        size_bytes,
        sha256,
    })
}

/// Compress `data` into `path`, fsync, and return (sha256-of-dump, file size)
fn write_artifact(path: &Path, data: &[u8]) -> Result<(String, u64), OrchestratorError> {
    let file = std::fs::File::create(path)
        .map_err(|e| OrchestratorError::Backup(format!("cannot create {}: {}", path.display(), e)))?;

    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| OrchestratorError::Backup(format!("compression failed: {}", e)))?;
    let file = encoder
        .finish()
        .map_err(|e| OrchestratorError::Backup(format!("compression failed: {}", e)))?;
    file.sync_all()
        .map_err(|e| OrchestratorError::Backup(format!("cannot sync {}: {}", path.display(), e)))?;

    let size_bytes = file
        .metadata()
        .map_err(|e| OrchestratorError::Backup(e.to_string()))?
        .len();

    let mut hasher = Sha256::new();
    hasher.update(data);
    Ok((hex_encode(hasher.finalize()), size_bytes))
}
