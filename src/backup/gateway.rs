//! Backup/restore entry points
//!
//! [`BackupGateway`] is what a route layer or the CLI calls. It owns the
//! directory lock, runs blocking file and datastore work off the async
//! threads, and confines every caller-supplied path to the backups directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::{ClinicPaths, RetentionSettings, Settings};
use crate::error::{BackupError, BackupResult};
use crate::models::{ArtifactKind, BackupArtifact};
use crate::storage::Datastore;

use super::clock::Clock;
use super::pipeline::{BackupStrategy, DumpPipeline};
use super::process::DumpTool;
use super::restore::{RestoreOrchestrator, RestoreReport};
use super::retention::{list_artifacts, sort_newest_first, RetentionManager};
use super::scheduler::ScheduledJob;
use super::snapshot::{ImportSummary, SnapshotCodec, SnapshotManifest};

/// A dump archive streamed to a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedArchive {
    /// Suggested download name, e.g. `backup-1718000000000.zip`
    pub file_name: String,
    /// Bytes written to the caller
    pub bytes: u64,
}

/// Serialized access to backups, exports and restores
pub struct BackupGateway {
    paths: ClinicPaths,
    strategy: BackupStrategy,
    retention: RetentionSettings,
    codec: SnapshotCodec,
    restorer: RestoreOrchestrator,
    pipeline: DumpPipeline,
    clock: Arc<dyn Clock>,
    dir_lock: Mutex<()>,
}

impl BackupGateway {
    pub fn new(
        paths: ClinicPaths,
        settings: &Settings,
        datastore: Arc<dyn Datastore>,
        tool: DumpTool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            paths,
            strategy: settings.scheduled_strategy,
            retention: settings.retention.clone(),
            codec: SnapshotCodec::new(datastore.clone()),
            restorer: RestoreOrchestrator::new(datastore),
            pipeline: DumpPipeline::new(tool, clock.clone()),
            clock,
            dir_lock: Mutex::new(()),
        }
    }

    pub fn paths(&self) -> &ClinicPaths {
        &self.paths
    }

    pub fn strategy(&self) -> BackupStrategy {
        self.strategy
    }

    /// Run the configured strategy, then its retention
    pub async fn run_scheduled_backup(&self) -> BackupResult<BackupArtifact> {
        let _lock = self.dir_lock.lock().await;
        match self.strategy {
            BackupStrategy::ArchiveDump => {
                let artifact = self.pipeline.produce_archive(&self.paths.backups_dir()).await?;
                self.enforce_logged(self.archive_retention()).await;
                Ok(artifact)
            }
            BackupStrategy::JsonSnapshot => self.snapshot_locked().await,
        }
    }

    /// Every backup artifact of both kinds, newest first
    pub async fn list_backups(&self) -> BackupResult<Vec<BackupArtifact>> {
        let dir = self.paths.backups_dir();
        tokio::task::spawn_blocking(move || -> BackupResult<Vec<BackupArtifact>> {
            let mut artifacts = list_artifacts(&dir, ArtifactKind::DumpArchive)?;
            artifacts.extend(list_artifacts(&dir, ArtifactKind::JsonSnapshot)?);
            sort_newest_first(&mut artifacts);
            Ok(artifacts)
        })
        .await?
    }

    /// Dump, archive and stream the archive into `writer`
    ///
    /// The archive is staged in the exports directory and removed once
    /// streamed, whether or not streaming succeeded. The directory lock is
    /// released before streaming, so a slow reader never holds up backups.
    pub async fn export_backup<W>(&self, writer: &mut W) -> BackupResult<ExportedArchive>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let artifact = {
            let _lock = self.dir_lock.lock().await;
            self.pipeline.produce_archive(&self.paths.exports_dir()).await?
        };

        let streamed = stream_file(&artifact.location, writer).await;
        if let Err(e) = tokio::fs::remove_file(&artifact.location).await {
            warn!(
                "Failed to remove exported archive {}: {}",
                artifact.location.display(),
                e
            );
        }

        let bytes = streamed?;
        info!("Streamed {} ({} bytes)", artifact.file_name(), bytes);
        Ok(ExportedArchive {
            file_name: artifact.file_name(),
            bytes,
        })
    }

    /// Load a dump directory with the native restore tool
    pub async fn import_backup(&self, dir_path: &Path) -> BackupResult<()> {
        let dir = self.paths.confine_to_backups(dir_path)?;
        if !dir.is_dir() {
            return Err(BackupError::Validation(format!(
                "Not a dump directory: {}",
                dir_path.display()
            )));
        }

        self.pipeline.tool().restore(&dir).await?;
        info!("Imported dump {}", dir.display());
        Ok(())
    }

    /// Write a JSON snapshot backup, then apply snapshot retention
    pub async fn create_snapshot(&self) -> BackupResult<BackupArtifact> {
        let _lock = self.dir_lock.lock().await;
        self.snapshot_locked().await
    }

    /// Write an export-only JSON snapshot into the exports directory
    pub async fn export_snapshot(&self) -> BackupResult<PathBuf> {
        let _lock = self.dir_lock.lock().await;
        let codec = self.codec.clone();
        let dir = self.paths.exports_dir();
        let now = self.clock.now();
        tokio::task::spawn_blocking(move || codec.write_export(&dir, now)).await?
    }

    /// Append a manifest's records to the datastore
    pub async fn import_snapshot(&self, manifest: SnapshotManifest) -> BackupResult<ImportSummary> {
        let codec = self.codec.clone();
        tokio::task::spawn_blocking(move || codec.import(manifest)).await?
    }

    /// Read a snapshot file from the backups directory
    pub async fn inspect_snapshot(&self, path: &Path) -> BackupResult<SnapshotManifest> {
        let path = self.paths.confine_to_backups(path)?;
        tokio::task::spawn_blocking(move || SnapshotManifest::read_from_file(&path)).await?
    }

    /// Replace the restore-managed collections with a snapshot file's records
    pub async fn restore_snapshot(&self, path: &Path) -> BackupResult<RestoreReport> {
        let manifest = self.inspect_snapshot(path).await?;
        self.restore_manifest(manifest).await
    }

    /// Replace the restore-managed collections with a manifest's records
    pub async fn restore_manifest(&self, manifest: SnapshotManifest) -> BackupResult<RestoreReport> {
        RestoreOrchestrator::validate(&manifest)?;
        let restorer = self.restorer.clone();
        let report = tokio::task::spawn_blocking(move || restorer.restore(manifest)).await??;
        info!("{}", report.summary());
        Ok(report)
    }

    /// Apply retention to both artifact kinds, returning deleted paths
    pub async fn prune(&self) -> BackupResult<Vec<PathBuf>> {
        let _lock = self.dir_lock.lock().await;
        let mut managers = vec![self.archive_retention()];
        managers.extend(self.snapshot_retention());

        tokio::task::spawn_blocking(move || -> BackupResult<Vec<PathBuf>> {
            let mut deleted = Vec::new();
            for manager in managers {
                deleted.extend(manager.enforce()?);
            }
            Ok(deleted)
        })
        .await?
    }

    /// Artifacts `prune` would delete, without deleting them
    pub async fn prune_candidates(&self) -> BackupResult<Vec<BackupArtifact>> {
        let mut managers = vec![self.archive_retention()];
        managers.extend(self.snapshot_retention());

        tokio::task::spawn_blocking(move || -> BackupResult<Vec<BackupArtifact>> {
            let mut candidates = Vec::new();
            for manager in managers {
                let window = manager.window();
                candidates.extend(manager.list()?.into_iter().skip(window));
            }
            Ok(candidates)
        })
        .await?
    }

    async fn snapshot_locked(&self) -> BackupResult<BackupArtifact> {
        let codec = self.codec.clone();
        let dir = self.paths.backups_dir();
        let now = self.clock.now();
        let path = tokio::task::spawn_blocking(move || codec.write_snapshot(&dir, now)).await??;
        let artifact = BackupArtifact::from_path(&path, ArtifactKind::JsonSnapshot)?
            .ok_or_else(|| BackupError::backup_not_found(path.display().to_string()))?;

        if let Some(manager) = self.snapshot_retention() {
            self.enforce_logged(manager).await;
        }
        Ok(artifact)
    }

    fn archive_retention(&self) -> RetentionManager {
        RetentionManager::new(
            self.paths.backups_dir(),
            ArtifactKind::DumpArchive,
            self.retention.archive_window,
        )
    }

    fn snapshot_retention(&self) -> Option<RetentionManager> {
        self.retention.snapshot_window.map(|window| {
            RetentionManager::new(self.paths.backups_dir(), ArtifactKind::JsonSnapshot, window)
        })
    }

    /// The new backup already exists, so a retention failure is only logged
    async fn enforce_logged(&self, manager: RetentionManager) {
        let result = tokio::task::spawn_blocking(move || manager.enforce()).await;
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("Retention failed: {}", e),
            Err(e) => error!("Retention task failed: {}", e),
        }
    }
}

#[async_trait]
impl ScheduledJob for BackupGateway {
    async fn run(&self) -> BackupResult<BackupArtifact> {
        self.run_scheduled_backup().await
    }
}

impl std::fmt::Debug for BackupGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupGateway")
            .field("paths", &self.paths)
            .field("strategy", &self.strategy)
            .field("retention", &self.retention)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

async fn stream_file<W>(path: &Path, writer: &mut W) -> BackupResult<u64>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut file = tokio::fs::File::open(path).await?;
    let bytes = tokio::io::copy(&mut file, writer)
        .await
        .map_err(|e| BackupError::Archive(format!("Failed to stream archive: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| BackupError::Archive(format!("Failed to stream archive: {}", e)))?;
    Ok(bytes)
}
