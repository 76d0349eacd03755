//! Dump-to-archive pipeline
//!
//! Runs the native dump tool into a scratch directory, zips the result and
//! removes the scratch directory whether or not anything failed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BackupError, BackupResult};
use crate::models::artifact::{archive_file_name, next_free_path, temp_dump_dir_name};
use crate::models::{ArtifactKind, BackupArtifact};

use super::archive::ArchiveBuilder;
use super::clock::Clock;
use super::process::DumpTool;

/// How a scheduled backup captures the datastore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStrategy {
    /// Native dump, zipped into `backup-<millis>.zip`
    #[default]
    ArchiveDump,
    /// Every collection written to `backup-<iso>.json`
    JsonSnapshot,
}

impl BackupStrategy {
    /// Kind of artifact this strategy produces
    pub fn artifact_kind(&self) -> ArtifactKind {
        match self {
            Self::ArchiveDump => ArtifactKind::DumpArchive,
            Self::JsonSnapshot => ArtifactKind::JsonSnapshot,
        }
    }
}

impl std::fmt::Display for BackupStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ArchiveDump => write!(f, "archive_dump"),
            Self::JsonSnapshot => write!(f, "json_snapshot"),
        }
    }
}

/// Scratch directory removed when dropped
#[derive(Debug)]
pub struct TempDumpDir {
    path: PathBuf,
}

impl TempDumpDir {
    pub fn create(path: PathBuf) -> BackupResult<Self> {
        fs::create_dir_all(&path).map_err(|e| {
            BackupError::FileSystem(format!(
                "Failed to create dump directory {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDumpDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(
                    "Failed to remove dump directory {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

/// Dump, archive, clean up
#[derive(Clone)]
pub struct DumpPipeline {
    tool: DumpTool,
    builder: ArchiveBuilder,
    clock: Arc<dyn Clock>,
}

impl DumpPipeline {
    pub fn new(tool: DumpTool, clock: Arc<dyn Clock>) -> Self {
        Self {
            tool,
            builder: ArchiveBuilder::new(),
            clock,
        }
    }

    pub fn tool(&self) -> &DumpTool {
        &self.tool
    }

    /// Produce `backup-<millis>.zip` in `dir`
    ///
    /// Callers must serialize calls that share `dir`; the free-name probe is
    /// not atomic with the final rename. Only the dump itself runs on the
    /// calling task.
    pub async fn produce_archive(&self, dir: &Path) -> BackupResult<BackupArtifact> {
        let dir = dir.to_path_buf();
        let now = self.clock.now();
        let (archive_path, temp) =
            tokio::task::spawn_blocking(move || -> BackupResult<(PathBuf, TempDumpDir)> {
                fs::create_dir_all(&dir)?;
                let (stamp, archive_path) =
                    next_free_path(&dir, now, |ts| archive_file_name(ts.timestamp_millis()));
                let temp =
                    TempDumpDir::create(dir.join(temp_dump_dir_name(stamp.timestamp_millis())))?;
                Ok((archive_path, temp))
            })
            .await??;

        if let Err(err) = self.tool.dump(temp.path()).await {
            discard(temp).await;
            return Err(err);
        }

        let builder = self.builder;
        tokio::task::spawn_blocking(move || -> BackupResult<BackupArtifact> {
            let built = builder.build(temp.path(), &archive_path);
            drop(temp);
            let size = built?;

            info!("Created backup {} ({} bytes)", archive_path.display(), size);
            BackupArtifact::from_path(&archive_path, ArtifactKind::DumpArchive)?
                .ok_or_else(|| BackupError::backup_not_found(archive_path.display().to_string()))
        })
        .await?
    }
}

/// Remove a dump directory off the async workers
async fn discard(temp: TempDumpDir) {
    if let Err(e) = tokio::task::spawn_blocking(move || drop(temp)).await {
        warn!("Dump directory cleanup task failed: {}", e);
    }
}

impl std::fmt::Debug for DumpPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpPipeline")
            .field("tool", &self.tool)
            .field("builder", &self.builder)
            .finish_non_exhaustive()
    }
}
