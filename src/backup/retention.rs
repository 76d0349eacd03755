//! Retention of backup artifacts
//!
//! Keeps the newest N artifacts of one kind in a directory and deletes the
//! rest. Recency is the file modification time; the file name only breaks
//! ties.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{BackupError, BackupResult};
use crate::models::{ArtifactKind, BackupArtifact};

/// Enforces a newest-N window over one kind of artifact in one directory
#[derive(Debug, Clone)]
pub struct RetentionManager {
    dir: PathBuf,
    kind: ArtifactKind,
    window: usize,
}

impl RetentionManager {
    pub fn new(dir: impl Into<PathBuf>, kind: ArtifactKind, window: usize) -> Self {
        Self {
            dir: dir.into(),
            kind,
            window,
        }
    }

    /// Number of artifacts kept
    pub fn window(&self) -> usize {
        self.window
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Matching artifacts, newest first
    ///
    /// A directory that does not exist yet holds no artifacts.
    pub fn list(&self) -> BackupResult<Vec<BackupArtifact>> {
        list_artifacts(&self.dir, self.kind)
    }

    /// Delete every matching artifact beyond the newest `window`
    ///
    /// Returns the deleted paths. Files that vanish between listing and
    /// deletion are skipped.
    pub fn enforce(&self) -> BackupResult<Vec<PathBuf>> {
        let artifacts = self.list()?;
        let mut deleted = Vec::new();

        for artifact in artifacts.into_iter().skip(self.window) {
            match fs::remove_file(&artifact.location) {
                Ok(()) => {
                    info!("Removed old backup {}", artifact.file_name());
                    deleted.push(artifact.location);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!("Backup {} already removed", artifact.file_name());
                }
                Err(e) => {
                    return Err(BackupError::FileSystem(format!(
                        "Failed to remove {}: {}",
                        artifact.location.display(),
                        e
                    )));
                }
            }
        }

        Ok(deleted)
    }
}

/// Artifacts of `kind` in `dir`, sorted newest first
pub fn list_artifacts(dir: &Path, kind: ArtifactKind) -> BackupResult<Vec<BackupArtifact>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(BackupError::FileSystem(format!(
                "Failed to read {}: {}",
                dir.display(),
                e
            )))
        }
    };

    let mut artifacts = Vec::new();
    for entry in entries {
        let entry = entry?;
        match BackupArtifact::from_path(&entry.path(), kind) {
            Ok(Some(artifact)) => artifacts.push(artifact),
            Ok(None) => {}
            // Removed by a concurrent prune between read_dir and stat
            Err(BackupError::FileSystem(_)) if !entry.path().exists() => {}
            Err(e) => return Err(e),
        }
    }

    sort_newest_first(&mut artifacts);
    Ok(artifacts)
}

/// Newest modification time first, then identifier descending
pub fn sort_newest_first(artifacts: &mut [BackupArtifact]) {
    artifacts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.identifier.cmp(&a.identifier))
    });
}
