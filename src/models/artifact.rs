//! Backup artifacts and their file naming
//!
//! No metadata database records a backup's existence. Artifacts are derived
//! from directory listings, so the file name carries the identity and the
//! file's modification time carries the ordering.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackupResult;

const BACKUP_PREFIX: &str = "backup-";
const EXPORT_PREFIX: &str = "export-";
const TEMP_PREFIX: &str = "temp-";

/// Which backup strategy produced an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A zip archive of a native dump directory
    DumpArchive,
    /// A pretty-printed JSON snapshot of every collection
    JsonSnapshot,
}

impl ArtifactKind {
    /// File extension used by this kind
    pub fn extension(&self) -> &'static str {
        match self {
            Self::DumpArchive => "zip",
            Self::JsonSnapshot => "json",
        }
    }

    /// Whether a file name follows this kind's naming convention
    pub fn matches_file_name(&self, file_name: &str) -> bool {
        let Some(stem) = file_name
            .strip_prefix(BACKUP_PREFIX)
            .and_then(|rest| rest.strip_suffix(&format!(".{}", self.extension())))
        else {
            return false;
        };

        match self {
            Self::DumpArchive => !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit()),
            Self::JsonSnapshot => !stem.is_empty(),
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::DumpArchive => "dump archive",
            Self::JsonSnapshot => "json snapshot",
        }
    }
}

/// A backup file on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupArtifact {
    /// File stem, e.g. `backup-1718000000000`
    pub identifier: String,
    /// Strategy that produced the artifact
    pub kind: ArtifactKind,
    /// Full path to the artifact
    pub location: PathBuf,
    /// File modification time
    pub created_at: DateTime<Utc>,
    /// Size in bytes
    pub size_bytes: u64,
}

impl BackupArtifact {
    /// Build artifact metadata from a file, or `None` if the file name does
    /// not belong to `kind`
    pub fn from_path(path: &Path, kind: ArtifactKind) -> BackupResult<Option<Self>> {
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            return Ok(None);
        };
        if !kind.matches_file_name(&file_name) {
            return Ok(None);
        }

        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Ok(None);
        }
        let created_at: DateTime<Utc> = metadata.modified()?.into();
        let identifier = file_name
            .strip_suffix(&format!(".{}", kind.extension()))
            .unwrap_or(&file_name)
            .to_string();

        Ok(Some(Self {
            identifier,
            kind,
            location: path.to_path_buf(),
            created_at,
            size_bytes: metadata.len(),
        }))
    }

    /// File name of the artifact
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.identifier, self.kind.extension())
    }
}

/// `backup-<epoch-millis>.zip`
pub fn archive_file_name(epoch_millis: i64) -> String {
    format!("{}{}.zip", BACKUP_PREFIX, epoch_millis)
}

/// `temp-<epoch-millis>`, the scratch directory a dump is written into
pub fn temp_dump_dir_name(epoch_millis: i64) -> String {
    format!("{}{}", TEMP_PREFIX, epoch_millis)
}

/// `backup-<iso-timestamp-with-dashes>.json`
pub fn snapshot_file_name(timestamp: DateTime<Utc>) -> String {
    format!("{}{}.json", BACKUP_PREFIX, iso_dashed(timestamp))
}

/// `export-<iso-timestamp-with-dashes>.json`
pub fn export_file_name(timestamp: DateTime<Utc>) -> String {
    format!("{}{}.json", EXPORT_PREFIX, iso_dashed(timestamp))
}

/// First timestamp at or after `start` whose name is free in `dir`
///
/// Names have millisecond resolution, so two artifacts created within the
/// same millisecond would collide. The timestamp is bumped by 1 ms until
/// `name_for` yields a path that does not exist yet.
pub fn next_free_path<F>(dir: &Path, start: DateTime<Utc>, name_for: F) -> (DateTime<Utc>, PathBuf)
where
    F: Fn(DateTime<Utc>) -> String,
{
    let mut timestamp = start;
    loop {
        let candidate = dir.join(name_for(timestamp));
        if !candidate.exists() {
            return (timestamp, candidate);
        }
        timestamp += chrono::Duration::milliseconds(1);
    }
}

/// ISO-8601 in UTC with millisecond precision, `:` and `.` replaced by `-`
///
/// `2024-03-05T14:07:09.123Z` becomes `2024-03-05T14-07-09-123Z`.
pub fn iso_dashed(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string()
}
