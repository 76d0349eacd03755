//! Archive builder for the dump-based backup path
//!
//! Streams a dump directory into a single deflate-compressed zip. The archive
//! is written to `<dest>.partial` and only renamed into place once the zip is
//! finished and synced, so callers never see a half-written archive.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{BackupError, BackupResult};

/// Highest deflate level
pub const MAX_COMPRESSION_LEVEL: i64 = 9;

/// Builds zip archives from directory trees
#[derive(Debug, Clone, Copy)]
pub struct ArchiveBuilder {
    compression_level: i64,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    /// Builder using maximum compression
    pub fn new() -> Self {
        Self {
            compression_level: MAX_COMPRESSION_LEVEL,
        }
    }

    /// Zip the contents of `source_dir` (not the directory itself) into `dest`
    ///
    /// Returns the archive size in bytes.
    pub fn build(&self, source_dir: &Path, dest: &Path) -> BackupResult<u64> {
        if !source_dir.is_dir() {
            return Err(BackupError::Archive(format!(
                "Dump directory does not exist: {}",
                source_dir.display()
            )));
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BackupError::FileSystem(format!(
                    "Failed to create archive directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let partial = partial_path(dest);
        if let Err(err) = self.write_archive(source_dir, &partial) {
            discard_partial(&partial);
            return Err(err);
        }

        if let Err(e) = fs::rename(&partial, dest) {
            discard_partial(&partial);
            return Err(BackupError::Archive(format!(
                "Failed to move archive into place: {}",
                e
            )));
        }

        let size = fs::metadata(dest)?.len();
        debug!("Wrote archive {} ({} bytes)", dest.display(), size);
        Ok(size)
    }

    fn write_archive(&self, source_dir: &Path, partial: &Path) -> BackupResult<()> {
        let file = File::create(partial).map_err(|e| {
            BackupError::Archive(format!("Failed to create {}: {}", partial.display(), e))
        })?;
        let mut zip = ZipWriter::new(BufWriter::new(file));

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(self.compression_level));

        for entry in WalkDir::new(source_dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                BackupError::Archive(format!("Failed to walk dump directory: {}", e))
            })?;
            let name = entry_name(source_dir, entry.path())?;

            if entry.file_type().is_dir() {
                zip.add_directory(name, options)?;
            } else if entry.file_type().is_file() {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                zip.start_file(name, options.large_file(size >= u32::MAX as u64))?;
                let mut source = File::open(entry.path())?;
                io::copy(&mut source, &mut zip).map_err(|e| {
                    BackupError::Archive(format!(
                        "Failed to compress {}: {}",
                        entry.path().display(),
                        e
                    ))
                })?;
            } else {
                debug!("Skipping non-regular entry {}", entry.path().display());
            }
        }

        let writer = zip.finish()?;
        let file = writer
            .into_inner()
            .map_err(|e| BackupError::Archive(format!("Failed to flush archive: {}", e)))?;
        file.sync_all()?;
        Ok(())
    }
}

/// Path the archive is written to before it is complete
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn discard_partial(partial: &Path) {
    if let Err(e) = fs::remove_file(partial) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove partial archive {}: {}", partial.display(), e);
        }
    }
}

/// Zip entry names always use `/`, whatever the host separator
fn entry_name(root: &Path, path: &Path) -> BackupResult<String> {
    let relative = path.strip_prefix(root).map_err(|e| {
        BackupError::Archive(format!("Entry {} outside dump directory: {}", path.display(), e))
    })?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}
