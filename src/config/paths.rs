//! Path management for clinic-backup
//!
//! Every directory the backup subsystem writes to hangs off a single
//! application root.
//!
//! ## Path Resolution Order
//!
//! 1. `CLINIC_BACKUP_HOME` environment variable (if set)
//! 2. The platform data directory for `clinic-backup`

use std::path::{Component, Path, PathBuf};

use directories::ProjectDirs;

use crate::error::BackupError;

/// Environment variable overriding the application root
pub const HOME_ENV_VAR: &str = "CLINIC_BACKUP_HOME";

/// Manages all paths used by clinic-backup
#[derive(Debug, Clone)]
pub struct ClinicPaths {
    /// Application root
    base_dir: PathBuf,
}

impl ClinicPaths {
    /// Create a new ClinicPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> Result<Self, BackupError> {
        let base_dir = if let Ok(custom) = std::env::var(HOME_ENV_VAR) {
            PathBuf::from(custom)
        } else {
            ProjectDirs::from("", "", "clinic-backup")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or_else(|| {
                    BackupError::Config(format!(
                        "Could not determine a data directory; set {}",
                        HOME_ENV_VAR
                    ))
                })?
        };

        Ok(Self { base_dir })
    }

    /// Create ClinicPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the application root
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Directory holding dump archives and JSON snapshots
    pub fn backups_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    /// Directory holding export-only snapshots and transient download archives
    pub fn exports_dir(&self) -> PathBuf {
        self.base_dir.join("exports")
    }

    /// Directory holding the JSON-file datastore
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), BackupError> {
        for dir in [
            self.base_dir.clone(),
            self.backups_dir(),
            self.exports_dir(),
            self.data_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                BackupError::FileSystem(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Check if the settings file has been written
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }

    /// Resolve a caller-supplied path and confine it to the backups directory
    ///
    /// Relative paths are taken relative to the backups directory. The path
    /// is checked lexically first, then must exist, then its canonical form is
    /// checked again so a symlink cannot lead out of the root.
    pub fn confine_to_backups(&self, candidate: &Path) -> Result<PathBuf, BackupError> {
        confine_path(&self.backups_dir(), candidate)
    }
}

/// Confine `candidate` to `root`. See [`ClinicPaths::confine_to_backups`].
pub fn confine_path(root: &Path, candidate: &Path) -> Result<PathBuf, BackupError> {
    let root = normalize_lexically(&absolute(root)?);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let resolved = normalize_lexically(&joined);

    if resolved == root || !resolved.starts_with(&root) {
        return Err(BackupError::PathOutsideRoot(candidate.display().to_string()));
    }

    if !resolved.exists() {
        return Err(BackupError::backup_not_found(candidate.display().to_string()));
    }

    let canonical_root = root.canonicalize()?;
    let canonical = resolved.canonicalize()?;
    if !canonical.starts_with(&canonical_root) {
        return Err(BackupError::PathOutsideRoot(candidate.display().to_string()));
    }

    Ok(canonical)
}

fn absolute(path: &Path) -> Result<PathBuf, BackupError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Resolve `.` and `..` without touching the file system
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
