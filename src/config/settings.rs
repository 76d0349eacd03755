//! Settings for clinic-backup
//!
//! Holds the backup schedule, which strategy the schedule runs, retention
//! windows, and how the native dump tools are invoked. Settings are read
//! once at process start; the scheduler never writes them back.

use serde::{Deserialize, Serialize};

use super::paths::ClinicPaths;
use crate::backup::{BackupStrategy, ScheduleSpec};
use crate::error::BackupError;

/// Retention windows per artifact kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSettings {
    /// Number of dump archives to keep
    #[serde(default = "default_archive_window")]
    pub archive_window: usize,

    /// Number of JSON snapshots to keep (`None` keeps them all)
    #[serde(default)]
    pub snapshot_window: Option<usize>,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            archive_window: default_archive_window(),
            snapshot_window: None,
        }
    }
}

/// External dump/restore tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Executable producing a dump directory
    #[serde(default = "default_dump_program")]
    pub dump_program: String,

    /// Executable loading a dump directory
    #[serde(default = "default_restore_program")]
    pub restore_program: String,

    /// Deadline for a single tool invocation, in seconds (`None` waits forever)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: Option<u64>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            dump_program: default_dump_program(),
            restore_program: default_restore_program(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Settings for clinic-backup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// When the scheduled backup fires
    #[serde(default)]
    pub backup_schedule: ScheduleSpec,

    /// Which strategy the schedule (and a manual "run now") uses
    #[serde(default)]
    pub scheduled_strategy: BackupStrategy,

    /// Retention policy
    #[serde(default)]
    pub retention: RetentionSettings,

    /// Native dump tool invocation
    #[serde(default)]
    pub tools: ToolSettings,

    /// Name of the environment variable holding the datastore connection string
    #[serde(default = "default_datastore_uri_env")]
    pub datastore_uri_env: String,
}

fn default_schema_version() -> u32 {
    1
}

fn default_archive_window() -> usize {
    7
}

fn default_dump_program() -> String {
    "mongodump".to_string()
}

fn default_restore_program() -> String {
    "mongorestore".to_string()
}

fn default_timeout_secs() -> Option<u64> {
    Some(3600)
}

fn default_datastore_uri_env() -> String {
    "MONGO_URI".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            backup_schedule: ScheduleSpec::default(),
            scheduled_strategy: BackupStrategy::default(),
            retention: RetentionSettings::default(),
            tools: ToolSettings::default(),
            datastore_uri_env: default_datastore_uri_env(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or fall back to defaults if the file doesn't exist
    pub fn load_or_create(paths: &ClinicPaths) -> Result<Self, BackupError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path).map_err(|e| {
                BackupError::FileSystem(format!("Failed to read settings file: {}", e))
            })?;

            let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
                BackupError::Config(format!("Failed to parse settings file: {}", e))
            })?;

            Ok(settings)
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &ClinicPaths) -> Result<(), BackupError> {
        paths.ensure_directories()?;

        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            BackupError::Config(format!("Failed to serialize settings: {}", e))
        })?;

        std::fs::write(paths.settings_file(), contents).map_err(|e| {
            BackupError::FileSystem(format!("Failed to write settings file: {}", e))
        })?;

        Ok(())
    }

    /// Read the datastore connection string from the environment
    ///
    /// A missing value is a misconfiguration, not a runtime failure.
    pub fn datastore_uri(&self) -> Result<String, BackupError> {
        match std::env::var(&self.datastore_uri_env) {
            Ok(uri) if !uri.trim().is_empty() => Ok(uri),
            _ => Err(BackupError::Config(format!(
                "Datastore connection string is not set; export {}",
                self.datastore_uri_env
            ))),
        }
    }

    /// Tool deadline as a Duration
    pub fn tool_timeout(&self) -> Option<std::time::Duration> {
        self.tools.timeout_secs.map(std::time::Duration::from_secs)
    }
}
