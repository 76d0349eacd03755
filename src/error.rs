//! Error types for clinic-backup
//!
//! This module defines the error taxonomy for the backup subsystem using
//! thiserror. Route-layer callers use [`BackupError::is_client_error`] to pick
//! between a 4xx and a 5xx response, and [`BackupError::user_message`] for the
//! body.

use thiserror::Error;

/// The main error type for backup and restore operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Configuration errors, including a missing connection string
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dump/restore executable missing, exited nonzero, or ran past its deadline
    #[error("External tool failure: {0}")]
    ExternalTool(String),

    /// Compression or archive stream errors
    #[error("Archive error: {0}")]
    Archive(String),

    /// File system errors (missing path, permissions, disk full)
    #[error("File system error: {0}")]
    FileSystem(String),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Malformed or incomplete snapshot manifests and bad arguments
    #[error("Validation error: {0}")]
    Validation(String),

    /// A named backup, export, or path does not exist
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// A caller-supplied path resolves outside the backups root
    #[error("Path is outside the backups directory: {0}")]
    PathOutsideRoot(String),

    /// The datastore collaborator failed
    #[error("Datastore error: {0}")]
    Datastore(String),

    /// A non-transactional restore stopped partway through
    #[error(
        "Restore failed on '{failed}': {reason} (restored: [{}], not attempted: [{}])",
        .restored.join(", "),
        .not_attempted.join(", ")
    )]
    PartialRestore {
        restored: Vec<String>,
        failed: String,
        reason: String,
        not_attempted: Vec<String>,
    },

    /// A background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

impl BackupError {
    /// Create a "not found" error for a backup artifact or path
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Whether the caller is at fault (4xx) rather than the subsystem (5xx)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::NotFound { .. } | Self::PathOutsideRoot(_)
        )
    }

    /// A short message safe to hand back to a caller
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(_) => "Backup subsystem is misconfigured".to_string(),
            Self::ExternalTool(_) => "Error running the database dump tool".to_string(),
            Self::Archive(_) => "Error creating archive".to_string(),
            Self::FileSystem(_) | Self::Json(_) | Self::Task(_) => {
                "Error accessing backup files".to_string()
            }
            Self::Datastore(_) => "Error accessing the datastore".to_string(),
            Self::PartialRestore { failed, .. } => {
                format!("Restore stopped at collection '{}'", failed)
            }
            Self::Validation(_) | Self::NotFound { .. } | Self::PathOutsideRoot(_) => {
                self.to_string()
            }
        }
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<zip::result::ZipError> for BackupError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

impl From<tokio::task::JoinError> for BackupError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Result type alias for backup operations
pub type BackupResult<T> = Result<T, BackupError>;
