//! Configuration module for clinic-backup
//!
//! This module provides configuration management including:
//! - Application root and backup/export directory resolution
//! - Persisted settings (schedule, strategy, retention, dump tools)

pub mod paths;
pub mod settings;

pub use paths::ClinicPaths;
pub use settings::{RetentionSettings, Settings, ToolSettings};
