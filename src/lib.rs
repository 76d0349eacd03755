//! clinic-backup - Backup and restore for the clinic datastore
//!
//! This library provides scheduled backups of the clinic management
//! datastore in two forms: zipped native dumps and JSON snapshots. It covers
//! retention, exports, additive import and validated destructive restore.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Application root, path confinement and settings
//! - `error`: Custom error types
//! - `models`: Collections, records and backup artifacts
//! - `storage`: The datastore seam and its implementations
//! - `backup`: Scheduler, archive, snapshot, retention, restore and gateway
//! - `cli`: Command handlers for the `clinic-backup` binary
//!
//! # Example
//!
//! ```rust,ignore
//! use clinic_backup::config::{ClinicPaths, Settings};
//!
//! let paths = ClinicPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let gateway = clinic_backup::cli::build_gateway(&paths, &settings, true)?;
//! let artifact = gateway.run_scheduled_backup().await?;
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use error::{BackupError, BackupResult};
