//! Backup system for clinic-backup
//!
//! Provides scheduled backups of the clinic datastore, retention, exports and
//! restore.
//!
//! # Architecture
//!
//! - `BackupScheduler`: fires a `ScheduledJob` on a daily cron-style schedule
//! - `DumpPipeline`: native dump into a scratch directory, zipped by
//!   `ArchiveBuilder`
//! - `SnapshotCodec`: whole-datastore JSON snapshots and additive import
//! - `RestoreOrchestrator`: validated, destructive restore from a snapshot
//! - `RetentionManager`: keeps the newest N artifacts of one kind
//! - `BackupGateway`: the entry points a caller uses, serialized by one lock
//!
//! # Backup Formats
//!
//! - `backup-<epoch-millis>.zip`: zipped dump directory
//! - `backup-<YYYY-MM-DDTHH-MM-SS-mmmZ>.json`: snapshot with a `timestamp`
//!   and one array per collection key
//!
//! # Retention Policy
//!
//! By default, the system keeps the 7 newest dump archives and every JSON
//! snapshot. Recency is the file modification time.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use clinic_backup::backup::{BackupGateway, BackupScheduler, DumpTool, SystemClock, SystemProcessRunner};
//! use clinic_backup::config::{ClinicPaths, Settings};
//! use clinic_backup::storage::JsonFileDatastore;
//!
//! let paths = ClinicPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let runner = Arc::new(SystemProcessRunner::new(settings.tool_timeout()));
//! let tool = DumpTool::new(runner, &settings.tools, Some(settings.datastore_uri()?));
//! let store = Arc::new(JsonFileDatastore::new(paths.data_dir()));
//! let gateway = Arc::new(BackupGateway::new(paths, &settings, store, tool, Arc::new(SystemClock)));
//!
//! let mut scheduler = BackupScheduler::new(settings.backup_schedule, Arc::new(SystemClock));
//! scheduler.start(gateway.clone())?;
//! ```

mod archive;
mod clock;
mod gateway;
mod pipeline;
mod process;
mod restore;
mod retention;
mod schedule;
mod scheduler;
mod snapshot;

pub use archive::ArchiveBuilder;
pub use clock::{Clock, SystemClock, TokioClock};
pub use gateway::{BackupGateway, ExportedArchive};
pub use pipeline::{BackupStrategy, DumpPipeline, TempDumpDir};
pub use process::{DumpTool, ProcessOutput, ProcessRunner, SystemProcessRunner};
pub use restore::{RestoreOrchestrator, RestoreReport, ValidationResult};
pub use retention::{list_artifacts, RetentionManager};
pub use schedule::ScheduleSpec;
pub use scheduler::{BackupScheduler, ScheduledJob, SchedulerStats};
pub use snapshot::{ImportSummary, SnapshotCodec, SnapshotManifest};
