//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the backup gateway.

pub mod backup;
pub mod snapshot;

pub use backup::{handle_backup_command, BackupCommands};
pub use snapshot::{handle_snapshot_command, SnapshotCommands};

use std::sync::Arc;

use crate::backup::{BackupGateway, DumpTool, SystemClock, SystemProcessRunner};
use crate::config::{ClinicPaths, Settings};
use crate::error::BackupResult;
use crate::storage::JsonFileDatastore;

/// Wire the gateway to the JSON-file datastore and the system dump tools
///
/// With `require_uri` a missing connection string fails here, before any
/// file is touched.
pub fn build_gateway(
    paths: &ClinicPaths,
    settings: &Settings,
    require_uri: bool,
) -> BackupResult<Arc<BackupGateway>> {
    let uri = if require_uri {
        Some(settings.datastore_uri()?)
    } else {
        settings.datastore_uri().ok()
    };

    let runner = Arc::new(SystemProcessRunner::new(settings.tool_timeout()));
    let tool = DumpTool::new(runner, &settings.tools, uri);
    let datastore = Arc::new(JsonFileDatastore::new(paths.data_dir()));

    Ok(Arc::new(BackupGateway::new(
        paths.clone(),
        settings,
        datastore,
        tool,
        Arc::new(SystemClock),
    )))
}
