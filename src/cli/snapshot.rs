//! Snapshot CLI commands
//!
//! Implements CLI commands for JSON snapshots: create, export, additive
//! import and destructive restore.

use clap::Subcommand;
use std::path::PathBuf;

use crate::backup::{BackupGateway, RestoreOrchestrator, SnapshotManifest};
use crate::error::{BackupError, BackupResult};
use crate::models::ArtifactKind;

use super::backup::format_size;

/// Snapshot subcommands
#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// Write a JSON snapshot into the backups directory
    Create,

    /// Write an export-only JSON snapshot into the exports directory
    Export,

    /// Append a snapshot file's records to the datastore
    Import {
        /// Snapshot file
        file: PathBuf,
    },

    /// Show what a snapshot in the backups directory contains
    Info {
        /// Snapshot filename or path (use 'latest' for most recent)
        snapshot: String,
    },

    /// Replace users, orders, products, payments and order items from a snapshot
    Restore {
        /// Snapshot filename or path (use 'latest' for most recent)
        snapshot: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

/// Handle a snapshot command
pub async fn handle_snapshot_command(
    gateway: &BackupGateway,
    cmd: SnapshotCommands,
) -> BackupResult<()> {
    match cmd {
        SnapshotCommands::Create => {
            println!("Creating snapshot...");
            let artifact = gateway.create_snapshot().await?;
            println!("Snapshot created: {}", artifact.file_name());
            println!("Location: {}", artifact.location.display());
            println!("Size: {}", format_size(artifact.size_bytes));
        }

        SnapshotCommands::Export => {
            let path = gateway.export_snapshot().await?;
            println!("Export written to {}", path.display());
        }

        SnapshotCommands::Import { file } => {
            let manifest =
                tokio::task::spawn_blocking(move || SnapshotManifest::read_from_file(&file))
                    .await??;
            let summary = gateway.import_snapshot(manifest).await?;
            println!("Import complete!");
            println!("Inserted {} record(s): {}", summary.total(), summary);
        }

        SnapshotCommands::Info { snapshot } => {
            let path = resolve_snapshot_path(gateway, &snapshot).await?;
            let manifest = gateway.inspect_snapshot(&path).await?;
            print_snapshot_details(&path, &manifest);
        }

        SnapshotCommands::Restore { snapshot, force } => {
            let path = resolve_snapshot_path(gateway, &snapshot).await?;
            let manifest = gateway.inspect_snapshot(&path).await?;
            print_snapshot_details(&path, &manifest);
            RestoreOrchestrator::validate(&manifest)?;

            if !force {
                println!(
                    "WARNING: This will overwrite users, orders, products, payments and order items!"
                );
                println!("To proceed, run again with --force flag:");
                println!("  clinic-backup snapshot restore {} --force", snapshot);
                return Ok(());
            }

            // Create a snapshot of current data before restoring
            println!("Creating snapshot of current data before restore...");
            let pre_restore = gateway.create_snapshot().await?;
            println!("Pre-restore snapshot saved: {}", pre_restore.file_name());
            println!();

            println!("Restoring from snapshot...");
            let report = gateway.restore_manifest(manifest).await?;

            println!("Restore complete!");
            println!("{}", report.summary());
        }
    }

    Ok(())
}

fn print_snapshot_details(path: &std::path::Path, manifest: &SnapshotManifest) {
    let validation = RestoreOrchestrator::inspect(manifest);

    println!("Snapshot Details");
    println!("================");
    println!("File: {}", path.display());
    match validation.snapshot_date {
        Some(date) => println!("Created: {}", date.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("Created: unknown"),
    }
    println!();
    println!("Contents:");
    for (collection, count) in &validation.record_counts {
        println!("  {:<14} {}", collection.key(), count);
    }
    println!();
    println!("Status: {}", validation.summary());
    println!();
}

/// Resolve a snapshot identifier to a path under the backups directory
///
/// The gateway still confines whatever this returns.
async fn resolve_snapshot_path(gateway: &BackupGateway, snapshot: &str) -> BackupResult<PathBuf> {
    // Handle "latest" keyword
    if snapshot.eq_ignore_ascii_case("latest") {
        return gateway
            .list_backups()
            .await?
            .into_iter()
            .find(|b| b.kind == ArtifactKind::JsonSnapshot)
            .map(|b| b.location)
            .ok_or_else(|| BackupError::backup_not_found("latest"));
    }

    // Try adding the snapshot extension
    let backups_dir = gateway.paths().backups_dir();
    let path = PathBuf::from(snapshot);
    if !path.is_absolute() && !backups_dir.join(&path).exists() {
        let with_ext = backups_dir.join(format!("{}.json", snapshot));
        if with_ext.exists() {
            return Ok(with_ext);
        }
    }

    Ok(path)
}
