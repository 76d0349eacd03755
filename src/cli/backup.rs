//! Backup CLI commands
//!
//! Implements CLI commands for dump archives and retention.

use clap::Subcommand;
use std::path::PathBuf;

use crate::backup::{BackupGateway, BackupStrategy};
use crate::config::Settings;
use crate::error::{BackupError, BackupResult};
use crate::models::ArtifactKind;

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Run the scheduled backup now
    Run,

    /// List all available backups
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Dump the datastore into a zip archive at OUTPUT
    Export {
        /// Where to write the archive
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Load a dump directory from the backups directory (drops existing data)
    Import {
        /// Dump directory, relative to the backups directory
        dir: PathBuf,
    },

    /// Delete old backups according to retention policy
    Prune {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

impl BackupCommands {
    /// Whether the command runs the native dump tools
    pub fn uses_dump_tool(&self, strategy: BackupStrategy) -> bool {
        match self {
            Self::Run => strategy == BackupStrategy::ArchiveDump,
            Self::Export { .. } | Self::Import { .. } => true,
            Self::List { .. } | Self::Prune { .. } => false,
        }
    }
}

/// Handle a backup command
pub async fn handle_backup_command(
    gateway: &BackupGateway,
    settings: &Settings,
    cmd: BackupCommands,
) -> BackupResult<()> {
    match cmd {
        BackupCommands::Run => {
            println!("Running {} backup...", settings.scheduled_strategy);
            let artifact = gateway.run_scheduled_backup().await?;
            println!("Backup created: {}", artifact.file_name());
            println!("Location: {}", artifact.location.display());
            println!("Size: {}", format_size(artifact.size_bytes));
        }

        BackupCommands::List { verbose } => {
            let backups = gateway.list_backups().await?;

            if backups.is_empty() {
                println!("No backups found.");
                println!("Create one with: clinic-backup backup run");
                return Ok(());
            }

            println!("Available Backups");
            println!("=================");
            println!();

            for (i, backup) in backups.iter().enumerate() {
                let age = chrono::Utc::now().signed_duration_since(backup.created_at);
                let age_str = format_duration(age);

                if verbose {
                    println!(
                        "{}. {}\n   Kind: {}\n   Created: {}\n   Size: {}\n   Age: {}\n",
                        i + 1,
                        backup.file_name(),
                        backup.kind.label(),
                        backup.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                        format_size(backup.size_bytes),
                        age_str,
                    );
                } else {
                    println!(
                        "  {}. {} ({} ago, {})",
                        i + 1,
                        backup.file_name(),
                        age_str,
                        format_size(backup.size_bytes),
                    );
                }
            }

            let archives = backups
                .iter()
                .filter(|b| b.kind == ArtifactKind::DumpArchive)
                .count();
            println!();
            println!(
                "Total: {} backup(s) ({} archive(s), {} snapshot(s))",
                backups.len(),
                archives,
                backups.len() - archives
            );
        }

        BackupCommands::Export { output } => {
            println!("Exporting datastore...");
            let mut file = tokio::fs::File::create(&output).await.map_err(|e| {
                BackupError::FileSystem(format!("Failed to create {}: {}", output.display(), e))
            })?;

            match gateway.export_backup(&mut file).await {
                Ok(exported) => {
                    println!("Archive {} written to {}", exported.file_name, output.display());
                    println!("Size: {}", format_size(exported.bytes));
                }
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&output).await;
                    return Err(e);
                }
            }
        }

        BackupCommands::Import { dir } => {
            println!("Importing dump {}...", dir.display());
            gateway.import_backup(&dir).await?;
            println!("Import complete!");
        }

        BackupCommands::Prune { force } => {
            let backups = gateway.list_backups().await?;
            let candidates = gateway.prune_candidates().await?;
            let retention = &settings.retention;
            let policy = match retention.snapshot_window {
                Some(n) => format!("{} archive(s), {} snapshot(s)", retention.archive_window, n),
                None => format!("{} archive(s), all snapshots", retention.archive_window),
            };

            if candidates.is_empty() {
                println!("No backups to prune.");
                println!("Current retention policy: {}", policy);
                println!("You have {} backup(s).", backups.len());
                return Ok(());
            }

            println!("Prune Summary");
            println!("=============");
            println!("Retention policy: {}", policy);
            println!("Current backups: {}", backups.len());
            println!("To be deleted: {}", candidates.len());
            for candidate in &candidates {
                println!("  - {}", candidate.file_name());
            }
            println!();

            if !force {
                println!("To delete old backups, run again with --force flag:");
                println!("  clinic-backup backup prune --force");
                return Ok(());
            }

            let deleted = gateway.prune().await?;
            println!("Deleted {} backup(s).", deleted.len());
        }
    }

    Ok(())
}

/// Format a duration in human-readable form
pub(crate) fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    let months = days / 30;
    format!("{}mo", months)
}

/// Format a file size in human-readable form
pub(crate) fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
