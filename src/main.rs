use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use clinic_backup::backup::{BackupScheduler, BackupStrategy, SystemClock};
use clinic_backup::cli::{
    build_gateway, handle_backup_command, handle_snapshot_command, BackupCommands,
    SnapshotCommands,
};
use clinic_backup::config::{ClinicPaths, Settings};

#[derive(Parser)]
#[command(
    name = "clinic-backup",
    version,
    about = "Scheduled backups and restore for the clinic datastore",
    long_about = "clinic-backup produces zipped native dumps and JSON snapshots of the \
                  clinic datastore on a daily schedule, keeps the newest of them, and \
                  restores from them on demand."
)]
struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the application directories and default settings
    Init,

    /// Show current configuration and paths
    Config,

    /// Run the backup scheduler until interrupted
    Serve,

    /// Dump archive commands
    #[command(subcommand)]
    Backup(BackupCommands),

    /// JSON snapshot commands
    #[command(subcommand)]
    Snapshot(SnapshotCommands),
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Initialize paths and settings
    let paths = ClinicPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;

    match cli.command {
        Some(Commands::Init) => {
            println!("Initializing clinic-backup at: {}", paths.base_dir().display());
            paths.ensure_directories()?;
            settings.save(&paths)?;
            println!("Initialization complete!");
            println!();
            println!("Backups:  {}", paths.backups_dir().display());
            println!("Exports:  {}", paths.exports_dir().display());
            println!("Settings: {}", paths.settings_file().display());
        }
        Some(Commands::Config) => {
            println!("clinic-backup Configuration");
            println!("===========================");
            println!("Root directory:   {}", paths.base_dir().display());
            println!("Backup directory: {}", paths.backups_dir().display());
            println!("Export directory: {}", paths.exports_dir().display());
            println!("Settings file:    {}", paths.settings_file().display());
            println!();
            println!("Settings:");
            println!("  Schedule:          {}", settings.backup_schedule);
            println!("  Strategy:          {}", settings.scheduled_strategy);
            println!("  Archive retention: {}", settings.retention.archive_window);
            match settings.retention.snapshot_window {
                Some(n) => println!("  Snapshot retention: {}", n),
                None => println!("  Snapshot retention: unlimited"),
            }
            println!(
                "  Dump tools:        {} / {}",
                settings.tools.dump_program, settings.tools.restore_program
            );
            println!(
                "  Connection string: ${} ({})",
                settings.datastore_uri_env,
                if settings.datastore_uri().is_ok() {
                    "set"
                } else {
                    "not set"
                }
            );
        }
        Some(Commands::Serve) => {
            let needs_uri = settings.scheduled_strategy == BackupStrategy::ArchiveDump;
            let gateway = build_gateway(&paths, &settings, needs_uri)?;
            let mut scheduler =
                BackupScheduler::new(settings.backup_schedule, Arc::new(SystemClock));
            scheduler.start(gateway)?;
            info!("Next backup at {}", scheduler.next_fire());

            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
            scheduler.stop().await?;
        }
        Some(Commands::Backup(cmd)) => {
            let needs_uri = cmd.uses_dump_tool(settings.scheduled_strategy);
            let gateway = build_gateway(&paths, &settings, needs_uri)?;
            handle_backup_command(&gateway, &settings, cmd).await?;
        }
        Some(Commands::Snapshot(cmd)) => {
            let gateway = build_gateway(&paths, &settings, false)?;
            handle_snapshot_command(&gateway, cmd).await?;
        }
        None => {
            println!("clinic-backup - Backups for the clinic datastore");
            println!();
            println!("Run 'clinic-backup --help' for usage information.");
            println!("Run 'clinic-backup serve' to start the daily schedule.");
        }
    }

    Ok(())
}
