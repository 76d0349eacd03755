//! External process invocation
//!
//! The native dump and restore tools run behind [`ProcessRunner`] so tests can
//! substitute a fake that simulates a missing tool or a nonzero exit.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error};

use crate::config::ToolSettings;
use crate::error::{BackupError, BackupResult};

/// Exit status and captured output of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Whether the process exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs an external program to completion
///
/// An `Err` means the program could not be run at all (missing executable,
/// deadline exceeded). A program that ran and failed is an `Ok` with a
/// nonzero exit code.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> BackupResult<ProcessOutput>;
}

/// Runs programs with `tokio::process`, killing them if the deadline passes
#[derive(Debug, Clone, Default)]
pub struct SystemProcessRunner {
    timeout: Option<Duration>,
}

impl SystemProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> BackupResult<ProcessOutput> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| {
                    BackupError::ExternalTool(format!(
                        "{} exceeded its deadline of {:?} and was killed",
                        program, limit
                    ))
                })?,
            None => command.output().await,
        };

        let output = output.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BackupError::ExternalTool(format!("{} not found: {}", program, e))
            } else {
                BackupError::ExternalTool(format!("Failed to start {}: {}", program, e))
            }
        })?;

        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// The native dump/restore tool pair (`mongodump` / `mongorestore`)
#[derive(Clone)]
pub struct DumpTool {
    runner: Arc<dyn ProcessRunner>,
    dump_program: String,
    restore_program: String,
    datastore_uri: Option<String>,
}

impl DumpTool {
    /// Create a tool pair. A missing connection string is reported when the
    /// tool is first used.
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        tools: &ToolSettings,
        datastore_uri: Option<String>,
    ) -> Self {
        Self {
            runner,
            dump_program: tools.dump_program.clone(),
            restore_program: tools.restore_program.clone(),
            datastore_uri,
        }
    }

    fn uri(&self) -> BackupResult<&str> {
        self.datastore_uri.as_deref().ok_or_else(|| {
            BackupError::Config("Datastore connection string is not configured".to_string())
        })
    }

    /// Dump the whole datastore into `out_dir`
    pub async fn dump(&self, out_dir: &Path) -> BackupResult<()> {
        let args = vec![
            format!("--uri={}", self.uri()?),
            format!("--out={}", out_dir.display()),
        ];
        self.invoke(&self.dump_program, &args).await
    }

    /// Load a dump directory, dropping each collection before it is restored
    pub async fn restore(&self, dump_dir: &Path) -> BackupResult<()> {
        let args = vec![
            format!("--uri={}", self.uri()?),
            format!("--dir={}", dump_dir.display()),
            "--drop".to_string(),
        ];
        self.invoke(&self.restore_program, &args).await
    }

    async fn invoke(&self, program: &str, args: &[String]) -> BackupResult<()> {
        // Arguments carry the connection string; never log them
        debug!("Running {}", program);
        let output = self.runner.run(program, args).await?;
        if output.success() {
            return Ok(());
        }

        let status = output
            .exit_code
            .map_or_else(|| "a signal".to_string(), |code| format!("status {}", code));
        error!("{} exited with {}: {}", program, status, output.stderr.trim());
        Err(BackupError::ExternalTool(format!(
            "{} exited with {}: {}",
            program,
            status,
            output.stderr.trim()
        )))
    }
}

impl std::fmt::Debug for DumpTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpTool")
            .field("dump_program", &self.dump_program)
            .field("restore_program", &self.restore_program)
            .field("datastore_uri", &self.datastore_uri.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
