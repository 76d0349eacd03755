//! Recurring backup trigger
//!
//! One timer task sleeps until the next slot of a [`ScheduleSpec`] and fires
//! the job in its own task. A fire that arrives while the previous run is
//! still going is skipped. Job errors are logged and never stop the timer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{BackupError, BackupResult};
use crate::models::BackupArtifact;

use super::clock::Clock;
use super::schedule::ScheduleSpec;

/// Work run on every scheduled fire
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    async fn run(&self) -> BackupResult<BackupArtifact>;
}

/// Fire counters since the scheduler was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub fired: u64,
    pub skipped: u64,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    fired: AtomicU64,
    skipped: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            fired: self.fired.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Clears the in-flight flag when a run ends, even by panic
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Fires a job on a daily cron-style schedule
pub struct BackupScheduler {
    spec: ScheduleSpec,
    clock: Arc<dyn Clock>,
    counters: Arc<Counters>,
    running: Option<Running>,
}

impl BackupScheduler {
    pub fn new(spec: ScheduleSpec, clock: Arc<dyn Clock>) -> Self {
        Self {
            spec,
            clock,
            counters: Arc::new(Counters::default()),
            running: None,
        }
    }

    pub fn spec(&self) -> &ScheduleSpec {
        &self.spec
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.counters.snapshot()
    }

    /// Next time the job will fire
    pub fn next_fire(&self) -> DateTime<Utc> {
        self.spec.next_after(self.clock.now())
    }

    /// Spawn the timer task
    pub fn start(&mut self, job: Arc<dyn ScheduledJob>) -> BackupResult<()> {
        if self.running.is_some() {
            return Err(BackupError::Config(
                "Backup scheduler is already running".to_string(),
            ));
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let timer = Timer {
            spec: self.spec,
            clock: self.clock.clone(),
            counters: self.counters.clone(),
            in_flight: Arc::new(AtomicBool::new(false)),
            job,
        };
        let handle = tokio::spawn(timer.run(shutdown_rx));

        info!("Backup scheduler started ({})", self.spec);
        self.running = Some(Running { shutdown, handle });
        Ok(())
    }

    /// Stop firing and wait for any in-flight run to finish
    pub async fn stop(&mut self) -> BackupResult<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        // The receiver is gone only if the timer task already ended
        let _ = running.shutdown.send(true);
        running.handle.await?;
        info!("Backup scheduler stopped");
        Ok(())
    }
}

impl Drop for BackupScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.handle.abort();
        }
    }
}

impl std::fmt::Debug for BackupScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupScheduler")
            .field("spec", &self.spec)
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

struct Timer {
    spec: ScheduleSpec,
    clock: Arc<dyn Clock>,
    counters: Arc<Counters>,
    in_flight: Arc<AtomicBool>,
    job: Arc<dyn ScheduledJob>,
}

impl Timer {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut last_fire: Option<DateTime<Utc>> = None;
        let mut current: Option<JoinHandle<()>> = None;

        loop {
            let now = self.clock.now();
            // Never fire the same slot twice after an early wake-up
            let from = last_fire.map_or(now, |last| last.max(now));
            let next = self.spec.next_after(from);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!("Next scheduled backup at {}", next);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if self.clock.now() < next {
                continue;
            }
            last_fire = Some(next);
            self.counters.fired.fetch_add(1, Ordering::Relaxed);

            if self.in_flight.swap(true, Ordering::AcqRel) {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Previous backup still running; skipping run scheduled for {}",
                    next
                );
                continue;
            }

            current = Some(self.fire());
        }

        if let Some(handle) = current {
            if let Err(e) = handle.await {
                error!("Scheduled backup task failed: {}", e);
            }
        }
    }

    fn fire(&self) -> JoinHandle<()> {
        let guard = InFlightGuard(self.in_flight.clone());
        let job = self.job.clone();
        let counters = self.counters.clone();

        tokio::spawn(async move {
            let _guard = guard;
            match job.run().await {
                Ok(artifact) => {
                    counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    info!("Scheduled backup created {}", artifact.file_name());
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    error!("Scheduled backup failed: {}", e);
                }
            }
        })
    }
}
