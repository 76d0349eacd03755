//! Destructive restore from a snapshot manifest
//!
//! Every restore-managed collection is emptied and repopulated from the
//! manifest. Animals, appointments and health records are left alone.
//! Validation runs before anything is touched. Stores that support
//! multi-collection transactions get one atomic replace; others get a
//! per-collection sequence that reports exactly how far it got on failure.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::error::{BackupError, BackupResult};
use crate::models::Collection;
use crate::storage::Datastore;

use super::snapshot::SnapshotManifest;

/// Restores the datastore from snapshot manifests
#[derive(Clone)]
pub struct RestoreOrchestrator {
    datastore: Arc<dyn Datastore>,
}

impl RestoreOrchestrator {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self { datastore }
    }

    /// Check a manifest without restoring it
    pub fn inspect(manifest: &SnapshotManifest) -> ValidationResult {
        ValidationResult {
            snapshot_date: manifest.timestamp,
            record_counts: manifest.record_counts(),
            missing_required: manifest.missing_required(),
        }
    }

    /// Fail with `Validation` naming every missing required collection
    pub fn validate(manifest: &SnapshotManifest) -> BackupResult<()> {
        let missing = manifest.missing_required();
        if missing.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = missing.iter().map(|c| c.key()).collect();
        Err(BackupError::Validation(format!(
            "Snapshot is missing required collections: {}",
            names.join(", ")
        )))
    }

    /// Replace every restore-managed collection with the manifest's contents
    ///
    /// Managed collections absent from the manifest are emptied. Other
    /// collections in the manifest are ignored.
    pub fn restore(&self, manifest: SnapshotManifest) -> BackupResult<RestoreReport> {
        Self::validate(&manifest)?;

        let snapshot_date = manifest.timestamp;
        let mut manifest = manifest;
        let batch: Vec<_> = Collection::RESTORE_MANAGED
            .into_iter()
            .map(|c| (c, manifest.take(c).unwrap_or_default()))
            .collect();

        if self.datastore.supports_transactions() {
            let restored = batch.iter().map(|(c, records)| (*c, records.len())).collect();
            self.datastore.replace_all(batch)?;
            info!("Restored managed collections in one transaction");
            return Ok(RestoreReport {
                restored,
                transactional: true,
                snapshot_date,
            });
        }

        let mut restored = BTreeMap::new();
        let mut remaining = batch.into_iter();
        while let Some((collection, records)) = remaining.next() {
            let count = records.len();
            let step = self
                .datastore
                .delete_all(collection)
                .and_then(|_| self.datastore.insert_many(collection, records));

            if let Err(e) = step {
                let not_attempted: Vec<String> =
                    remaining.map(|(c, _)| c.key().to_string()).collect();
                error!("Restore stopped at {}: {}", collection, e);
                return Err(BackupError::PartialRestore {
                    restored: restored.keys().map(|c: &Collection| c.key().to_string()).collect(),
                    failed: collection.key().to_string(),
                    reason: e.to_string(),
                    not_attempted,
                });
            }
            restored.insert(collection, count);
        }

        info!("Restored {} collections", restored.len());
        Ok(RestoreReport {
            restored,
            transactional: false,
            snapshot_date,
        })
    }
}

impl std::fmt::Debug for RestoreOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreOrchestrator").finish_non_exhaustive()
    }
}

/// Result of a restore operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Records written per collection
    pub restored: BTreeMap<Collection, usize>,
    /// Whether the store applied the restore atomically
    pub transactional: bool,
    /// When the restored snapshot was taken
    pub snapshot_date: Option<DateTime<Utc>>,
}

impl RestoreReport {
    pub fn total(&self) -> usize {
        self.restored.values().sum()
    }

    /// Get a summary of what was restored
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .restored
            .iter()
            .map(|(c, n)| format!("{} ({})", c, n))
            .collect();
        format!("Restored: {}", parts.join(", "))
    }
}

/// Result of inspecting a snapshot
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// When the snapshot was taken
    pub snapshot_date: Option<DateTime<Utc>>,
    /// Records per present collection
    pub record_counts: BTreeMap<Collection, usize>,
    /// Required collections that are absent
    pub missing_required: Vec<Collection>,
}

impl ValidationResult {
    /// Whether a restore would be accepted
    pub fn is_restorable(&self) -> bool {
        self.missing_required.is_empty()
    }

    /// Get a summary of what data is present
    pub fn summary(&self) -> String {
        let present: Vec<String> = self
            .record_counts
            .iter()
            .map(|(c, n)| format!("{} ({})", c, n))
            .collect();

        if self.is_restorable() {
            format!("Restorable snapshot: {}", present.join(", "))
        } else {
            let missing: Vec<&str> = self.missing_required.iter().map(|c| c.key()).collect();
            format!(
                "Incomplete snapshot: has {}, missing {}",
                present.join(", "),
                missing.join(", ")
            )
        }
    }
}
