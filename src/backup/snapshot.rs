//! JSON snapshot codec
//!
//! A snapshot is one JSON object with an optional `timestamp` and an array of
//! records per collection key. Export reads every managed collection. Import
//! is additive: it appends records and never deletes or deduplicates. The
//! destructive path lives in [`super::restore`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{BackupError, BackupResult};
use crate::models::artifact::{export_file_name, next_free_path, snapshot_file_name};
use crate::models::record::json_type_name;
use crate::models::{Collection, Record};
use crate::storage::{write_json_atomic, Datastore};

const TIMESTAMP_KEY: &str = "timestamp";

/// Parsed snapshot document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotManifest {
    /// When the snapshot was taken, if recorded
    pub timestamp: Option<DateTime<Utc>>,
    collections: BTreeMap<Collection, Vec<Record>>,
}

impl SnapshotManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timestamp(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: Some(timestamp),
            collections: BTreeMap::new(),
        }
    }

    /// Set a collection's records, replacing any already present
    pub fn insert(&mut self, collection: Collection, records: Vec<Record>) {
        self.collections.insert(collection, records);
    }

    pub fn get(&self, collection: Collection) -> Option<&[Record]> {
        self.collections.get(&collection).map(Vec::as_slice)
    }

    /// Whether the collection key was present, even with an empty array
    pub fn contains(&self, collection: Collection) -> bool {
        self.collections.contains_key(&collection)
    }

    /// Remove and return a collection's records
    pub fn take(&mut self, collection: Collection) -> Option<Vec<Record>> {
        self.collections.remove(&collection)
    }

    /// True when no recognized collection key is present
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Present collections in restore order
    pub fn collections(&self) -> impl Iterator<Item = (Collection, &[Record])> {
        Collection::ALL
            .into_iter()
            .filter_map(|c| self.get(c).map(|records| (c, records)))
    }

    /// Required collections that are absent
    pub fn missing_required(&self) -> Vec<Collection> {
        Collection::REQUIRED_FOR_RESTORE
            .into_iter()
            .filter(|c| !self.contains(*c))
            .collect()
    }

    /// Record counts of the present collections
    pub fn record_counts(&self) -> BTreeMap<Collection, usize> {
        self.collections
            .iter()
            .map(|(c, records)| (*c, records.len()))
            .collect()
    }

    /// Parse a snapshot document
    ///
    /// Unknown keys are ignored. A collection set to `null` counts as
    /// absent. A `timestamp` that does not parse is dropped rather than
    /// rejected.
    pub fn from_value(value: Value) -> BackupResult<Self> {
        let Value::Object(object) = value else {
            return Err(BackupError::Validation(format!(
                "Snapshot must be a JSON object, got {}",
                json_type_name(&value)
            )));
        };

        let mut manifest = Self::new();
        for (key, value) in object {
            if key == TIMESTAMP_KEY {
                manifest.timestamp = value
                    .as_str()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|ts| ts.with_timezone(&Utc));
                continue;
            }

            let Some(collection) = Collection::from_key(&key) else {
                debug!("Ignoring unknown snapshot key '{}'", key);
                continue;
            };

            let items = match value {
                Value::Array(items) => items,
                Value::Null => {
                    debug!("Treating null '{}' as absent", key);
                    continue;
                }
                other => {
                    return Err(BackupError::Validation(format!(
                        "'{}' must be an array, got {}",
                        key,
                        json_type_name(&other)
                    )));
                }
            };

            let records = items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    Record::try_from(item).map_err(|e| {
                        BackupError::Validation(format!("'{}'[{}]: {}", key, index, e))
                    })
                })
                .collect::<BackupResult<Vec<_>>>()?;
            manifest.insert(collection, records);
        }

        Ok(manifest)
    }

    /// Read and parse a snapshot file
    pub fn read_from_file(path: &Path) -> BackupResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BackupError::backup_not_found(path.display().to_string())
            } else {
                BackupError::FileSystem(format!("Failed to read {}: {}", path.display(), e))
            }
        })?;
        let value: Value = serde_json::from_str(&contents).map_err(|e| {
            BackupError::Validation(format!("Invalid snapshot {}: {}", path.display(), e))
        })?;
        Self::from_value(value)
    }
}

impl Serialize for SnapshotManifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.collections.len() + usize::from(self.timestamp.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(ts) = self.timestamp {
            map.serialize_entry(TIMESTAMP_KEY, &ts.to_rfc3339_opts(SecondsFormat::Millis, true))?;
        }
        for (collection, records) in self.collections() {
            map.serialize_entry(collection.key(), records)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SnapshotManifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// Per-collection counts from an additive import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: BTreeMap<Collection, usize>,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.inserted.values().sum()
    }
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .inserted
            .iter()
            .map(|(c, n)| format!("{}: {}", c, n))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Reads and writes whole-datastore JSON snapshots
#[derive(Clone)]
pub struct SnapshotCodec {
    datastore: Arc<dyn Datastore>,
}

impl SnapshotCodec {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self { datastore }
    }

    /// Read every managed collection into a manifest
    pub fn capture(&self, timestamp: DateTime<Utc>) -> BackupResult<SnapshotManifest> {
        let mut manifest = SnapshotManifest::with_timestamp(timestamp);
        for collection in Collection::ALL {
            manifest.insert(collection, self.datastore.find_all(collection)?);
        }
        Ok(manifest)
    }

    /// Write a snapshot backup `backup-<iso>.json` into `dir`
    pub fn write_snapshot(&self, dir: &Path, timestamp: DateTime<Utc>) -> BackupResult<PathBuf> {
        self.write_named(dir, timestamp, snapshot_file_name)
    }

    /// Write an export-only copy `export-<iso>.json` into `dir`
    pub fn write_export(&self, dir: &Path, timestamp: DateTime<Utc>) -> BackupResult<PathBuf> {
        self.write_named(dir, timestamp, export_file_name)
    }

    fn write_named(
        &self,
        dir: &Path,
        timestamp: DateTime<Utc>,
        name_for: fn(DateTime<Utc>) -> String,
    ) -> BackupResult<PathBuf> {
        let (timestamp, path) = next_free_path(dir, timestamp, name_for);
        let manifest = self.capture(timestamp)?;
        write_json_atomic(&path, &manifest)?;
        info!(
            "Wrote snapshot {} ({} records)",
            path.display(),
            manifest.record_counts().values().sum::<usize>()
        );
        Ok(path)
    }

    /// Append every present collection's records to the datastore
    pub fn import(&self, manifest: SnapshotManifest) -> BackupResult<ImportSummary> {
        if manifest.is_empty() {
            return Err(BackupError::Validation(
                "Snapshot contains no recognized collections".to_string(),
            ));
        }

        let mut manifest = manifest;
        let mut summary = ImportSummary::default();
        for collection in Collection::ALL {
            if let Some(records) = manifest.take(collection) {
                let inserted = if records.is_empty() {
                    0
                } else {
                    self.datastore.insert_many(collection, records)?
                };
                summary.inserted.insert(collection, inserted);
            }
        }

        info!("Imported {} record(s): {}", summary.total(), summary);
        Ok(summary)
    }
}

impl fmt::Debug for SnapshotCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotCodec").finish_non_exhaustive()
    }
}
