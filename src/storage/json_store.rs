//! JSON-file datastore
//!
//! Each collection is a pretty-printed JSON array in `data/<key>.json`.
//! Writes go through [`write_json_atomic`], so a single collection file is
//! never half-written, but there is no atomicity across collections.

use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::debug;

use super::file_io::{read_json, write_json_atomic};
use super::Datastore;
use crate::error::BackupResult;
use crate::models::{Collection, Record};

/// Datastore backed by one JSON file per collection
#[derive(Debug)]
pub struct JsonFileDatastore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileDatastore {
    /// Create a store rooted at `data_dir`
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            write_lock: Mutex::new(()),
        }
    }

    /// Path of a collection's file
    pub fn collection_file(&self, collection: Collection) -> PathBuf {
        self.data_dir.join(format!("{}.json", collection.key()))
    }

    fn load(&self, collection: Collection) -> BackupResult<Vec<Record>> {
        read_json(self.collection_file(collection))
    }
}

impl Datastore for JsonFileDatastore {
    fn find_all(&self, collection: Collection) -> BackupResult<Vec<Record>> {
        self.load(collection)
    }

    fn insert_many(&self, collection: Collection, records: Vec<Record>) -> BackupResult<usize> {
        let _guard = self.write_lock.lock();
        let mut existing = self.load(collection)?;
        let inserted = records.len();
        existing.extend(records.into_iter().map(|mut r| {
            r.ensure_id();
            r
        }));
        write_json_atomic(self.collection_file(collection), &existing)?;
        debug!("Inserted {} record(s) into {}", inserted, collection);
        Ok(inserted)
    }

    fn delete_all(&self, collection: Collection) -> BackupResult<usize> {
        let _guard = self.write_lock.lock();
        let existing = self.load(collection)?;
        if !existing.is_empty() {
            write_json_atomic(self.collection_file(collection), &Vec::<Record>::new())?;
        }
        debug!("Deleted {} record(s) from {}", existing.len(), collection);
        Ok(existing.len())
    }
}
