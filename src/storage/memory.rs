//! In-memory datastore
//!
//! Holds every collection behind one lock, so a multi-collection replace is a
//! single critical section.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::Datastore;
use crate::error::{BackupError, BackupResult};
use crate::models::{Collection, Record};

/// Datastore keeping all collections in memory
#[derive(Debug)]
pub struct MemoryDatastore {
    collections: RwLock<BTreeMap<Collection, Vec<Record>>>,
    transactional: bool,
}

impl MemoryDatastore {
    /// Create an empty store with transaction support
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
            transactional: true,
        }
    }

    /// Create an empty store that reports no transaction support, so restores
    /// take the per-collection path
    pub fn without_transactions() -> Self {
        Self {
            transactional: false,
            ..Self::new()
        }
    }

    /// Per-collection record counts for every managed collection
    pub fn counts(&self) -> BTreeMap<Collection, usize> {
        let guard = self.collections.read();
        Collection::ALL
            .iter()
            .map(|c| (*c, guard.get(c).map_or(0, Vec::len)))
            .collect()
    }
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

impl Datastore for MemoryDatastore {
    fn find_all(&self, collection: Collection) -> BackupResult<Vec<Record>> {
        Ok(self
            .collections
            .read()
            .get(&collection)
            .cloned()
            .unwrap_or_default())
    }

    fn insert_many(&self, collection: Collection, records: Vec<Record>) -> BackupResult<usize> {
        let inserted = records.len();
        let mut guard = self.collections.write();
        let target = guard.entry(collection).or_default();
        for mut record in records {
            record.ensure_id();
            target.push(record);
        }
        Ok(inserted)
    }

    fn delete_all(&self, collection: Collection) -> BackupResult<usize> {
        Ok(self
            .collections
            .write()
            .remove(&collection)
            .map_or(0, |records| records.len()))
    }

    fn supports_transactions(&self) -> bool {
        self.transactional
    }

    fn replace_all(&self, contents: Vec<(Collection, Vec<Record>)>) -> BackupResult<()> {
        if !self.transactional {
            return Err(BackupError::Datastore(
                "transactions are disabled for this store".to_string(),
            ));
        }

        let mut guard = self.collections.write();
        for (collection, records) in contents {
            let records = records
                .into_iter()
                .map(|mut r| {
                    r.ensure_id();
                    r
                })
                .collect();
            guard.insert(collection, records);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Record::try_from(value).unwrap()
    }

    #[test]
    fn test_insert_assigns_ids() {
        let store = MemoryDatastore::new();
        store
            .insert_many(Collection::Animals, vec![record(json!({"name": "Rex"}))])
            .unwrap();

        let animals = store.find_all(Collection::Animals).unwrap();
        assert_eq!(animals.len(), 1);
        assert!(animals[0].id().is_some());
    }

    #[test]
    fn test_insert_does_not_deduplicate() {
        let store = MemoryDatastore::new();
        let rec = record(json!({"_id": "u1"}));
        store.insert_many(Collection::Users, vec![rec.clone()]).unwrap();
        store.insert_many(Collection::Users, vec![rec]).unwrap();

        assert_eq!(store.count(Collection::Users).unwrap(), 2);
    }

    #[test]
    fn test_delete_all() {
        let store = MemoryDatastore::new();
        store
            .insert_many(Collection::Orders, vec![Record::new(), Record::new()])
            .unwrap();

        assert_eq!(store.delete_all(Collection::Orders).unwrap(), 2);
        assert_eq!(store.delete_all(Collection::Orders).unwrap(), 0);
        assert_eq!(store.count(Collection::Orders).unwrap(), 0);
    }

    #[test]
    fn test_replace_all() {
        let store = MemoryDatastore::new();
        store
            .insert_many(Collection::Users, vec![Record::new(), Record::new()])
            .unwrap();

        store
            .replace_all(vec![
                (Collection::Users, vec![Record::new()]),
                (Collection::Products, vec![]),
            ])
            .unwrap();

        let counts = store.counts();
        assert_eq!(counts[&Collection::Users], 1);
        assert_eq!(counts[&Collection::Products], 0);
    }

    #[test]
    fn test_replace_all_refused_without_transactions() {
        let store = MemoryDatastore::without_transactions();
        assert!(!store.supports_transactions());
        assert!(store.replace_all(vec![]).is_err());
    }
}
