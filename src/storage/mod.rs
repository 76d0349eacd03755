//! Storage layer for clinic-backup
//!
//! The backup subsystem treats the clinic datastore as a collaborator that can
//! bulk-read, bulk-insert and delete-all per named collection. [`Datastore`]
//! is that seam. Two implementations ship with the crate:
//!
//! - [`MemoryDatastore`]: in-process store with multi-collection transactions
//! - [`JsonFileDatastore`]: one JSON file per collection, no transactions

pub mod file_io;
pub mod json_store;
pub mod memory;

pub use file_io::{read_json, write_json_atomic};
pub use json_store::JsonFileDatastore;
pub use memory::MemoryDatastore;

use crate::error::{BackupError, BackupResult};
use crate::models::{Collection, Record};

/// Bulk access to the managed collections
pub trait Datastore: Send + Sync {
    /// Every record in a collection, in storage order
    fn find_all(&self, collection: Collection) -> BackupResult<Vec<Record>>;

    /// Append records without deduplication, returning how many were inserted
    fn insert_many(&self, collection: Collection, records: Vec<Record>) -> BackupResult<usize>;

    /// Remove every record in a collection, returning how many were removed
    fn delete_all(&self, collection: Collection) -> BackupResult<usize>;

    /// Number of records in a collection
    fn count(&self, collection: Collection) -> BackupResult<usize> {
        Ok(self.find_all(collection)?.len())
    }

    /// Whether [`Datastore::replace_all`] is atomic across collections
    fn supports_transactions(&self) -> bool {
        false
    }

    /// Replace the contents of several collections in one transaction
    ///
    /// Either every collection ends up with its new contents or none changes.
    fn replace_all(&self, _contents: Vec<(Collection, Vec<Record>)>) -> BackupResult<()> {
        Err(BackupError::Datastore(
            "multi-collection transactions are not supported by this datastore".to_string(),
        ))
    }
}
