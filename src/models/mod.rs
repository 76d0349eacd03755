//! Core data models for clinic-backup
//!
//! This module contains the types shared by every backup strategy: the fixed
//! set of managed collections, opaque record documents, and backup artifacts.

pub mod artifact;
pub mod collection;
pub mod record;

pub use artifact::{ArtifactKind, BackupArtifact};
pub use collection::Collection;
pub use record::{Record, ID_FIELD};
