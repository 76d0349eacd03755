//! Managed collections
//!
//! The set of collections the backup subsystem knows about is fixed at compile
//! time. Snapshot documents key their record arrays by [`Collection::key`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BackupError;

/// A named collection in the clinic datastore
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Users,
    Animals,
    Appointments,
    HealthRecords,
    Orders,
    OrderItems,
    Payments,
    Products,
}

impl Collection {
    /// Every collection captured in snapshots and accepted by import
    pub const ALL: [Collection; 8] = [
        Collection::Users,
        Collection::Animals,
        Collection::Appointments,
        Collection::HealthRecords,
        Collection::Orders,
        Collection::OrderItems,
        Collection::Payments,
        Collection::Products,
    ];

    /// Collections a restore empties and repopulates, in restore order
    ///
    /// Animals, appointments and health records are captured and imported
    /// but never touched by a restore.
    pub const RESTORE_MANAGED: [Collection; 5] = [
        Collection::Users,
        Collection::Orders,
        Collection::Products,
        Collection::Payments,
        Collection::OrderItems,
    ];

    /// Collections a manifest must contain before a restore may touch anything
    pub const REQUIRED_FOR_RESTORE: [Collection; 3] =
        [Collection::Users, Collection::Orders, Collection::Products];

    /// The key used for this collection in snapshot documents
    pub fn key(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Animals => "animals",
            Self::Appointments => "appointments",
            Self::HealthRecords => "healthRecords",
            Self::Orders => "orders",
            Self::OrderItems => "orderItems",
            Self::Payments => "payments",
            Self::Products => "products",
        }
    }

    /// Look up a collection by its snapshot key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.key() == key)
    }

    /// Whether a restore replaces this collection's contents
    pub fn is_restore_managed(&self) -> bool {
        Self::RESTORE_MANAGED.contains(self)
    }

    /// Whether a restore requires this collection to be present
    pub fn is_required_for_restore(&self) -> bool {
        Self::REQUIRED_FOR_RESTORE.contains(self)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for Collection {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept the kebab-case spelling used in docs as well as the snapshot key
        let normalized = match s {
            "health-records" => "healthRecords",
            "order-items" => "orderItems",
            other => other,
        };
        Self::from_key(normalized)
            .ok_or_else(|| BackupError::Validation(format!("Unknown collection: {}", s)))
    }
}
