//! Tunables for [`Store`](crate::store::Store) and the snapshot loader.

use serde::{Deserialize, Serialize};

/// Configuration for a [`Store`](crate::store::Store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Keep a per-entity bitmask of owned component types so that destroying
    /// an entity only visits the pools it occupies. When off, destroy probes
    /// every registered pool. Default: `true`.
    pub track_presence: bool,
    /// Number of entity slots to reserve up front. Default: 0.
    pub entity_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            track_presence: true,
            entity_capacity: 0,
        }
    }
}

/// Configuration for a [`SnapshotLoader`](crate::snapshot::SnapshotLoader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Largest record count a single section may declare. Anything above is
    /// rejected as corrupt before decoding starts. Default: 16,777,216.
    pub max_section_len: u32,
    /// Largest entity index a snapshot may name. Restoring an index grows
    /// the store's tables up to it, so this bounds what a single record can
    /// make the loader allocate. Default: 16,777,215.
    pub max_index: u32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_section_len: 16 * 1024 * 1024,
            max_index: 16 * 1024 * 1024 - 1,
        }
    }
}
