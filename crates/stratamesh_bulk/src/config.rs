//! Configuration for a [`BulkData`](crate::BulkData).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use stratamesh_storage::ConnectivityMap;

/// Default number of entities a bucket holds.
pub const DEFAULT_BUCKET_CAPACITY: usize = 512;

/// Configuration for a mesh.
///
/// Controls bucket sizing, which rank pairs store relations, and optional
/// bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BulkDataConfig {
    /// Maximum number of entities per bucket.
    pub bucket_capacity: usize,

    /// Which rank pairs store relations (`None` = every pair of distinct ranks).
    pub connectivity: Option<ConnectivityMap>,

    /// Keep the legacy per-offset local-id and framework-id tables.
    pub maintain_aux_tables: bool,

    /// Coalesce partially filled buckets at `modification_end`.
    pub optimize_buckets: bool,
}

impl Default for BulkDataConfig {
    fn default() -> Self {
        Self {
            bucket_capacity: DEFAULT_BUCKET_CAPACITY,
            connectivity: None,
            maintain_aux_tables: false,
            optimize_buckets: false,
        }
    }
}

impl BulkDataConfig {
    /// Creates a configuration that stores downward relations only.
    ///
    /// Lower-rank entities cannot enumerate their higher-rank neighbours
    /// under this configuration.
    #[must_use]
    pub fn forward_only(rank_count: usize) -> Self {
        Self {
            connectivity: Some(ConnectivityMap::downward_only(rank_count)),
            ..Self::default()
        }
    }

    /// Creates a configuration that keeps the aux tables and compacts
    /// buckets every cycle.
    #[must_use]
    pub fn legacy() -> Self {
        Self {
            maintain_aux_tables: true,
            optimize_buckets: true,
            ..Self::default()
        }
    }

    /// Builder method to set the bucket capacity.
    #[must_use]
    pub fn with_bucket_capacity(mut self, capacity: usize) -> Self {
        self.bucket_capacity = capacity;
        self
    }

    /// Builder method to set the connectivity map.
    #[must_use]
    pub fn with_connectivity(mut self, connectivity: ConnectivityMap) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Builder method to enable the aux tables.
    #[must_use]
    pub fn with_aux_tables(mut self, enabled: bool) -> Self {
        self.maintain_aux_tables = enabled;
        self
    }

    /// Builder method to enable bucket coalescing.
    #[must_use]
    pub fn with_optimize_buckets(mut self, enabled: bool) -> Self {
        self.optimize_buckets = enabled;
        self
    }

    /// Returns the connectivity map for a mesh with `rank_count` ranks.
    #[must_use]
    pub fn connectivity_map(&self, rank_count: usize) -> ConnectivityMap {
        self.connectivity
            .clone()
            .unwrap_or_else(|| ConnectivityMap::all(rank_count))
    }
}
