//! Per-job shard configuration
//!
//! Shard counts need not be uniform across indices: when indexing volume
//! ebbs and flows day to day it makes sense to size each rebuilt index from
//! its measured footprint (say, one shard per 10 GB) and fall back to a
//! default for the rest. Workers consult this table once at startup; the
//! values here are authoritative for how many shard directories the final
//! repository must contain per index.

use std::collections::HashMap;

/// Default shard count per index when no override is present.
pub const DEFAULT_SHARDS_PER_INDEX: u32 = 5;

/// Default number of shards one tenant's data spans within an index.
pub const DEFAULT_SHARDS_PER_ORG: u32 = 2;

/// Shard-count table: defaults plus optional per-index overrides.
#[derive(Debug, Clone)]
pub struct ShardConfig {
    shards_per_index: HashMap<String, u32>,
    shards_per_org: HashMap<String, u32>,
    default_shards_per_index: u32,
    default_shards_per_org: u32,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS_PER_INDEX, DEFAULT_SHARDS_PER_ORG)
    }
}

impl ShardConfig {
    /// Create a config with the given defaults and no overrides.
    pub fn new(default_shards_per_index: u32, default_shards_per_org: u32) -> Self {
        Self {
            shards_per_index: HashMap::new(),
            shards_per_org: HashMap::new(),
            default_shards_per_index,
            default_shards_per_org,
        }
    }

    /// Builder method to override the shard count for one index.
    pub fn with_index_shards(mut self, index: impl Into<String>, shards: u32) -> Self {
        self.shards_per_index.insert(index.into(), shards);
        self
    }

    /// Builder method to override the per-tenant span for one index.
    pub fn with_org_shards(mut self, index: impl Into<String>, shards: u32) -> Self {
        self.shards_per_org.insert(index.into(), shards);
        self
    }

    /// Shard count for an index (override or default).
    pub fn shards_for_index(&self, index: &str) -> u32 {
        self.shards_per_index
            .get(index)
            .copied()
            .unwrap_or(self.default_shards_per_index)
    }

    /// Number of shards one tenant spans within an index (override or default).
    pub fn shards_for_org(&self, index: &str) -> u32 {
        self.shards_per_org
            .get(index)
            .copied()
            .unwrap_or(self.default_shards_per_org)
    }
}
