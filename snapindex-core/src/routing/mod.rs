//! Document routing strategies
//!
//! A routing strategy maps `(tenant, document)` to a routing-hint string
//! that the engine's own hash will land on a chosen shard. The strategy an
//! index was built with is persisted in its [`IndexMetadata`] and is
//! immutable from then on: changing the mapping after publication would make
//! data appear unavailable because readers would look in the wrong shard.
//! Evolving the routing scheme means adding a new strategy under a new
//! identifier and publishing new indices with it, never altering an existing
//! one.
//!
//! Strategies are instantiated by identifier through [`StrategyRegistry`],
//! so readers of historical indices construct exactly the implementation the
//! builder used.

mod v1;

pub use v1::{ShardRoutingV1, ROUTING_STRATEGY_V1};

use crate::error::Result;
use crate::metadata::IndexMetadata;
use std::collections::HashMap;
use std::fmt::Debug;
use tracing::warn;

/// Deterministic map from `(tenant, document)` to an engine routing hint.
pub trait RoutingStrategy: Debug + Send + Sync {
    /// Registered identifier of this strategy.
    fn name(&self) -> &'static str;

    /// Total shard count of the target index.
    fn num_shards(&self) -> u32;

    /// Number of shards one tenant's data spans.
    fn num_shards_per_org(&self) -> u32;

    /// Routing hint for one document.
    fn routing_hint(&self, tenant_id: &str, doc_id: &str) -> String;

    /// Every hint a tenant's documents can receive; length equals
    /// [`Self::num_shards_per_org`]. Lets readers prune their search to the
    /// tenant's shard ring.
    fn possible_hints(&self, tenant_id: &str) -> Vec<String>;

    /// Whether two strategies route identically. Strategies carry no
    /// per-document state, so identifier plus shard geometry is the whole
    /// comparison.
    fn same_routing(&self, other: &dyn RoutingStrategy) -> bool {
        self.name() == other.name()
            && self.num_shards() == other.num_shards()
            && self.num_shards_per_org() == other.num_shards_per_org()
    }
}

/// Constructor for a routing strategy, configured from index metadata.
pub type StrategyCtor = fn(&IndexMetadata) -> Result<Box<dyn RoutingStrategy>>;

/// Registry of routing strategies keyed by identifier.
///
/// Replaces by-name reflection: unknown identifiers degrade to `None`
/// ("search all shards") with a warning instead of failing the read path.
#[derive(Clone)]
pub struct StrategyRegistry {
    ctors: HashMap<String, StrategyCtor>,
}

impl Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.ctors.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("StrategyRegistry")
            .field("strategies", &names)
            .finish()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut registry = Self {
            ctors: HashMap::new(),
        };
        registry.register(ROUTING_STRATEGY_V1, |meta| {
            Ok(Box::new(ShardRoutingV1::from_metadata(meta)?))
        });
        registry
    }
}

impl StrategyRegistry {
    /// Registry with the built-in strategies registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a strategy constructor under an identifier.
    pub fn register(&mut self, name: impl Into<String>, ctor: StrategyCtor) {
        self.ctors.insert(name.into(), ctor);
    }

    /// Instantiate the strategy named by `meta.routing_strategy_class_name`,
    /// configured from `meta`.
    ///
    /// Returns `None` (log, don't fail) when the metadata names no strategy,
    /// names an unregistered one, or carries shard counts the strategy
    /// rejects. Callers fall back to searching all shards.
    pub fn instantiate(&self, meta: &IndexMetadata) -> Option<Box<dyn RoutingStrategy>> {
        let name = meta.routing_strategy_class_name.as_deref()?;
        let Some(ctor) = self.ctors.get(name) else {
            warn!(strategy = name, index = %meta.index_name_at_birth, "unknown routing strategy");
            return None;
        };
        match ctor(meta) {
            Ok(strategy) => Some(strategy),
            Err(e) => {
                warn!(strategy = name, index = %meta.index_name_at_birth, error = %e,
                      "failed to configure routing strategy");
                None
            }
        }
    }
}
