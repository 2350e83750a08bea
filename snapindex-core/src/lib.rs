//! # Snapindex Core
//!
//! Shared types for the offline index build pipeline.
//!
//! This crate provides:
//! - Pipe-delimited partition record parsing (`RoutingKey`, `DocumentPayload`)
//! - The engine routing hash and murmur used for shard placement
//! - Routing strategies and the identifier-keyed `StrategyRegistry`
//! - Published index metadata (`IndexMetadata`, `PipelineState`)
//! - Shard geometry configuration (`ShardConfig`)
//! - Job progress reporting (`Reporter`, `JobCounter`)
//!
//! ## Design Principles
//!
//! 1. **No engine dependency**: readers resolve routing from metadata alone
//! 2. **Routing is immutable once published**: new schemes get new
//!    identifiers, existing ones are never altered
//! 3. **Wire formats are spelled out here**: one crate owns record and
//!    metadata encodings

pub mod error;
pub mod hash;
pub mod metadata;
pub mod progress;
pub mod record;
pub mod routing;
pub mod shard_config;

// Re-export main types
pub use error::{Error, Result};
pub use hash::{djb_hash, engine_shard, murmur3_32, murmur_mod};
pub use metadata::{IndexMetadata, PipelineState};
pub use progress::{JobCounter, MemoryReporter, NullReporter, Reporter};
pub use record::{DocumentPayload, RoutingKey, TUPLE_SEPARATOR};
pub use routing::{RoutingStrategy, ShardRoutingV1, StrategyRegistry, ROUTING_STRATEGY_V1};
pub use shard_config::{ShardConfig, DEFAULT_SHARDS_PER_INDEX, DEFAULT_SHARDS_PER_ORG};
