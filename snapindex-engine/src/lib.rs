//! Embedded search-engine seam for the offline index build.
//!
//! The build never talks to a live cluster; each worker runs its own
//! single-node engine, writes one index into it, and snapshots the result to
//! local disk. This crate defines:
//!
//! - [`SearchEngine`]: the black-box index/snapshot primitives an engine
//!   must provide
//! - [`EngineFactory`]: starts an engine from [`EngineSettings`]
//! - [`EmbeddedEngine`]: scoped container owning the engine's directories
//!   and driving the flush, merge, snapshot, poll protocol
//! - [`SimEngine`]: in-process filesystem-backed engine for tests, which
//!   materialises the real snapshot repository layout

mod container;
mod error;
mod settings;
pub mod sim;

pub use container::{EmbeddedEngine, EmbeddedEngineBuilder};
pub use error::{Error, Result};
pub use settings::{
    EngineSettings, IndexSettings, DEFAULT_SNAPSHOT_TIMEOUT, SNAPSHOT_POLL_INTERVAL,
};
pub use sim::{SimEngine, SimEngineFactory};

use async_trait::async_trait;
use std::fmt::Debug;

/// Result of indexing one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Document was newly created.
    Created,
    /// The engine accepted the request but did not create the document,
    /// typically because the id already exists.
    NotCreated,
}

/// Point-in-time snapshot progress as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapshotStatus {
    pub successful_shards: u32,
    pub total_shards: u32,
}

impl SnapshotStatus {
    /// Complete when every shard succeeded and at least `expected_indices`
    /// indices contributed shards. The second condition guards against the
    /// engine reporting an empty status before the snapshot registers.
    pub fn is_complete(&self, expected_indices: usize) -> bool {
        self.total_shards > 0
            && self.successful_shards == self.total_shards
            && self.total_shards as usize >= expected_indices
    }
}

/// Black-box engine primitives used by the build.
///
/// Per-document failures are reported through [`IndexOutcome`] and never
/// abort a partition; lifecycle failures (start, snapshot, close) are
/// errors.
#[async_trait]
pub trait SearchEngine: Debug + Send + Sync {
    async fn create_index(&self, name: &str, settings: &IndexSettings) -> Result<()>;

    /// Install an index template from raw JSON.
    async fn put_template(&self, name: &str, body: &str) -> Result<()>;

    /// Index one document. `routing_hint` decides the physical shard via the
    /// engine's own routing hash.
    async fn index_doc(
        &self,
        index: &str,
        doc_type: &str,
        doc_id: &str,
        routing_hint: &str,
        json: &str,
    ) -> Result<IndexOutcome>;

    async fn flush(&self, indices: &[String]) -> Result<()>;

    async fn force_merge(&self, indices: &[String]) -> Result<()>;

    /// Begin a snapshot of `indices` into the named repository. Asynchronous;
    /// completion is observed through [`Self::snapshot_status`].
    async fn create_snapshot(&self, repo: &str, snapshot: &str, indices: &[String]) -> Result<()>;

    async fn snapshot_status(&self, repo: &str, snapshot: &str) -> Result<SnapshotStatus>;

    async fn delete_snapshot(&self, repo: &str, snapshot: &str) -> Result<()>;

    async fn delete_index(&self, name: &str) -> Result<()>;

    /// Shut the node down and wait until it is closed.
    async fn close(&self) -> Result<()>;
}

/// Starts engines from settings. Lets the worker defer engine startup until
/// the first record arrives, when the index name and working paths are
/// known.
#[async_trait]
pub trait EngineFactory: Debug + Send + Sync {
    async fn start(&self, settings: &EngineSettings) -> Result<Box<dyn SearchEngine>>;
}
