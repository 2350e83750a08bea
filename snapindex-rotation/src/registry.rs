//! Watched publication of rotation state.
//!
//! Rebuild jobs publish [`IndexMetadata`] once per index; online hosts look
//! those records up on every request, so reads come from a watched cache
//! rather than the coordinator. A node watch does not survive a session
//! loss, so a reconnect triggers a re-read of every cached path.

use crate::coordinator::{Coordinator, CoordinatorEvent};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use snapindex_core::metadata::{IndexMetadata, PipelineState};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Publication and lookup of rotation state.
///
/// Lookups are infallible: a missing record, a malformed record, or a
/// coordinator read failure all degrade to a shell record carrying only the
/// birth name, so online callers fall back to the live index.
#[async_trait]
pub trait RotationRegistry: Debug + Send + Sync {
    /// Publish metadata for a rebuilt index. Fatal on coordinator failure.
    async fn publish_index(&self, meta: &IndexMetadata) -> Result<()>;

    async fn lookup_index(&self, index_name_at_birth: &str) -> IndexMetadata;

    async fn set_pipeline_state(&self, state: PipelineState) -> Result<()>;

    /// Current pipeline state; [`PipelineState::Complete`] when unset.
    async fn get_pipeline_state(&self) -> PipelineState;
}

type NodeCache = Arc<RwLock<HashMap<String, Option<Vec<u8>>>>>;

/// Registry over a [`Coordinator`].
pub struct CoordRotationRegistry {
    coordinator: Arc<dyn Coordinator>,
    cache: NodeCache,
    index_base: String,
    state_path: String,
}

impl Debug for CoordRotationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordRotationRegistry")
            .field("index_base", &self.index_base)
            .field("cached_paths", &self.cache.read().len())
            .finish()
    }
}

impl CoordRotationRegistry {
    /// Build a registry rooted at `base` and start its watcher. The node
    /// layout is `<base>/indexes/<indexNameAtBirth>` plus a single
    /// `<base>/pipelineState` cell.
    pub fn new(coordinator: Arc<dyn Coordinator>, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let registry = Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            index_base: format!("{base}/indexes"),
            state_path: format!("{base}/pipelineState"),
            coordinator,
        };
        spawn_watcher(
            Arc::downgrade(&registry.cache),
            Arc::clone(&registry.coordinator),
        );
        registry
    }

    fn index_path(&self, index_name_at_birth: &str) -> String {
        format!("{}/{}", self.index_base, index_name_at_birth)
    }

    /// Cached read of one node, populating the cache on first access.
    async fn cached_get(&self, path: &str) -> Option<Vec<u8>> {
        if let Some(entry) = self.cache.read().get(path) {
            return entry.clone();
        }
        match self.coordinator.get(path).await {
            Ok(data) => {
                self.cache
                    .write()
                    .insert(path.to_string(), data.clone());
                data
            }
            // Not cached: the next call retries the coordinator.
            Err(e) => {
                warn!(path, error = %e, "coordinator read failed");
                None
            }
        }
    }
}

#[async_trait]
impl RotationRegistry for CoordRotationRegistry {
    async fn publish_index(&self, meta: &IndexMetadata) -> Result<()> {
        let path = self.index_path(&meta.index_name_at_birth);
        let encoded = serde_json::to_vec(meta)?;
        self.coordinator.ensure_path(&path).await?;
        self.coordinator.set(&path, &encoded).await?;
        info!(index = %meta.index_name_at_birth, "published index metadata");
        Ok(())
    }

    async fn lookup_index(&self, index_name_at_birth: &str) -> IndexMetadata {
        let path = self.index_path(index_name_at_birth);
        match self.cached_get(&path).await {
            Some(bytes) if !bytes.is_empty() => match serde_json::from_slice(&bytes) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(index = index_name_at_birth, error = %e, "malformed metadata record");
                    IndexMetadata::shell(index_name_at_birth)
                }
            },
            _ => IndexMetadata::shell(index_name_at_birth),
        }
    }

    async fn set_pipeline_state(&self, state: PipelineState) -> Result<()> {
        self.coordinator.ensure_path(&self.state_path).await?;
        self.coordinator
            .set(&self.state_path, state.as_str().as_bytes())
            .await?;
        info!(state = state.as_str(), "pipeline state updated");
        Ok(())
    }

    async fn get_pipeline_state(&self) -> PipelineState {
        match self.cached_get(&self.state_path).await {
            Some(bytes) if !bytes.is_empty() => {
                match std::str::from_utf8(&bytes).ok().and_then(|raw| PipelineState::parse(raw).ok()) {
                    Some(state) => state,
                    None => {
                        warn!("unreadable pipeline state cell, assuming complete");
                        PipelineState::Complete
                    }
                }
            }
            _ => PipelineState::Complete,
        }
    }
}

/// Forward watch events into the cache and rebuild it after reconnects.
/// Holds the cache weakly so the task ends when the registry is dropped.
fn spawn_watcher(cache: Weak<RwLock<HashMap<String, Option<Vec<u8>>>>>, coordinator: Arc<dyn Coordinator>) {
    let mut events = coordinator.events();
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "watcher lagged behind coordinator events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Some(cache) = cache.upgrade() else { break };

            match event {
                CoordinatorEvent::NodeData { path, data } => {
                    let mut guard = cache.write();
                    if let Some(entry) = guard.get_mut(&path) {
                        debug!(path, "watched node updated");
                        *entry = data;
                    }
                }
                CoordinatorEvent::Reconnected => {
                    let paths: Vec<String> = cache.read().keys().cloned().collect();
                    info!(count = paths.len(), "rebuilding watched cache after reconnect");
                    for path in paths {
                        match coordinator.get(&path).await {
                            Ok(data) => {
                                cache.write().insert(path, data);
                            }
                            Err(e) => {
                                warn!(path, error = %e, "re-read after reconnect failed");
                            }
                        }
                    }
                }
            }
        }
    });
}

/// Registry for deployments without a coordination service: publishes
/// nowhere and answers every lookup with the live index.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRotationRegistry;

#[async_trait]
impl RotationRegistry for NoopRotationRegistry {
    async fn publish_index(&self, meta: &IndexMetadata) -> Result<()> {
        debug!(index = %meta.index_name_at_birth, "noop registry ignoring publish");
        Ok(())
    }

    async fn lookup_index(&self, index_name_at_birth: &str) -> IndexMetadata {
        IndexMetadata::shell(index_name_at_birth)
    }

    async fn set_pipeline_state(&self, _state: PipelineState) -> Result<()> {
        Ok(())
    }

    async fn get_pipeline_state(&self) -> PipelineState {
        PipelineState::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::MemoryCoordinator;
    use chrono::NaiveDate;

    fn sample_meta() -> IndexMetadata {
        IndexMetadata {
            index_name_at_birth: "c140101".to_string(),
            rebuilt_index_name: Some("c140101_v2_snapshot".to_string()),
            rebuilt_index_alias: Some("c140101_v2".to_string()),
            index_date: NaiveDate::from_ymd_opt(2014, 1, 1),
            num_shards: 5,
            num_shards_per_org: 2,
            routing_strategy_class_name: Some("v1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_publish_then_lookup() {
        let coord = Arc::new(MemoryCoordinator::new());
        let registry = CoordRotationRegistry::new(coord, "/snapindex");

        let meta = sample_meta();
        registry.publish_index(&meta).await.unwrap();
        assert_eq!(registry.lookup_index("c140101").await, meta);
    }

    #[tokio::test]
    async fn test_lookup_missing_returns_shell() {
        let coord = Arc::new(MemoryCoordinator::new());
        let registry = CoordRotationRegistry::new(coord, "/snapindex");

        let meta = registry.lookup_index("never-published").await;
        assert_eq!(meta, IndexMetadata::shell("never-published"));
    }

    #[tokio::test]
    async fn test_publish_failure_is_fatal() {
        let coord = Arc::new(MemoryCoordinator::new());
        let registry = CoordRotationRegistry::new(Arc::clone(&coord) as Arc<dyn Coordinator>, "/snapindex");

        coord.set_fail_writes(true);
        assert!(registry.publish_index(&sample_meta()).await.is_err());
    }

    #[tokio::test]
    async fn test_pipeline_state_defaults_complete() {
        let coord = Arc::new(MemoryCoordinator::new());
        let registry = CoordRotationRegistry::new(coord, "/snapindex");

        assert_eq!(
            registry.get_pipeline_state().await,
            PipelineState::Complete
        );
        registry
            .set_pipeline_state(PipelineState::Running)
            .await
            .unwrap();
        // Allow the watch event to land in the cache
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(registry.get_pipeline_state().await, PipelineState::Running);
    }

    #[tokio::test]
    async fn test_watch_propagates_updates() {
        let coord = Arc::new(MemoryCoordinator::new());
        let registry =
            CoordRotationRegistry::new(Arc::clone(&coord) as Arc<dyn Coordinator>, "/snapindex");

        let mut meta = sample_meta();
        registry.publish_index(&meta).await.unwrap();
        assert_eq!(registry.lookup_index("c140101").await, meta);

        // Republish with a new alias; the cached entry follows the watch
        meta.rebuilt_index_alias = Some("c140101_v3".to_string());
        registry.publish_index(&meta).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(registry.lookup_index("c140101").await, meta);
    }

    #[tokio::test]
    async fn test_reconnect_rebuilds_cached_watchers() {
        let coord = Arc::new(MemoryCoordinator::new());
        let registry =
            CoordRotationRegistry::new(Arc::clone(&coord) as Arc<dyn Coordinator>, "/snapindex");

        let meta = sample_meta();
        registry.publish_index(&meta).await.unwrap();
        assert_eq!(registry.lookup_index("c140101").await, meta);

        // A write lands while the session is down, so no watch event fires
        let mut updated = meta.clone();
        updated.rebuilt_index_alias = Some("c140101_v9".to_string());
        coord.set_silent(
            "/snapindex/indexes/c140101",
            &serde_json::to_vec(&updated).unwrap(),
        );
        assert_eq!(registry.lookup_index("c140101").await, meta);

        coord.simulate_reconnect();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(registry.lookup_index("c140101").await, updated);
    }

    #[tokio::test]
    async fn test_malformed_record_degrades_to_shell() {
        let coord = Arc::new(MemoryCoordinator::new());
        coord.set("/snapindex/indexes/bad", b"not json").await.unwrap();
        let registry =
            CoordRotationRegistry::new(Arc::clone(&coord) as Arc<dyn Coordinator>, "/snapindex");

        assert_eq!(
            registry.lookup_index("bad").await,
            IndexMetadata::shell("bad")
        );
    }

    #[tokio::test]
    async fn test_noop_registry() {
        let registry = NoopRotationRegistry;
        registry.publish_index(&sample_meta()).await.unwrap();
        assert_eq!(
            registry.lookup_index("c140101").await,
            IndexMetadata::shell("c140101")
        );
        assert_eq!(registry.get_pipeline_state().await, PipelineState::Complete);
    }
}
