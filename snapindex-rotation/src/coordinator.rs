//! Coordination-service seam.
//!
//! The registry needs a durable key/value store with node watches and a
//! reconnect signal. [`Coordinator`] captures exactly that surface, keeping
//! the concrete coordination client an integration concern;
//! [`MemoryCoordinator`] backs tests and single-process runs.

use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events observed by watchers.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// A watched node's data changed (or the node was deleted).
    NodeData {
        path: String,
        data: Option<Vec<u8>>,
    },
    /// The session was re-established. Node watches do not survive a
    /// disconnect, so subscribers must re-read anything they cache.
    Reconnected,
}

/// Watched key/value store used for index rotation.
#[async_trait]
pub trait Coordinator: Debug + Send + Sync {
    /// Read node data. `Ok(None)` when the node does not exist.
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Set node data, creating the node when absent.
    async fn set(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Create a node and any missing ancestors; existing nodes are left
    /// untouched.
    async fn ensure_path(&self, path: &str) -> Result<()>;

    /// Subscribe to node-data and connection events.
    fn events(&self) -> broadcast::Receiver<CoordinatorEvent>;
}

/// In-memory coordinator.
#[derive(Clone)]
pub struct MemoryCoordinator {
    nodes: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    event_tx: broadcast::Sender<CoordinatorEvent>,
    fail_writes: Arc<AtomicBool>,
}

impl Debug for MemoryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCoordinator")
            .field("node_count", &self.nodes.read().len())
            .finish()
    }
}

impl Default for MemoryCoordinator {
    fn default() -> Self {
        let (event_tx, _event_rx) = broadcast::channel(128);
        Self {
            nodes: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail, for exercising fatal-publish paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Set node data without emitting a watch event, simulating a write
    /// that happened while this client's session was down.
    pub fn set_silent(&self, path: &str, data: &[u8]) {
        self.nodes.write().insert(path.to_string(), data.to_vec());
    }

    /// Emit a reconnect event, as after a session loss and recovery.
    pub fn simulate_reconnect(&self) {
        let _ = self.event_tx.send(CoordinatorEvent::Reconnected);
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.nodes.read().get(path).cloned())
    }

    async fn set(&self, path: &str, data: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::coordinator("simulated write failure"));
        }
        self.nodes.write().insert(path.to_string(), data.to_vec());
        let _ = self.event_tx.send(CoordinatorEvent::NodeData {
            path: path.to_string(),
            data: Some(data.to_vec()),
        });
        Ok(())
    }

    async fn ensure_path(&self, path: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::coordinator("simulated write failure"));
        }
        let mut nodes = self.nodes.write();
        let mut ancestor = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            ancestor.push('/');
            ancestor.push_str(segment);
            nodes.entry(ancestor.clone()).or_default();
        }
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let coord = MemoryCoordinator::new();
        assert_eq!(coord.get("/indexes/a").await.unwrap(), None);
        coord.set("/indexes/a", b"payload").await.unwrap();
        assert_eq!(
            coord.get("/indexes/a").await.unwrap(),
            Some(b"payload".to_vec())
        );
    }

    #[tokio::test]
    async fn test_ensure_path_creates_ancestors() {
        let coord = MemoryCoordinator::new();
        coord.ensure_path("/indexes/sub/a").await.unwrap();
        assert_eq!(coord.get("/indexes").await.unwrap(), Some(Vec::new()));
        assert_eq!(coord.get("/indexes/sub/a").await.unwrap(), Some(Vec::new()));

        // Re-ensuring does not clobber data
        coord.set("/indexes/sub/a", b"data").await.unwrap();
        coord.ensure_path("/indexes/sub/a").await.unwrap();
        assert_eq!(
            coord.get("/indexes/sub/a").await.unwrap(),
            Some(b"data".to_vec())
        );
    }

    #[tokio::test]
    async fn test_set_emits_watch_event() {
        let coord = MemoryCoordinator::new();
        let mut rx = coord.events();
        coord.set("/indexes/a", b"v1").await.unwrap();
        match rx.recv().await.unwrap() {
            CoordinatorEvent::NodeData { path, data } => {
                assert_eq!(path, "/indexes/a");
                assert_eq!(data, Some(b"v1".to_vec()));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
