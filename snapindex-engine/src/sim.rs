//! In-process engine simulation for tests.
//!
//! [`SimEngine`] keeps documents in memory, routes each one by the engine
//! routing hash over its routing hint, and on snapshot materialises the real
//! repository layout on local disk: root manifests, a per-index manifest,
//! and one directory per shard id, where the data-bearing shards hold the
//! serialised documents and are therefore strictly larger than empty ones.
//! Transport and post-processor tests run end to end against the directories
//! it produces.

use crate::error::{Error, Result};
use crate::settings::{EngineSettings, IndexSettings};
use crate::{EngineFactory, IndexOutcome, SearchEngine, SnapshotStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use snapindex_core::hash::engine_shard;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct SimDoc {
    doc_type: String,
    doc_id: String,
    routing_hint: String,
    json: String,
}

#[derive(Debug)]
struct SimIndex {
    num_shards: u32,
    docs: Vec<SimDoc>,
    doc_ids: HashSet<String>,
}

#[derive(Debug, Default)]
struct SimState {
    templates: HashMap<String, String>,
    indices: HashMap<String, SimIndex>,
    /// Snapshot name to (index name, shard count) pairs.
    snapshots: HashMap<String, Vec<(String, u32)>>,
    flushes: u64,
    merges: u64,
    closed: bool,
}

/// Filesystem-backed engine simulation.
pub struct SimEngine {
    repo_dir: PathBuf,
    state: Mutex<SimState>,
}

impl std::fmt::Debug for SimEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEngine")
            .field("repo_dir", &self.repo_dir)
            .finish()
    }
}

impl SimEngine {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            state: Mutex::new(SimState::default()),
        }
    }

    pub fn flush_count(&self) -> u64 {
        self.state.lock().flushes
    }

    pub fn merge_count(&self) -> u64 {
        self.state.lock().merges
    }

    pub fn template(&self, name: &str) -> Option<String> {
        self.state.lock().templates.get(name).cloned()
    }

    fn check_open(state: &SimState) -> Result<()> {
        if state.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Write the repository layout for one snapshot. Contents are
    /// deterministic so retried tasks produce identical bytes.
    fn materialise(&self, snapshot: &str, state: &SimState, members: &[(String, u32)]) -> Result<()> {
        let repo = &self.repo_dir;
        std::fs::create_dir_all(repo)?;

        let snapshot_names: Vec<&str> = {
            let mut names: Vec<&str> = state.snapshots.keys().map(String::as_str).collect();
            names.sort_unstable();
            names
        };
        let index_names: Vec<&str> = members.iter().map(|(n, _)| n.as_str()).collect();

        std::fs::write(
            repo.join("index"),
            serde_json::to_vec(&serde_json::json!({ "snapshots": snapshot_names }))?,
        )?;
        std::fs::write(
            repo.join(format!("metadata-{snapshot}")),
            serde_json::to_vec(&serde_json::json!({ "indices": index_names }))?,
        )?;
        std::fs::write(
            repo.join(format!("snapshot-{snapshot}")),
            serde_json::to_vec(&serde_json::json!({
                "snapshot": snapshot,
                "indices": index_names,
                "state": "SUCCESS",
            }))?,
        )?;

        for (index_name, num_shards) in members {
            let index = state
                .indices
                .get(index_name)
                .ok_or_else(|| Error::index(format!("unknown index '{index_name}'")))?;
            let index_dir = repo.join("indices").join(index_name);
            std::fs::create_dir_all(&index_dir)?;
            std::fs::write(
                index_dir.join(format!("snapshot-{snapshot}")),
                serde_json::to_vec(&serde_json::json!({
                    "index": index_name,
                    "num_shards": num_shards,
                }))?,
            )?;

            let mut by_shard: BTreeMap<u32, Vec<&SimDoc>> = BTreeMap::new();
            for doc in &index.docs {
                by_shard
                    .entry(engine_shard(&doc.routing_hint, index.num_shards))
                    .or_default()
                    .push(doc);
            }

            for shard in 0..*num_shards {
                let shard_dir = index_dir.join(shard.to_string());
                std::fs::create_dir_all(&shard_dir)?;
                std::fs::write(shard_dir.join("__state"), b"{}")?;
                if let Some(docs) = by_shard.get(&shard) {
                    let mut body = String::new();
                    for doc in docs {
                        body.push_str(&format!(
                            "{}|{}|{}|{}\n",
                            doc.doc_type, doc.doc_id, doc.routing_hint, doc.json
                        ));
                    }
                    std::fs::write(shard_dir.join("__docs"), body)?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SearchEngine for SimEngine {
    async fn create_index(&self, name: &str, settings: &IndexSettings) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        if state.indices.contains_key(name) {
            return Err(Error::index(format!("index '{name}' already exists")));
        }
        state.indices.insert(
            name.to_string(),
            SimIndex {
                num_shards: settings.number_of_shards,
                docs: Vec::new(),
                doc_ids: HashSet::new(),
            },
        );
        debug!(index = name, shards = settings.number_of_shards, "index created");
        Ok(())
    }

    async fn put_template(&self, name: &str, body: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        state.templates.insert(name.to_string(), body.to_string());
        Ok(())
    }

    async fn index_doc(
        &self,
        index: &str,
        doc_type: &str,
        doc_id: &str,
        routing_hint: &str,
        json: &str,
    ) -> Result<IndexOutcome> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        let Some(sim_index) = state.indices.get_mut(index) else {
            return Err(Error::index(format!("unknown index '{index}'")));
        };
        if !sim_index.doc_ids.insert(doc_id.to_string()) {
            return Ok(IndexOutcome::NotCreated);
        }
        sim_index.docs.push(SimDoc {
            doc_type: doc_type.to_string(),
            doc_id: doc_id.to_string(),
            routing_hint: routing_hint.to_string(),
            json: json.to_string(),
        });
        Ok(IndexOutcome::Created)
    }

    async fn flush(&self, _indices: &[String]) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        state.flushes += 1;
        Ok(())
    }

    async fn force_merge(&self, _indices: &[String]) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        state.merges += 1;
        Ok(())
    }

    async fn create_snapshot(&self, _repo: &str, snapshot: &str, indices: &[String]) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        let members: Vec<(String, u32)> = indices
            .iter()
            .filter_map(|name| match state.indices.get(name) {
                Some(index) => Some((name.clone(), index.num_shards)),
                None => {
                    warn!(index = %name, "snapshot requested for unknown index");
                    None
                }
            })
            .collect();
        state.snapshots.insert(snapshot.to_string(), members.clone());
        self.materialise(snapshot, &state, &members)
    }

    async fn snapshot_status(&self, _repo: &str, snapshot: &str) -> Result<SnapshotStatus> {
        let state = self.state.lock();
        Self::check_open(&state)?;
        let total: u32 = state
            .snapshots
            .get(snapshot)
            .map(|members| members.iter().map(|(_, shards)| shards).sum())
            .unwrap_or(0);
        // Local-disk snapshots complete as soon as they are written.
        Ok(SnapshotStatus {
            successful_shards: total,
            total_shards: total,
        })
    }

    async fn delete_snapshot(&self, _repo: &str, snapshot: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        let Some(members) = state.snapshots.remove(snapshot) else {
            return Ok(());
        };
        remove_file_if_present(self.repo_dir.join(format!("metadata-{snapshot}")))?;
        remove_file_if_present(self.repo_dir.join(format!("snapshot-{snapshot}")))?;
        for (index_name, _) in members {
            let index_dir = self.repo_dir.join("indices").join(index_name);
            if index_dir.exists() {
                std::fs::remove_dir_all(&index_dir)?;
            }
        }
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        state.indices.remove(name);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

fn remove_file_if_present(path: PathBuf) -> Result<()> {
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Starts [`SimEngine`] instances. The simulation loads no plugins, so any
/// requested plugin name fails start the way a missing plugin would.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimEngineFactory;

#[async_trait]
impl EngineFactory for SimEngineFactory {
    async fn start(&self, settings: &EngineSettings) -> Result<Box<dyn SearchEngine>> {
        if let Some(plugin) = settings.plugins.first() {
            return Err(Error::plugin(plugin.clone()));
        }
        Ok(Box::new(SimEngine::new(settings.repo_dir.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dir_size(path: &std::path::Path) -> u64 {
        let mut total = 0;
        for entry in std::fs::read_dir(path).unwrap() {
            let entry = entry.unwrap();
            if entry.path().is_dir() {
                total += dir_size(&entry.path());
            } else {
                total += entry.metadata().unwrap().len();
            }
        }
        total
    }

    #[tokio::test]
    async fn test_snapshot_layout_single_data_shard() {
        let tmp = TempDir::new().unwrap();
        let engine = SimEngine::new(tmp.path());

        engine
            .create_index("c150201", &IndexSettings::for_shards(5))
            .await
            .unwrap();
        // One partition shares one routing hint, so all docs land together.
        for i in 0..20 {
            engine
                .index_doc("c150201", "conversation", &format!("doc-{i}"), "3", r#"{"f":1}"#)
                .await
                .unwrap();
        }
        engine
            .create_snapshot("repo", "snapshot", &["c150201".to_string()])
            .await
            .unwrap();

        assert!(tmp.path().join("index").exists());
        assert!(tmp.path().join("metadata-snapshot").exists());
        assert!(tmp.path().join("snapshot-snapshot").exists());
        let index_dir = tmp.path().join("indices").join("c150201");
        assert!(index_dir.join("snapshot-snapshot").exists());

        let data_shard = engine_shard("3", 5);
        let mut non_empty = Vec::new();
        for shard in 0..5u32 {
            let shard_dir = index_dir.join(shard.to_string());
            assert!(shard_dir.is_dir());
            if shard_dir.join("__docs").exists() {
                non_empty.push(shard);
            }
        }
        assert_eq!(non_empty, vec![data_shard]);

        // The data shard is strictly the largest.
        let data_size = dir_size(&index_dir.join(data_shard.to_string()));
        for shard in (0..5u32).filter(|s| *s != data_shard) {
            assert!(data_size > dir_size(&index_dir.join(shard.to_string())));
        }
    }

    #[tokio::test]
    async fn test_duplicate_doc_id_not_created() {
        let tmp = TempDir::new().unwrap();
        let engine = SimEngine::new(tmp.path());
        engine
            .create_index("c150201", &IndexSettings::for_shards(1))
            .await
            .unwrap();

        let first = engine
            .index_doc("c150201", "conversation", "doc-1", "0", "{}")
            .await
            .unwrap();
        let second = engine
            .index_doc("c150201", "conversation", "doc-1", "0", "{}")
            .await
            .unwrap();
        assert_eq!(first, IndexOutcome::Created);
        assert_eq!(second, IndexOutcome::NotCreated);
    }

    #[tokio::test]
    async fn test_delete_snapshot_removes_repo_files() {
        let tmp = TempDir::new().unwrap();
        let engine = SimEngine::new(tmp.path());
        engine
            .create_index("c150201", &IndexSettings::for_shards(2))
            .await
            .unwrap();
        engine
            .create_snapshot("repo", "snapshot", &["c150201".to_string()])
            .await
            .unwrap();
        engine.delete_snapshot("repo", "snapshot").await.unwrap();

        assert!(!tmp.path().join("metadata-snapshot").exists());
        assert!(!tmp.path().join("snapshot-snapshot").exists());
        assert!(!tmp.path().join("indices").join("c150201").exists());
    }

    #[tokio::test]
    async fn test_factory_rejects_unknown_plugin() {
        let settings = EngineSettings::new("n", "/tmp/none", "/tmp/none-repo", "repo")
            .with_plugins(vec!["vector-scoring".to_string()]);
        let err = SimEngineFactory.start(&settings).await.unwrap_err();
        assert!(matches!(err, Error::Plugin(_)));
    }

    #[tokio::test]
    async fn test_closed_engine_rejects_operations() {
        let tmp = TempDir::new().unwrap();
        let engine = SimEngine::new(tmp.path());
        engine.close().await.unwrap();
        let err = engine
            .create_index("c150201", &IndexSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Closed));
    }
}
