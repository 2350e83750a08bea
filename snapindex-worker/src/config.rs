//! Job configuration.
//!
//! The surrounding batch framework hands workers a flat string map; the
//! recognised keys are enumerated in [`keys`]. [`JobConfig`] is the parsed,
//! typed form shared by workers and the post-processor.

use crate::error::{Error, Result};
use snapindex_core::shard_config::ShardConfig;
use std::collections::HashMap;
use std::path::PathBuf;

/// Recognised job configuration keys.
pub mod keys {
    /// Local directory the engine snapshots into, per-worker suffixed.
    pub const SNAPSHOT_WORKING_LOCATION: &str = "snapshot.working.location";
    /// Destination repository root: `s3://`, `hdfs://`, or a local path.
    pub const SNAPSHOT_FINAL_DESTINATION: &str = "snapshot.final.destination";
    /// Repository name the snapshot is registered under; unique per run.
    pub const SNAPSHOT_REPO_NAME: &str = "snapshot.repo.name";
    /// Local directory for engine data, per-worker suffixed.
    pub const ES_WORKING_DIR: &str = "es.working.dir";
    pub const NUM_SHARDS_PER_INDEX: &str = "num.shards.per.index";
    pub const NUM_SHARDS_PER_ORG: &str = "num.shards.per.organization";
    /// Bulk size for the legacy bulk-ingest path; the single-document path
    /// ignores it.
    pub const ES_BATCH_COMMIT_SIZE: &str = "es.batch.commit.size";
}

/// Parsed job configuration.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub snapshot_working_location: PathBuf,
    pub snapshot_final_destination: String,
    pub snapshot_repo_name: String,
    pub engine_working_dir: PathBuf,
    pub shard_config: ShardConfig,
    pub batch_commit_size: Option<usize>,
    /// Name the snapshot is created under. Callers running concurrent jobs
    /// must give each run a distinct destination, since root manifests are
    /// keyed by this name.
    pub snapshot_name: String,
    /// Optional index template `(name, json)` installed at engine start.
    pub template: Option<(String, String)>,
    /// Engine plugins loaded by name.
    pub plugins: Vec<String>,
}

impl JobConfig {
    pub fn new(
        snapshot_working_location: impl Into<PathBuf>,
        snapshot_final_destination: impl Into<String>,
        snapshot_repo_name: impl Into<String>,
        engine_working_dir: impl Into<PathBuf>,
        shard_config: ShardConfig,
    ) -> Self {
        Self {
            snapshot_working_location: snapshot_working_location.into(),
            snapshot_final_destination: snapshot_final_destination.into(),
            snapshot_repo_name: snapshot_repo_name.into(),
            engine_working_dir: engine_working_dir.into(),
            shard_config,
            batch_commit_size: None,
            snapshot_name: "snapshot".to_string(),
            template: None,
            plugins: Vec::new(),
        }
    }

    /// Parse from the batch framework's string map.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let require = |key: &str| -> Result<&String> {
            map.get(key)
                .ok_or_else(|| Error::config(format!("missing required key '{key}'")))
        };
        let parse_u32 = |key: &str| -> Result<u32> {
            require(key)?
                .parse::<u32>()
                .map_err(|e| Error::config(format!("invalid '{key}': {e}")))
        };

        let shard_config = ShardConfig::new(
            parse_u32(keys::NUM_SHARDS_PER_INDEX)?,
            parse_u32(keys::NUM_SHARDS_PER_ORG)?,
        );

        let batch_commit_size = map
            .get(keys::ES_BATCH_COMMIT_SIZE)
            .map(|raw| {
                raw.parse::<usize>()
                    .map_err(|e| Error::config(format!("invalid '{}': {e}", keys::ES_BATCH_COMMIT_SIZE)))
            })
            .transpose()?;

        Ok(Self {
            snapshot_working_location: PathBuf::from(require(keys::SNAPSHOT_WORKING_LOCATION)?),
            snapshot_final_destination: require(keys::SNAPSHOT_FINAL_DESTINATION)?.clone(),
            snapshot_repo_name: require(keys::SNAPSHOT_REPO_NAME)?.clone(),
            engine_working_dir: PathBuf::from(require(keys::ES_WORKING_DIR)?),
            shard_config,
            batch_commit_size,
            snapshot_name: "snapshot".to_string(),
            template: None,
            plugins: Vec::new(),
        })
    }

    pub fn with_snapshot_name(mut self, name: impl Into<String>) -> Self {
        self.snapshot_name = name.into();
        self
    }

    pub fn with_template(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.template = Some((name.into(), body.into()));
        self
    }

    pub fn with_plugins(mut self, plugins: Vec<String>) -> Self {
        self.plugins = plugins;
        self
    }

    /// Per-worker suffix so colocated tasks never share directories. The
    /// separator keeps (partition 1, attempt 21) distinct from
    /// (partition 12, attempt 1).
    pub(crate) fn task_suffix(partition: u32, attempt: u32) -> String {
        format!("{partition}-{attempt}")
    }
}
