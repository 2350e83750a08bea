//! Node- and index-level engine settings.
//!
//! Tuned for a single-node, write-only build: no replicas, no periodic
//! refresh, one merge thread, aggressive compression. The node never joins a
//! cluster, so the disk watermarks are pinned high to keep the allocator from
//! relocating shards on a nearly-full batch host.

use std::path::PathBuf;
use std::time::Duration;

/// How often the snapshot poll loop checks status.
pub const SNAPSHOT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default snapshot deadline. The engine's own wait-for-completion caps out
/// around thirty seconds, which a force-merged batch index routinely
/// exceeds, hence the long external deadline.
pub const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Node-level settings for an embedded engine instance.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Unique per partition + attempt so colocated workers never collide.
    pub node_name: String,
    pub cluster_name: String,
    /// Engine home and data directory.
    pub data_dir: PathBuf,
    /// Local filesystem snapshot repository directory.
    pub repo_dir: PathBuf,
    /// Name the snapshot repository is registered under.
    pub repo_name: String,
    pub http_enabled: bool,
    /// In-process transport only; the node never binds a network port.
    pub local_transport: bool,
    pub processors: u32,
    pub memory_lock: bool,
    pub disk_watermark_low: String,
    pub disk_watermark_high: String,
    pub index_buffer_size: String,
    pub fielddata_cache_size: String,
    /// Plugins loaded by name; unresolvable names fail engine start.
    pub plugins: Vec<String>,
}

impl EngineSettings {
    pub fn new(
        node_name: impl Into<String>,
        data_dir: impl Into<PathBuf>,
        repo_dir: impl Into<PathBuf>,
        repo_name: impl Into<String>,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            cluster_name: "snapindex-build".to_string(),
            data_dir: data_dir.into(),
            repo_dir: repo_dir.into(),
            repo_name: repo_name.into(),
            http_enabled: false,
            local_transport: true,
            processors: 1,
            memory_lock: true,
            disk_watermark_low: "99%".to_string(),
            disk_watermark_high: "99%".to_string(),
            index_buffer_size: "5%".to_string(),
            fielddata_cache_size: "0%".to_string(),
            plugins: Vec::new(),
        }
    }

    pub fn with_cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = name.into();
        self
    }

    pub fn with_plugins(mut self, plugins: Vec<String>) -> Self {
        self.plugins = plugins;
        self
    }
}

/// Index-level settings applied at index creation.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    /// `-1` disables periodic refresh; the build refreshes via flush only.
    pub refresh_interval: String,
    pub translog_flush_threshold: String,
    pub max_merged_segment: String,
    pub max_merge_at_once: u32,
    pub segments_per_tier: u32,
    pub merge_max_thread_count: u32,
    pub compound_format: bool,
    pub codec: String,
    pub load_fixed_bitset_filters_eagerly: bool,
}

impl IndexSettings {
    pub fn for_shards(number_of_shards: u32) -> Self {
        Self {
            number_of_shards,
            number_of_replicas: 0,
            refresh_interval: "-1".to_string(),
            translog_flush_threshold: "128mb".to_string(),
            max_merged_segment: "256mb".to_string(),
            max_merge_at_once: 10,
            segments_per_tier: 4,
            merge_max_thread_count: 1,
            compound_format: false,
            codec: "best_compression".to_string(),
            load_fixed_bitset_filters_eagerly: false,
        }
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self::for_shards(1)
    }
}
