//! Scoped embedded-engine container.
//!
//! Owns the engine's data directory and local snapshot repository for the
//! lifetime of one build task and removes both when the task ends, so a
//! retried task on the same host starts from clean disk.

use crate::error::{Error, Result};
use crate::settings::{
    EngineSettings, IndexSettings, DEFAULT_SNAPSHOT_TIMEOUT, SNAPSHOT_POLL_INTERVAL,
};
use crate::{EngineFactory, IndexOutcome, SearchEngine};
use snapindex_core::progress::{JobCounter, Reporter};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Builder for [`EmbeddedEngine`].
#[derive(Debug)]
pub struct EmbeddedEngineBuilder {
    settings: EngineSettings,
    template: Option<(String, String)>,
    snapshot_timeout: Duration,
    poll_interval: Duration,
}

impl EmbeddedEngineBuilder {
    pub fn new(
        node_name: impl Into<String>,
        data_dir: impl Into<PathBuf>,
        repo_dir: impl Into<PathBuf>,
        repo_name: impl Into<String>,
    ) -> Self {
        Self {
            settings: EngineSettings::new(node_name, data_dir, repo_dir, repo_name),
            template: None,
            snapshot_timeout: DEFAULT_SNAPSHOT_TIMEOUT,
            poll_interval: SNAPSHOT_POLL_INTERVAL,
        }
    }

    pub fn with_cluster_name(mut self, name: impl Into<String>) -> Self {
        self.settings = self.settings.with_cluster_name(name);
        self
    }

    /// Install an index template once the node is up.
    pub fn with_template(mut self, name: impl Into<String>, body: impl Into<String>) -> Self {
        self.template = Some((name.into(), body.into()));
        self
    }

    /// Plugins loaded by name; an unresolvable name fails start.
    pub fn with_plugins(mut self, plugins: Vec<String>) -> Self {
        self.settings.plugins = plugins;
        self
    }

    pub fn with_snapshot_timeout(mut self, timeout: Duration) -> Self {
        self.snapshot_timeout = timeout;
        self
    }

    #[cfg(test)]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Create the working directories, start the engine, and install the
    /// template if one was given.
    pub async fn start(self, factory: &dyn EngineFactory) -> Result<EmbeddedEngine> {
        tokio::fs::create_dir_all(&self.settings.data_dir).await?;
        tokio::fs::create_dir_all(&self.settings.repo_dir).await?;

        let engine = factory.start(&self.settings).await?;
        info!(node = %self.settings.node_name, data_dir = %self.settings.data_dir.display(),
              "embedded engine started");

        if let Some((name, body)) = &self.template {
            engine.put_template(name, body).await?;
            debug!(template = %name, "index template installed");
        }

        Ok(EmbeddedEngine {
            engine,
            settings: self.settings,
            snapshot_timeout: self.snapshot_timeout,
            poll_interval: self.poll_interval,
            cleaned: false,
        })
    }
}

/// A running embedded engine plus the directories it owns.
#[derive(Debug)]
pub struct EmbeddedEngine {
    engine: Box<dyn SearchEngine>,
    settings: EngineSettings,
    snapshot_timeout: Duration,
    poll_interval: Duration,
    cleaned: bool,
}

impl EmbeddedEngine {
    pub fn repo_name(&self) -> &str {
        &self.settings.repo_name
    }

    /// Local directory the snapshot repository writes into.
    pub fn repo_dir(&self) -> &Path {
        &self.settings.repo_dir
    }

    pub fn snapshot_timeout(&self) -> Duration {
        self.snapshot_timeout
    }

    pub async fn create_index(&self, name: &str, num_shards: u32) -> Result<()> {
        self.engine
            .create_index(name, &IndexSettings::for_shards(num_shards))
            .await
    }

    pub async fn index_doc(
        &self,
        index: &str,
        doc_type: &str,
        doc_id: &str,
        routing_hint: &str,
        json: &str,
    ) -> Result<IndexOutcome> {
        self.engine
            .index_doc(index, doc_type, doc_id, routing_hint, json)
            .await
    }

    pub async fn delete_index(&self, name: &str) -> Result<()> {
        self.engine.delete_index(name).await
    }

    pub async fn delete_snapshot(&self, snapshot: &str) -> Result<()> {
        self.engine
            .delete_snapshot(&self.settings.repo_name, snapshot)
            .await
    }

    /// Flush and force-merge each index, then snapshot them all and poll
    /// until every shard reports success or the deadline elapses.
    ///
    /// The engine's built-in wait-for-completion silently caps at around
    /// thirty seconds, so completion is observed by polling the snapshot
    /// status, pinging `reporter` each iteration so the host scheduler does
    /// not kill the task as unresponsive.
    pub async fn snapshot(
        &self,
        indices: &[String],
        snapshot: &str,
        reporter: &dyn Reporter,
    ) -> Result<()> {
        for index in indices {
            let one = std::slice::from_ref(index);

            let started = Instant::now();
            self.engine.flush(one).await?;
            reporter.incr(
                JobCounter::TimeSpentFlushingMs,
                started.elapsed().as_millis() as u64,
            );
            reporter.keep_alive();

            let started = Instant::now();
            self.engine.force_merge(one).await?;
            reporter.incr(
                JobCounter::TimeSpentMergingMs,
                started.elapsed().as_millis() as u64,
            );
            reporter.keep_alive();
        }

        let started = Instant::now();
        self.engine
            .create_snapshot(&self.settings.repo_name, snapshot, indices)
            .await?;

        loop {
            let status = self
                .engine
                .snapshot_status(&self.settings.repo_name, snapshot)
                .await?;
            reporter.keep_alive();

            if status.is_complete(indices.len()) {
                reporter.incr(
                    JobCounter::TimeSpentSnapshottingMs,
                    started.elapsed().as_millis() as u64,
                );
                debug!(snapshot, shards = status.total_shards, "snapshot complete");
                return Ok(());
            }

            let elapsed = started.elapsed();
            if elapsed >= self.snapshot_timeout {
                return Err(Error::SnapshotTimeout {
                    snapshot: snapshot.to_string(),
                    elapsed_ms: elapsed.as_millis() as u64,
                    successful: status.successful_shards,
                    total: status.total_shards,
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Close the node and remove the data and snapshot working directories.
    pub async fn close(mut self) -> Result<()> {
        self.engine.close().await?;
        remove_dir_if_present(&self.settings.data_dir).await;
        remove_dir_if_present(&self.settings.repo_dir).await;
        self.cleaned = true;
        info!(node = %self.settings.node_name, "embedded engine closed");
        Ok(())
    }
}

impl Drop for EmbeddedEngine {
    fn drop(&mut self) {
        // Last-resort cleanup when close() was never reached.
        if !self.cleaned {
            let _ = std::fs::remove_dir_all(&self.settings.data_dir);
            let _ = std::fs::remove_dir_all(&self.settings.repo_dir);
        }
    }
}

async fn remove_dir_if_present(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %dir.display(), error = %e, "failed to remove working directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimEngineFactory;
    use snapindex_core::progress::MemoryReporter;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_snapshot_protocol_records_counters() {
        let tmp = TempDir::new().unwrap();
        let engine = EmbeddedEngineBuilder::new(
            "node-0-0",
            tmp.path().join("data"),
            tmp.path().join("repo"),
            "build-repo",
        )
        .with_poll_interval(Duration::from_millis(5))
        .start(&SimEngineFactory)
        .await
        .unwrap();

        engine.create_index("c150201", 5).await.unwrap();
        engine
            .index_doc("c150201", "conversation", "doc-1", "0", r#"{"f":1}"#)
            .await
            .unwrap();

        let reporter = MemoryReporter::new();
        engine
            .snapshot(&["c150201".to_string()], "snapshot", &reporter)
            .await
            .unwrap();

        assert!(reporter.keep_alives() >= 1);
        assert!(tmp.path().join("repo").join("snapshot-snapshot").exists());

        engine.close().await.unwrap();
        assert!(!tmp.path().join("data").exists());
        assert!(!tmp.path().join("repo").exists());
    }

    #[tokio::test]
    async fn test_snapshot_timeout_when_engine_stalls() {
        let tmp = TempDir::new().unwrap();
        let engine = EmbeddedEngineBuilder::new(
            "node-0-1",
            tmp.path().join("data"),
            tmp.path().join("repo"),
            "build-repo",
        )
        .with_snapshot_timeout(Duration::from_millis(20))
        .with_poll_interval(Duration::from_millis(5))
        .start(&SimEngineFactory)
        .await
        .unwrap();

        // No indices were created, so the snapshot never reports shards.
        let reporter = MemoryReporter::new();
        let err = engine
            .snapshot(&["missing".to_string()], "snapshot", &reporter)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SnapshotTimeout { .. }));

        engine.close().await.unwrap();
    }
}
