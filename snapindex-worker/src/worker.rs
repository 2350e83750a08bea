//! Partition worker.
//!
//! One worker consumes one partition: an ordered stream of records that all
//! share a routing key `<indexName>|<routingHint>`. It indexes every
//! document into its own embedded engine, snapshots the resulting
//! single-shard index, stitches the snapshot into the shared destination,
//! and emits the index name for the post-processing barrier.

use crate::config::JobConfig;
use crate::error::Result;
use snapindex_core::progress::{JobCounter, Reporter};
use snapindex_core::record::{DocumentPayload, RoutingKey};
use snapindex_engine::{EmbeddedEngine, EmbeddedEngineBuilder, EngineFactory, IndexOutcome};
use snapindex_transport::transport_for;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

struct WorkerState {
    engine: EmbeddedEngine,
    index_name: String,
    routing_hint: String,
}

/// Builds one shard's worth of one index from a partition of records.
pub struct IndexerWorker {
    config: JobConfig,
    factory: Arc<dyn EngineFactory>,
    reporter: Arc<dyn Reporter>,
    partition: u32,
    attempt: u32,
    state: Option<WorkerState>,
}

impl IndexerWorker {
    pub fn new(
        config: JobConfig,
        factory: Arc<dyn EngineFactory>,
        reporter: Arc<dyn Reporter>,
        partition: u32,
        attempt: u32,
    ) -> Self {
        Self {
            config,
            factory,
            reporter,
            partition,
            attempt,
            state: None,
        }
    }

    fn data_dir(&self) -> PathBuf {
        self.config
            .engine_working_dir
            .join(JobConfig::task_suffix(self.partition, self.attempt))
    }

    fn repo_dir(&self) -> PathBuf {
        self.config
            .snapshot_working_location
            .join(JobConfig::task_suffix(self.partition, self.attempt))
    }

    /// Consume the partition. Returns the index name once its snapshot has
    /// been transported, or `None` for an empty partition. The engine and
    /// its working directories are released on every exit path.
    pub async fn run<I>(mut self, records: I) -> Result<Option<String>>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut result = self.consume(records).await;
        if result.is_ok() {
            result = self.finish().await;
        }
        self.close().await;
        result
    }

    async fn consume<I>(&mut self, records: I) -> Result<Option<String>>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in records {
            if self.state.is_none() {
                self.setup(&key).await?;
            }
            self.index_record(&value).await;
        }
        Ok(None)
    }

    /// Start the engine and create the index, keyed off the first record.
    async fn setup(&mut self, key: &str) -> Result<()> {
        let routing_key = RoutingKey::parse(key)?;
        let num_shards = self
            .config
            .shard_config
            .shards_for_index(&routing_key.index_name);

        let mut builder = EmbeddedEngineBuilder::new(
            format!("worker-{}-{}", self.partition, self.attempt),
            self.data_dir(),
            self.repo_dir(),
            self.config.snapshot_repo_name.clone(),
        )
        .with_plugins(self.config.plugins.clone());
        if let Some((name, body)) = &self.config.template {
            builder = builder.with_template(name.clone(), body.clone());
        }

        let engine = builder.start(self.factory.as_ref()).await?;
        engine.create_index(&routing_key.index_name, num_shards).await?;
        info!(
            index = %routing_key.index_name,
            hint = %routing_key.routing_hint,
            num_shards,
            "worker initialised"
        );

        self.state = Some(WorkerState {
            engine,
            index_name: routing_key.index_name,
            routing_hint: routing_key.routing_hint,
        });
        Ok(())
    }

    /// Index one document. Document-level failures are counted and skipped;
    /// the partition keeps going.
    async fn index_record(&mut self, value: &str) {
        // setup ran before the first record
        let Some(state) = self.state.as_ref() else {
            return;
        };

        let payload = match DocumentPayload::parse(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(index = %state.index_name, error = %e, "unparseable record");
                self.reporter.incr(JobCounter::IndexDocNotCreated, 1);
                return;
            }
        };

        let started = Instant::now();
        let outcome = state
            .engine
            .index_doc(
                &state.index_name,
                payload.doc_type,
                payload.doc_id,
                &state.routing_hint,
                payload.json,
            )
            .await;
        self.reporter.incr(
            JobCounter::TimeSpentIndexingMs,
            started.elapsed().as_millis() as u64,
        );

        match outcome {
            Ok(IndexOutcome::Created) => self.reporter.incr(JobCounter::IndexDocCreated, 1),
            Ok(IndexOutcome::NotCreated) => {
                self.reporter.incr(JobCounter::IndexDocNotCreated, 1)
            }
            Err(e) => {
                warn!(index = %state.index_name, doc = payload.doc_id, error = %e,
                      "document rejected");
                self.reporter.incr(JobCounter::IndexDocNotCreated, 1);
            }
        }
    }

    /// Snapshot, stitch, and clean up the engine-side copy.
    async fn finish(&mut self) -> Result<Option<String>> {
        let Some(state) = self.state.as_ref() else {
            return Ok(None);
        };
        let index_name = state.index_name.clone();

        state
            .engine
            .snapshot(
                std::slice::from_ref(&index_name),
                &self.config.snapshot_name,
                self.reporter.as_ref(),
            )
            .await?;

        // Free engine disk before the upload; the snapshot already holds
        // the data.
        state.engine.delete_index(&index_name).await?;

        let transport = transport_for(
            self.repo_dir(),
            &self.config.snapshot_final_destination,
        )
        .await?;
        let started = Instant::now();
        self.reporter.keep_alive();
        let shard = transport
            .execute(&self.config.snapshot_name, &index_name)
            .await?;
        self.reporter.incr(
            JobCounter::TimeSpentTransportingSnapshotMs,
            started.elapsed().as_millis() as u64,
        );
        self.reporter.keep_alive();

        state.engine.delete_snapshot(&self.config.snapshot_name).await?;
        info!(index = %index_name, shard, "partition transported");
        Ok(Some(index_name))
    }

    /// Release the engine and remove the working directories.
    async fn close(&mut self) {
        if let Some(state) = self.state.take() {
            if let Err(e) = state.engine.close().await {
                warn!(error = %e, "engine close failed");
            }
        }
        // The snapshot working directory goes away even when the engine
        // never started.
        if let Err(e) = tokio::fs::remove_dir_all(self.repo_dir()).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %e, "failed to remove snapshot working directory");
            }
        }
    }
}
