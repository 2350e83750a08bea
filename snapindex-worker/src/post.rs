//! Post-processing barrier.
//!
//! No worker sees every shard of its index, so after all workers finish the
//! destination can be missing the shard directories no partition routed to.
//! The post-processor snapshots empty copies of every index locally and
//! uploads an empty shard wherever the destination has a gap, then writes
//! the final manifest. The online cluster needs all of `0..num_shards`
//! present to restore the snapshot cleanly.

use crate::config::JobConfig;
use crate::error::Result;
use snapindex_core::progress::Reporter;
use snapindex_engine::{EmbeddedEngine, EmbeddedEngineBuilder, EngineFactory};
use snapindex_transport::transport_for;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs once after all workers, with its own embedded engine.
pub struct PostProcessor {
    config: JobConfig,
    factory: Arc<dyn EngineFactory>,
    reporter: Arc<dyn Reporter>,
}

impl PostProcessor {
    pub fn new(
        config: JobConfig,
        factory: Arc<dyn EngineFactory>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            config,
            factory,
            reporter,
        }
    }

    /// Merge the worker manifests, fill missing shards at the destination,
    /// and write the final manifest to `output`. Returns the index names
    /// that made it into the manifest.
    pub async fn run(&self, manifest_files: &[PathBuf], output: &Path) -> Result<Vec<String>> {
        let counts = merge_manifests(manifest_files).await?;
        if counts.is_empty() {
            tokio::fs::write(output, b"").await?;
            return Ok(Vec::new());
        }
        for (index, workers) in &counts {
            info!(index = %index, workers, "index reported by workers");
        }
        let index_names: Vec<String> = counts.into_keys().collect();

        let engine = EmbeddedEngineBuilder::new(
            "post-processor",
            self.config.engine_working_dir.join("post"),
            self.config.snapshot_working_location.join("post"),
            self.config.snapshot_repo_name.clone(),
        )
        .with_plugins(self.config.plugins.clone())
        .start(self.factory.as_ref())
        .await?;

        let result = self.fill_shards(&engine, &index_names).await;
        if let Err(e) = engine.close().await {
            warn!(error = %e, "post-processor engine close failed");
        }
        let kept = result?;

        let mut manifest = kept.join("\n");
        if !manifest.is_empty() {
            manifest.push('\n');
        }
        tokio::fs::write(output, manifest).await?;
        Ok(kept)
    }

    /// Snapshot empty copies of every index, then place placeholder shards
    /// wherever the destination is missing one. An index whose placeholders
    /// fail is dropped from the manifest rather than failing the barrier.
    async fn fill_shards(
        &self,
        engine: &EmbeddedEngine,
        index_names: &[String],
    ) -> Result<Vec<String>> {
        for name in index_names {
            engine
                .create_index(name, self.config.shard_config.shards_for_index(name))
                .await?;
        }
        engine
            .snapshot(
                index_names,
                &self.config.snapshot_name,
                self.reporter.as_ref(),
            )
            .await?;

        let transport = transport_for(
            self.config.snapshot_working_location.join("post"),
            &self.config.snapshot_final_destination,
        )
        .await?;

        let mut kept = Vec::new();
        let mut include_root_manifest = true;
        for name in index_names {
            let num_shards = self.config.shard_config.shards_for_index(name);
            let placed = transport
                .place_missing_shards(
                    &self.config.snapshot_name,
                    name,
                    num_shards,
                    include_root_manifest,
                )
                .await;
            include_root_manifest = false;

            match placed {
                Ok(()) => kept.push(name.clone()),
                Err(e) => {
                    warn!(index = %name, error = %e, "missing-shard fill failed, dropping index from manifest");
                }
            }
            self.reporter.keep_alive();
        }
        Ok(kept)
    }
}

/// Read every worker manifest, deduplicate index names, and tally how many
/// workers reported each. The tally is diagnostic only; the authoritative
/// shard count comes from the shard configuration.
async fn merge_manifests(manifest_files: &[PathBuf]) -> Result<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    for file in manifest_files {
        let content = tokio::fs::read_to_string(file).await?;
        for line in content.lines() {
            let name = line.trim();
            if !name.is_empty() {
                *counts.entry(name.to_string()).or_insert(0) += 1;
            }
        }
    }
    Ok(counts)
}
