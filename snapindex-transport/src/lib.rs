//! Snapshot stitching and transport.
//!
//! Each build worker snapshots a whole index but populates exactly one
//! shard. The transport publishes that shard at its shard number under the
//! shared repository layout and contributes the small root manifests at
//! least once, so the union of all workers' uploads restores as one complete
//! snapshot:
//!
//! ```text
//! <destination>/
//!   index
//!   metadata-<snapshot>
//!   snapshot-<snapshot>
//!   indices/<indexName>/snapshot-<snapshot>
//!   indices/<indexName>/<shardId>/...
//! ```
//!
//! Shard subtrees are disjoint across workers, so those uploads must
//! succeed; root and per-index manifests are written by every worker, so a
//! failed upload there is a warning, not an error (another writer wins).
//!
//! Backends: [`LocalFsTransport`], [`WebHdfsTransport`], [`S3Transport`],
//! selected from the destination's URI scheme by [`transport_for`].

mod error;
mod fsutil;
mod local;
mod s3;
mod webhdfs;

pub use error::{Error, Result};
pub use local::LocalFsTransport;
pub use s3::S3Transport;
pub use webhdfs::WebHdfsTransport;

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Storage system addressed by a destination path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageSystem {
    S3,
    Hdfs,
    LocalFs,
}

impl StorageSystem {
    pub fn of(destination: &str) -> Self {
        if destination.starts_with("s3://") {
            StorageSystem::S3
        } else if destination.starts_with("hdfs://") {
            StorageSystem::Hdfs
        } else {
            StorageSystem::LocalFs
        }
    }
}

/// Strip the `s3://` or `hdfs://` scheme prefix, if any.
pub fn strip_scheme(destination: &str) -> &str {
    destination
        .strip_prefix("s3://")
        .or_else(|| destination.strip_prefix("hdfs://"))
        .unwrap_or(destination)
}

fn root_manifests(snapshot: &str) -> [String; 3] {
    [
        format!("metadata-{snapshot}"),
        format!("snapshot-{snapshot}"),
        "index".to_string(),
    ]
}

/// A destination a snapshot can be stitched into.
///
/// Backends implement the three primitive transfers; the stitching itself
/// ([`execute`](TransportBackend::execute) and
/// [`place_missing_shards`](TransportBackend::place_missing_shards)) is
/// shared.
#[async_trait]
pub trait TransportBackend: Debug + Send + Sync {
    /// Local snapshot repository the engine wrote into.
    fn working_dir(&self) -> &Path;

    /// Upload one file to `dest_rel` under the destination root.
    async fn transfer_file(&self, local: &Path, dest_rel: &str) -> Result<()>;

    /// Upload a directory tree to `dest_rel` under the destination root.
    async fn transfer_dir(&self, local_dir: &Path, dest_rel: &str) -> Result<()>;

    /// Whether `dest_rel` already exists at the destination.
    async fn check_exists(&self, dest_rel: &str) -> Result<bool>;

    /// Stitch one worker's snapshot into the destination. Returns the shard
    /// number the data landed on.
    async fn execute(&self, snapshot: &str, index_name: &str) -> Result<u32> {
        let index_local = self
            .working_dir()
            .join("indices")
            .join(index_name);

        let shard = fsutil::largest_shard(&index_local)?;
        debug!(index = index_name, shard, "stitching data-bearing shard");

        self.upload_root_manifests(snapshot).await;

        // The per-index manifest is also written by every worker of this
        // index, so collisions degrade to warnings too.
        let manifest = format!("snapshot-{snapshot}");
        if let Err(e) = self
            .transfer_file(
                &index_local.join(&manifest),
                &format!("indices/{index_name}/{manifest}"),
            )
            .await
        {
            warn!(index = index_name, error = %e, "index manifest upload failed; concurrent writer assumed");
        }

        fsutil::remove_other_shards(&index_local, shard)?;

        self.transfer_dir(
            &index_local.join(shard.to_string()),
            &format!("indices/{index_name}/{shard}"),
        )
        .await?;
        Ok(shard)
    }

    /// Upload placeholder shard directories for every shard id no worker's
    /// data routed to, so the destination holds all of `0..num_shards`.
    /// Root manifests are included only when `include_root_manifest` is set
    /// (the caller flips it after the first index).
    async fn place_missing_shards(
        &self,
        snapshot: &str,
        index_name: &str,
        num_shards: u32,
        include_root_manifest: bool,
    ) -> Result<()> {
        if include_root_manifest {
            self.upload_root_manifests(snapshot).await;
        }

        for shard in 0..num_shards {
            let dest_rel = format!("indices/{index_name}/{shard}");
            if self.check_exists(&dest_rel).await? {
                continue;
            }
            debug!(index = index_name, shard, "placing empty shard");
            let local = self
                .working_dir()
                .join("indices")
                .join(index_name)
                .join(shard.to_string());
            self.transfer_dir(&local, &dest_rel).await?;
        }
        Ok(())
    }

    /// Upload the shared root manifests, tolerating failures: every worker
    /// writes the same files, so one winner suffices.
    async fn upload_root_manifests(&self, snapshot: &str) {
        for name in root_manifests(snapshot) {
            if let Err(e) = self
                .transfer_file(&self.working_dir().join(&name), &name)
                .await
            {
                warn!(file = %name, error = %e, "root manifest upload failed; concurrent writer assumed");
            }
        }
    }
}

/// Build the transport matching the destination's storage system.
///
/// For S3, credentials and region come from the ambient AWS environment.
pub async fn transport_for(
    working_dir: PathBuf,
    destination: &str,
) -> Result<Box<dyn TransportBackend>> {
    match StorageSystem::of(destination) {
        StorageSystem::LocalFs => Ok(Box::new(LocalFsTransport::new(working_dir, destination))),
        StorageSystem::Hdfs => Ok(Box::new(WebHdfsTransport::new(working_dir, destination)?)),
        StorageSystem::S3 => {
            let sdk_config =
                aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            Ok(Box::new(S3Transport::new(
                &sdk_config,
                working_dir,
                destination,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_system_selection() {
        assert_eq!(StorageSystem::of("s3://bucket/prefix"), StorageSystem::S3);
        assert_eq!(
            StorageSystem::of("hdfs://namenode:9870/snapshots"),
            StorageSystem::Hdfs
        );
        assert_eq!(StorageSystem::of("/mnt/snapshots"), StorageSystem::LocalFs);
    }

    #[test]
    fn test_strip_scheme() {
        assert_eq!(strip_scheme("s3://bucket/prefix"), "bucket/prefix");
        assert_eq!(strip_scheme("hdfs://nn:9870/p"), "nn:9870/p");
        assert_eq!(strip_scheme("/mnt/snapshots"), "/mnt/snapshots");
    }
}
