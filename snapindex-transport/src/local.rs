//! Local filesystem backend, used when the destination is a plain path.

use crate::error::Result;
use crate::fsutil;
use crate::{strip_scheme, TransportBackend};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct LocalFsTransport {
    working_dir: PathBuf,
    dest_root: PathBuf,
}

impl LocalFsTransport {
    pub fn new(working_dir: impl Into<PathBuf>, destination: &str) -> Self {
        Self {
            working_dir: working_dir.into(),
            dest_root: PathBuf::from(strip_scheme(destination)),
        }
    }

    fn dest_path(&self, dest_rel: &str) -> PathBuf {
        let mut path = self.dest_root.clone();
        path.extend(dest_rel.split('/'));
        path
    }
}

#[async_trait]
impl TransportBackend for LocalFsTransport {
    fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    async fn transfer_file(&self, local: &Path, dest_rel: &str) -> Result<()> {
        let dest = self.dest_path(dest_rel);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local, &dest).await?;
        Ok(())
    }

    async fn transfer_dir(&self, local_dir: &Path, dest_rel: &str) -> Result<()> {
        let dest = self.dest_path(dest_rel);
        tokio::fs::create_dir_all(&dest).await?;
        for (path, rel) in fsutil::collect_files(local_dir)? {
            let file_dest = {
                let mut d = dest.clone();
                d.extend(rel.split('/'));
                d
            };
            if let Some(parent) = file_dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&path, &file_dest).await?;
        }
        Ok(())
    }

    async fn check_exists(&self, dest_rel: &str) -> Result<bool> {
        Ok(self.dest_path(dest_rel).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Lay out a working repository the way the engine's snapshot does:
    /// root manifests, per-index manifest, one data shard among empties.
    fn fake_snapshot(working: &Path, snapshot: &str, index: &str, data_shard: u32, num_shards: u32) {
        std::fs::create_dir_all(working).unwrap();
        std::fs::write(working.join("index"), b"{\"snapshots\":[\"snapshot\"]}").unwrap();
        std::fs::write(working.join(format!("metadata-{snapshot}")), b"{}").unwrap();
        std::fs::write(working.join(format!("snapshot-{snapshot}")), b"{}").unwrap();

        let index_dir = working.join("indices").join(index);
        std::fs::create_dir_all(&index_dir).unwrap();
        std::fs::write(index_dir.join(format!("snapshot-{snapshot}")), b"{}").unwrap();
        for shard in 0..num_shards {
            let shard_dir = index_dir.join(shard.to_string());
            std::fs::create_dir_all(&shard_dir).unwrap();
            std::fs::write(shard_dir.join("__state"), b"{}").unwrap();
            if shard == data_shard {
                std::fs::write(shard_dir.join("__docs"), vec![b'd'; 2048]).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_execute_stitches_single_shard() {
        let tmp = TempDir::new().unwrap();
        let working = tmp.path().join("working");
        let dest = tmp.path().join("dest");
        fake_snapshot(&working, "snapshot", "c140101", 2, 5);

        let transport =
            LocalFsTransport::new(working.clone(), dest.to_str().unwrap());
        let shard = transport.execute("snapshot", "c140101").await.unwrap();
        assert_eq!(shard, 2);

        assert!(dest.join("index").exists());
        assert!(dest.join("metadata-snapshot").exists());
        assert!(dest.join("snapshot-snapshot").exists());
        let index_dest = dest.join("indices").join("c140101");
        assert!(index_dest.join("snapshot-snapshot").exists());

        // Only the data-bearing shard was uploaded
        assert!(index_dest.join("2").join("__docs").exists());
        for shard in [0u32, 1, 3, 4] {
            assert!(!index_dest.join(shard.to_string()).exists());
        }

        // Empty shards were removed from the working copy too
        assert!(working.join("indices/c140101/2").is_dir());
        assert!(!working.join("indices/c140101/0").exists());
    }

    #[tokio::test]
    async fn test_place_missing_shards_fills_gaps() {
        let tmp = TempDir::new().unwrap();
        let working = tmp.path().join("working");
        let dest = tmp.path().join("dest");
        // Post-processor working copy: an all-empty snapshot of the index
        fake_snapshot(&working, "snapshot", "c140101", 0, 5);

        // Shard 2 was already published by a worker
        let pre_existing = dest.join("indices").join("c140101").join("2");
        std::fs::create_dir_all(&pre_existing).unwrap();
        std::fs::write(pre_existing.join("__docs"), b"real data").unwrap();

        let transport =
            LocalFsTransport::new(working.clone(), dest.to_str().unwrap());
        transport
            .place_missing_shards("snapshot", "c140101", 5, true)
            .await
            .unwrap();

        let index_dest = dest.join("indices").join("c140101");
        for shard in 0..5u32 {
            assert!(index_dest.join(shard.to_string()).is_dir());
        }
        // The populated shard was left alone
        assert_eq!(
            std::fs::read(pre_existing.join("__docs")).unwrap(),
            b"real data"
        );
        assert!(dest.join("metadata-snapshot").exists());
    }

    #[tokio::test]
    async fn test_execute_twice_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("dest");

        for run in 0..2 {
            let working = tmp.path().join(format!("working-{run}"));
            fake_snapshot(&working, "snapshot", "c140101", 4, 5);
            let transport =
                LocalFsTransport::new(working, dest.to_str().unwrap());
            let shard = transport.execute("snapshot", "c140101").await.unwrap();
            assert_eq!(shard, 4);
        }

        let index_dest = tmp.path().join("dest/indices/c140101");
        assert!(index_dest.join("4").join("__docs").exists());
        assert_eq!(
            std::fs::read(index_dest.join("4").join("__docs")).unwrap(),
            vec![b'd'; 2048]
        );
    }
}
