//! WebHDFS backend for `hdfs://` destinations.
//!
//! Talks to the namenode's WebHDFS REST endpoint (`/webhdfs/v1`). The
//! destination authority names the WebHDFS port, e.g.
//! `hdfs://namenode:9870/snapshots/run-42`.
//!
//! Concurrent workers race on directory creation and on the shared
//! manifests; HDFS surfaces those races as lease errors on the loser, which
//! are logged and treated as success since the winner's copy is equivalent.

use crate::error::{Error, Result};
use crate::fsutil;
use crate::TransportBackend;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

const DEFAULT_WEBHDFS_PORT: u16 = 9870;

#[derive(Debug)]
pub struct WebHdfsTransport {
    working_dir: PathBuf,
    client: reqwest::Client,
    /// `http://host:port/webhdfs/v1<rootPath>`, no trailing slash.
    api_root: String,
}

impl WebHdfsTransport {
    pub fn new(working_dir: impl Into<PathBuf>, destination: &str) -> Result<Self> {
        let url = Url::parse(destination)
            .map_err(|e| Error::destination(destination, e.to_string()))?;
        if url.scheme() != "hdfs" {
            return Err(Error::destination(destination, "expected hdfs:// scheme"));
        }
        let host = url
            .host_str()
            .ok_or_else(|| Error::destination(destination, "missing namenode host"))?;
        let port = url.port().unwrap_or(DEFAULT_WEBHDFS_PORT);
        let path = url.path().trim_end_matches('/');

        Ok(Self {
            working_dir: working_dir.into(),
            client: reqwest::Client::new(),
            api_root: format!("http://{host}:{port}/webhdfs/v1{path}"),
        })
    }

    fn dest_url(&self, dest_rel: &str, op: &str) -> String {
        if dest_rel.is_empty() {
            format!("{}?op={op}", self.api_root)
        } else {
            format!("{}/{dest_rel}?op={op}", self.api_root)
        }
    }

    /// Create a destination directory and any missing ancestors. Creation
    /// races between workers are benign; MKDIRS is idempotent.
    async fn mkdirs(&self, dest_rel: &str) -> Result<()> {
        let url = self.dest_url(dest_rel, "MKDIRS");
        let response = self.client.put(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::remote(format!(
                "MKDIRS {dest_rel} failed (HTTP {status}): {body}"
            )));
        }
        Ok(())
    }

    /// Whether a failed write is a concurrent-writer race rather than a
    /// real error.
    fn is_writer_race(body: &str) -> bool {
        body.contains("LeaseExpiredException") || body.contains("AlreadyBeingCreatedException")
    }
}

#[async_trait]
impl TransportBackend for WebHdfsTransport {
    fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    async fn transfer_file(&self, local: &Path, dest_rel: &str) -> Result<()> {
        if let Some((parent, _)) = dest_rel.rsplit_once('/') {
            self.mkdirs(parent).await?;
        }

        let bytes = tokio::fs::read(local).await?;
        let url = self.dest_url(dest_rel, "CREATE&overwrite=true");
        let response = self.client.put(&url).body(bytes).send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(dest = dest_rel, "file transferred");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if Self::is_writer_race(&body) {
            warn!(dest = dest_rel, "lost write race to a concurrent worker");
            return Ok(());
        }
        Err(Error::remote(format!(
            "CREATE {dest_rel} failed (HTTP {status}): {body}"
        )))
    }

    async fn transfer_dir(&self, local_dir: &Path, dest_rel: &str) -> Result<()> {
        self.mkdirs(dest_rel).await?;
        for (path, rel) in fsutil::collect_files(local_dir)? {
            self.transfer_file(&path, &format!("{dest_rel}/{rel}"))
                .await?;
        }
        Ok(())
    }

    async fn check_exists(&self, dest_rel: &str) -> Result<bool> {
        let url = self.dest_url(dest_rel, "GETFILESTATUS");
        let response = self.client.get(&url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::remote(format!(
                    "GETFILESTATUS {dest_rel} failed (HTTP {status}): {body}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_parsing() {
        let t = WebHdfsTransport::new("/tmp/w", "hdfs://namenode:9870/snapshots/run-42").unwrap();
        assert_eq!(
            t.dest_url("indices/c140101/3", "GETFILESTATUS"),
            "http://namenode:9870/webhdfs/v1/snapshots/run-42/indices/c140101/3?op=GETFILESTATUS"
        );
    }

    #[test]
    fn test_default_port_and_trailing_slash() {
        let t = WebHdfsTransport::new("/tmp/w", "hdfs://namenode/snapshots/").unwrap();
        assert_eq!(
            t.dest_url("index", "CREATE&overwrite=true"),
            "http://namenode:9870/webhdfs/v1/snapshots/index?op=CREATE&overwrite=true"
        );
    }

    #[test]
    fn test_rejects_non_hdfs_destination() {
        assert!(WebHdfsTransport::new("/tmp/w", "s3://bucket/p").is_err());
        assert!(WebHdfsTransport::new("/tmp/w", "not a url").is_err());
    }

    #[test]
    fn test_writer_race_detection() {
        assert!(WebHdfsTransport::is_writer_race(
            r#"{"RemoteException":{"exception":"LeaseExpiredException"}}"#
        ));
        assert!(!WebHdfsTransport::is_writer_race("disk full"));
    }
}
