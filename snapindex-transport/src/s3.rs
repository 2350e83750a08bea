//! S3 backend for `s3://` destinations.
//!
//! A snapshot is hundreds of small files, so directory uploads fan out over
//! a wide concurrent stream rather than going one object at a time. Every
//! object is written with AES-256 server-side encryption.

use crate::error::{Error, Result};
use crate::fsutil;
use crate::TransportBackend;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ServerSideEncryption;
use aws_sdk_s3::Client;
use aws_smithy_types::retry::RetryConfig;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Upload fan-out for directory transfers.
const UPLOAD_CONCURRENCY: usize = 128;

/// Retries per object; transient throttling is expected at this fan-out.
const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Progress is logged every this many completed objects.
const PROGRESS_EVERY: usize = 100;

#[derive(Debug)]
pub struct S3Transport {
    working_dir: PathBuf,
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Transport {
    /// Build from the ambient AWS config, inheriting its HTTP client,
    /// region, and retry behavior.
    pub fn new(
        sdk_config: &aws_config::SdkConfig,
        working_dir: impl Into<PathBuf>,
        destination: &str,
    ) -> Result<Self> {
        let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
            .retry_config(RetryConfig::standard().with_max_attempts(MAX_RETRY_ATTEMPTS))
            .build();
        let client = Client::from_conf(s3_config);
        Self::from_client(client, working_dir, destination)
    }

    pub fn from_client(
        client: Client,
        working_dir: impl Into<PathBuf>,
        destination: &str,
    ) -> Result<Self> {
        let (bucket, prefix) = parse_destination(destination)?;
        Ok(Self {
            working_dir: working_dir.into(),
            client,
            bucket,
            prefix,
        })
    }

    fn key(&self, dest_rel: &str) -> String {
        join_key(&self.prefix, dest_rel)
    }

    async fn upload_one(&self, local: PathBuf, key: String) -> Result<()> {
        let body = ByteStream::from_path(&local)
            .await
            .map_err(|e| Error::remote(format!("failed to read '{}': {e}", local.display())))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .server_side_encryption(ServerSideEncryption::Aes256)
            .send()
            .await
            .map_err(|e| map_s3_error(e, &key))?;
        Ok(())
    }
}

#[async_trait]
impl TransportBackend for S3Transport {
    fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    async fn transfer_file(&self, local: &Path, dest_rel: &str) -> Result<()> {
        self.upload_one(local.to_path_buf(), self.key(dest_rel)).await
    }

    async fn transfer_dir(&self, local_dir: &Path, dest_rel: &str) -> Result<()> {
        let files = fsutil::collect_files(local_dir)?;
        let total = files.len();

        let mut uploads = stream::iter(files.into_iter().map(|(path, rel)| {
            let key = self.key(&format!("{dest_rel}/{rel}"));
            self.upload_one(path, key)
        }))
        .buffer_unordered(UPLOAD_CONCURRENCY);

        let mut completed = 0usize;
        while let Some(result) = uploads.next().await {
            result?;
            completed += 1;
            if completed % PROGRESS_EVERY == 0 || completed == total {
                debug!(completed, total, dest = dest_rel, "upload progress");
            }
        }
        Ok(())
    }

    async fn check_exists(&self, dest_rel: &str) -> Result<bool> {
        let prefix = format!("{}/", self.key(dest_rel));
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| map_s3_error(e, &prefix))?;
        Ok(response.key_count().unwrap_or(0) > 0)
    }
}

fn parse_destination(destination: &str) -> Result<(String, String)> {
    let stripped = destination
        .strip_prefix("s3://")
        .ok_or_else(|| Error::destination(destination, "expected s3:// scheme"))?;
    let (bucket, prefix) = match stripped.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix.trim_end_matches('/')),
        None => (stripped, ""),
    };
    if bucket.is_empty() {
        return Err(Error::destination(destination, "missing bucket"));
    }
    Ok((bucket.to_string(), prefix.to_string()))
}

fn join_key(prefix: &str, dest_rel: &str) -> String {
    if prefix.is_empty() {
        dest_rel.to_string()
    } else {
        format!("{prefix}/{dest_rel}")
    }
}

/// Classify an SDK error by HTTP status where one is available.
fn map_s3_error<E: std::fmt::Debug>(err: aws_sdk_s3::error::SdkError<E>, key: &str) -> Error {
    use aws_sdk_s3::error::SdkError;

    match &err {
        SdkError::ServiceError(service_err) => {
            let status = service_err.raw().status().as_u16();
            Error::remote(format!("S3 error for key '{key}' (HTTP {status}): {err:?}"))
        }
        SdkError::TimeoutError(_) => Error::remote(format!("S3 timeout for key '{key}': {err:?}")),
        SdkError::DispatchFailure(_) => {
            Error::remote(format!("S3 connection error for key '{key}': {err:?}"))
        }
        _ => Error::remote(format!("S3 error for key '{key}': {err:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_destination() {
        assert_eq!(
            parse_destination("s3://bucket/snapshots/run-42").unwrap(),
            ("bucket".to_string(), "snapshots/run-42".to_string())
        );
        assert_eq!(
            parse_destination("s3://bucket").unwrap(),
            ("bucket".to_string(), String::new())
        );
        assert!(parse_destination("/mnt/snapshots").is_err());
        assert!(parse_destination("s3:///missing-bucket").is_err());
    }

    #[test]
    fn test_key_join() {
        assert_eq!(join_key("snapshots/run-42", "index"), "snapshots/run-42/index");
        assert_eq!(join_key("", "indices/c140101/3"), "indices/c140101/3");
    }
}
