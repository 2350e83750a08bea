//! # Snapindex Worker
//!
//! The batch-side of the build: [`IndexerWorker`] turns one partition of
//! records into one stitched shard at the destination repository, and
//! [`PostProcessor`] runs once afterwards to fill placeholder shards and
//! write the final manifest. [`JobConfig`] carries the enumerated job keys
//! the surrounding scheduler passes in.

pub mod config;
mod error;
mod post;
mod worker;

pub use config::JobConfig;
pub use error::{Error, Result};
pub use post::PostProcessor;
pub use worker::IndexerWorker;
