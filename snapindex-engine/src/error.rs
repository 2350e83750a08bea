use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The engine node failed to start.
    #[error("engine start failed: {0}")]
    Start(String),

    /// A named plugin could not be loaded.
    #[error("plugin not found: {0}")]
    Plugin(String),

    /// A snapshot did not reach completion inside the deadline.
    #[error("snapshot '{snapshot}' timed out after {elapsed_ms} ms ({successful}/{total} shards)")]
    SnapshotTimeout {
        snapshot: String,
        elapsed_ms: u64,
        successful: u32,
        total: u32,
    },

    /// Index-level operation failure (create, flush, merge, delete).
    #[error("index operation failed: {0}")]
    Index(String),

    /// The engine was used after close.
    #[error("engine is closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn start(msg: impl Into<String>) -> Self {
        Error::Start(msg.into())
    }

    pub fn plugin(name: impl Into<String>) -> Self {
        Error::Plugin(name.into())
    }

    pub fn index(msg: impl Into<String>) -> Self {
        Error::Index(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}
