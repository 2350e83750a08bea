use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The local snapshot has no shard directories to stitch from.
    #[error("no shard directories under {0}")]
    NoShardData(String),

    #[error("invalid destination '{destination}': {reason}")]
    Destination { destination: String, reason: String },

    /// A remote write or listing failed in a way retries might fix.
    #[error("remote transfer failed: {0}")]
    Remote(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn destination(destination: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Destination {
            destination: destination.into(),
            reason: reason.into(),
        }
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Error::Remote(msg.into())
    }
}
