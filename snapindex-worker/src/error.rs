use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Record(#[from] snapindex_core::Error),

    #[error(transparent)]
    Engine(#[from] snapindex_engine::Error),

    #[error(transparent)]
    Transport(#[from] snapindex_transport::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}
