//! Error types shared across the workspace

use thiserror::Error;

/// Top-level error type aggregating per-crate errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("audio error: {0}")]
    Audio(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Error::Audio(e.to_string())
    }
}

/// Result alias using the core error type
pub type Result<T> = std::result::Result<T, Error>;
