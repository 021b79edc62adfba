//! Housekeeping errors

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("validation failed for {path}: {reason}")]
    Validation { path: PathBuf, reason: String },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("path escapes its directory: {0}")]
    UnsafePath(String),

    #[error("not a file path: {0}")]
    NotAFile(PathBuf),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
