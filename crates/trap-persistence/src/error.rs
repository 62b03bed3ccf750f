//! Persistence error types.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Cannot open cycle log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cycle log write failed: {0}")]
    Write(#[from] std::io::Error),

    #[error("Cycle record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
