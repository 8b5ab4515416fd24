//! KB manager error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from knowledge-base lifecycle and storage.
#[derive(Debug, Error)]
pub enum KbError {
    /// Invalid caller input (bad name, bad config values).
    #[error("invalid input: {0}")]
    BadInput(String),

    /// The knowledge base does not exist (or was deleted under the caller).
    #[error("knowledge base '{0}' not found")]
    NotFound(String),

    /// Duplicate create.
    #[error("knowledge base '{0}' already exists")]
    AlreadyExists(String),

    /// Refusing to delete the current KB without `force`.
    #[error("knowledge base '{0}' is current; pass force=true to delete it")]
    CurrentKb(String),

    /// A lock could not be acquired in time.
    #[error(transparent)]
    Lock(#[from] crate::sync::LockError),

    /// Disk I/O failed.
    #[error("storage failure at {path}: {source}")]
    Storage {
        /// Path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A store file was inconsistent.
    #[error("corrupted knowledge base file at {path}: {detail}")]
    Corrupt {
        /// Path involved.
        path: PathBuf,
        /// What was inconsistent.
        detail: String,
    },

    /// The per-KB vector index failed.
    #[error(transparent)]
    Vector(#[from] crate::vector::VectorError),

    /// The per-KB graph store failed.
    #[error(transparent)]
    Graph(#[from] crate::graph::GraphError),
}

impl KbError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KbError::Storage {
            path: path.into(),
            source,
        }
    }
}

/// Convenience result type for the KB manager.
pub type KbResult<T> = Result<T, KbError>;
