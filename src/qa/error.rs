//! Fixed-QA store error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the fixed-QA store.
#[derive(Debug, Error)]
pub enum QaError {
    /// Invalid caller input (empty question, confidence out of range, ...).
    #[error("invalid input: {0}")]
    BadInput(String),

    /// Pair or category does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// "pair" or "category".
        kind: &'static str,
        /// The missing identifier.
        id: String,
    },

    /// A lock could not be acquired in time.
    #[error(transparent)]
    Lock(#[from] crate::sync::LockError),

    /// The embedding adapter failed.
    #[error(transparent)]
    Embedding(#[from] crate::llm::AdapterError),

    /// Disk I/O failed.
    #[error("storage failure at {path}: {source}")]
    Storage {
        /// Path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An on-disk file does not match its metadata.
    #[error("corrupted storage at {path}: {detail}")]
    Corrupt {
        /// Path involved.
        path: PathBuf,
        /// What was inconsistent.
        detail: String,
    },

    /// An import payload could not be parsed.
    #[error("import failed: {0}")]
    Import(String),
}

impl QaError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        QaError::Storage {
            path: path.into(),
            source,
        }
    }
}

/// Convenience result type for the QA store.
pub type QaResult<T> = Result<T, QaError>;
