//! Ingest pipeline error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from document ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Invalid caller input.
    #[error("invalid input: {0}")]
    BadInput(String),

    /// The file type is not in `allowed_file_types`.
    #[error("file type '{0}' is not allowed")]
    DisallowedType(String),

    /// A document was not found.
    #[error("document '{0}' not found")]
    NotFound(String),

    /// The knowledge base disappeared under the operation.
    #[error(transparent)]
    Kb(#[from] crate::kb::KbError),

    /// The embedding adapter failed; the document is marked failed.
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

    /// A store file was inconsistent.
    #[error("corrupted store at {path}: {detail}")]
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

impl IngestError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::Storage {
            path: path.into(),
            source,
        }
    }
}

/// Convenience result type for ingestion.
pub type IngestResult<T> = Result<T, IngestError>;
