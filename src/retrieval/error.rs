//! Retrieval engine error types.

use thiserror::Error;

/// Errors from the retrieval engine.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Invalid caller input (unknown mode, out-of-range top_k, ...).
    #[error("invalid input: {0}")]
    BadInput(String),

    /// The target knowledge base is gone.
    #[error(transparent)]
    Kb(#[from] crate::kb::KbError),

    /// An external adapter failed (embedding, LLM, rerank).
    #[error(transparent)]
    Adapter(#[from] crate::llm::AdapterError),

    /// The per-KB vector index failed.
    #[error(transparent)]
    Vector(#[from] crate::vector::VectorError),

    /// Anything unclassified.
    #[error("retrieval failed: {0}")]
    Internal(String),
}

/// Convenience result type for retrieval.
pub type RetrievalResult<T> = Result<T, RetrievalError>;
