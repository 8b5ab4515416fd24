//! Cross-cutting, shared constants.
//!
//! Prefer deriving secondary constants (e.g. byte sizes) from primary ones to avoid drift.

/// Default embedding dimension when the embedding service does not report one.
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Bytes per stored embedding row (f32).
pub const EMBEDDING_F32_BYTES: usize = DEFAULT_EMBEDDING_DIM * 4;

/// Default similarity threshold for QA matching.
///
/// Carried from the curated-QA tuning; deliberately strict. Callers can widen
/// it per request via `min_similarity`.
pub const DEFAULT_QA_MIN_SIMILARITY: f32 = 0.98;

/// Cosine threshold above which two questions are treated as duplicates on import.
pub const QA_DUPLICATE_THRESHOLD: f32 = 0.98;

/// Default bound for every lock acquisition in the service.
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;

/// Default budget for external HTTP calls (LLM, embedding, rerank).
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 240;

/// Overall health check budget.
pub const HEALTH_CHECK_BUDGET_SECS: u64 = 3;

/// How long a successful embedding-service TCP probe stays valid.
pub const HEALTH_PROBE_CACHE_SECS: u64 = 30;

/// Lower bound for `top_k` on retrieval and QA queries.
pub const TOP_K_MIN: usize = 1;
/// Upper bound for `top_k`.
pub const TOP_K_MAX: usize = 100;

/// Runtime dimension configuration for modules that agree on vector sizes at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimConfig {
    /// The embedding vector dimension (number of floats).
    pub embedding_dim: usize,
}

impl Default for DimConfig {
    fn default() -> Self {
        Self {
            embedding_dim: DEFAULT_EMBEDDING_DIM,
        }
    }
}

impl DimConfig {
    /// Creates a new dimension configuration.
    pub fn new(embedding_dim: usize) -> Self {
        Self { embedding_dim }
    }

    /// Validates that this configuration is usable.
    pub fn validate(&self) -> Result<(), DimValidationError> {
        if self.embedding_dim == 0 {
            return Err(DimValidationError::ZeroDimension);
        }
        Ok(())
    }
}

/// Errors from [`DimConfig::validate`] and [`validate_embedding_dim`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DimValidationError {
    /// The dimension was zero.
    #[error("embedding dimension must be non-zero")]
    ZeroDimension,

    /// An embedding did not match the configured dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    Mismatch {
        /// Configured dimension.
        expected: usize,
        /// Observed dimension.
        actual: usize,
    },
}

/// Validates an embedding against the expected dimension, failing loudly on mismatch.
#[inline]
pub fn validate_embedding_dim(expected: usize, vector: &[f32]) -> Result<(), DimValidationError> {
    if expected == 0 {
        return Err(DimValidationError::ZeroDimension);
    }
    if vector.len() != expected {
        return Err(DimValidationError::Mismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dim_config_default() {
        assert_eq!(DimConfig::default().embedding_dim, DEFAULT_EMBEDDING_DIM);
        assert!(DimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_embedding_dim() {
        let v = vec![0.0f32; 4];
        assert!(validate_embedding_dim(4, &v).is_ok());
        assert_eq!(
            validate_embedding_dim(8, &v),
            Err(DimValidationError::Mismatch {
                expected: 8,
                actual: 4
            })
        );
        assert_eq!(
            validate_embedding_dim(0, &v),
            Err(DimValidationError::ZeroDimension)
        );
    }
}
