//! Adapter error types.

use std::time::Duration;
use thiserror::Error;

/// Errors from the external LLM / embedding / rerank services.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The service did not answer within its budget.
    #[error("{service} did not answer within {budget:?}")]
    Timeout {
        /// Which adapter timed out.
        service: &'static str,
        /// The configured budget.
        budget: Duration,
    },

    /// The service answered non-2xx.
    #[error("{service} responded {status}: {body}")]
    Upstream {
        /// Which adapter failed.
        service: &'static str,
        /// HTTP status.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// Transport-level failure (connect, TLS, body read).
    #[error("{service} request failed: {source}")]
    Transport {
        /// Which adapter failed.
        service: &'static str,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The service produced output the adapter could not parse.
    #[error("{service} produced unparseable output: {detail}")]
    Unparseable {
        /// Which adapter failed.
        service: &'static str,
        /// Parse detail.
        detail: String,
    },

    /// A returned embedding did not match the configured dimension.
    #[error(transparent)]
    Dimension(#[from] crate::constants::DimValidationError),
}

impl AdapterError {
    /// `true` for budget exhaustion, which maps to 504 at the surface.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AdapterError::Timeout { .. })
    }

    /// Classifies a reqwest failure for `service`.
    pub fn from_reqwest(service: &'static str, budget: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout { service, budget }
        } else {
            AdapterError::Transport {
                service,
                source: err,
            }
        }
    }
}
