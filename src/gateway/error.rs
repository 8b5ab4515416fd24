//! The HTTP error taxonomy.
//!
//! Every module error converts into one of these; the mapping to status
//! codes and envelope bodies lives here and nowhere else.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use super::envelope::ApiResponse;
use crate::llm::AdapterError;

/// The service-wide error taxonomy.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing/invalid field, out-of-range parameter, unsupported mode.
    #[error("{0}")]
    BadInput(String),

    /// Unknown KB, QA pair, cache type, document.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate resource on create.
    #[error("{0}")]
    AlreadyExists(String),

    /// Quota or interval rejection.
    #[error("{0}")]
    RateLimited(String),

    /// LLM/embedding/rerank did not answer within budget.
    #[error("{0}")]
    UpstreamTimeout(String),

    /// LLM/embedding/rerank answered badly.
    #[error("{0}")]
    UpstreamFailure(String),

    /// Disk write failed or a corrupted file was detected.
    #[error("{0}")]
    StorageFailure(String),

    /// Anything unclassified; logged with a full trace.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// The machine-readable code carried in the envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadInput(_) => "bad-input",
            ApiError::NotFound(_) => "not-found",
            ApiError::AlreadyExists(_) => "already-exists",
            ApiError::RateLimited(_) => "rate-limited",
            ApiError::UpstreamTimeout(_) => "upstream-timeout",
            ApiError::UpstreamFailure(_) => "upstream-failure",
            ApiError::StorageFailure(_) => "storage-failure",
            ApiError::Internal(_) => "internal",
        }
    }

    /// The HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadInput(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AlreadyExists(_) => StatusCode::CONFLICT,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            ApiError::StorageFailure(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "request rejected");
        }

        let body = ApiResponse::error(self.to_string(), self.code(), None);
        (status, Json(body)).into_response()
    }
}

impl From<AdapterError> for ApiError {
    fn from(e: AdapterError) -> Self {
        if e.is_timeout() {
            ApiError::UpstreamTimeout(e.to_string())
        } else {
            ApiError::UpstreamFailure(e.to_string())
        }
    }
}

impl From<crate::sync::LockError> for ApiError {
    fn from(e: crate::sync::LockError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<crate::cache::CacheError> for ApiError {
    fn from(e: crate::cache::CacheError) -> Self {
        match e {
            crate::cache::CacheError::UnknownType(_) => ApiError::NotFound(e.to_string()),
        }
    }
}

impl From<crate::qa::QaError> for ApiError {
    fn from(e: crate::qa::QaError) -> Self {
        use crate::qa::QaError;
        match e {
            QaError::BadInput(_) | QaError::Import(_) => ApiError::BadInput(e.to_string()),
            QaError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            QaError::Lock(inner) => inner.into(),
            QaError::Embedding(inner) => inner.into(),
            QaError::Storage { .. } | QaError::Corrupt { .. } => {
                ApiError::StorageFailure(e.to_string())
            }
        }
    }
}

impl From<crate::kb::KbError> for ApiError {
    fn from(e: crate::kb::KbError) -> Self {
        use crate::kb::KbError;
        match e {
            KbError::BadInput(_) | KbError::CurrentKb(_) => ApiError::BadInput(e.to_string()),
            KbError::NotFound(_) => ApiError::NotFound(e.to_string()),
            KbError::AlreadyExists(_) => ApiError::AlreadyExists(e.to_string()),
            KbError::Lock(inner) => inner.into(),
            KbError::Storage { .. } | KbError::Corrupt { .. } => {
                ApiError::StorageFailure(e.to_string())
            }
            KbError::Vector(inner) => inner.into(),
            KbError::Graph(inner) => inner.into(),
        }
    }
}

impl From<crate::vector::VectorError> for ApiError {
    fn from(e: crate::vector::VectorError) -> Self {
        use crate::vector::VectorError;
        match e {
            VectorError::Dimension(_) => ApiError::BadInput(e.to_string()),
            VectorError::Storage { .. } | VectorError::Corrupt { .. } => {
                ApiError::StorageFailure(e.to_string())
            }
        }
    }
}

impl From<crate::graph::GraphError> for ApiError {
    fn from(e: crate::graph::GraphError) -> Self {
        ApiError::StorageFailure(e.to_string())
    }
}

impl From<crate::ingest::IngestError> for ApiError {
    fn from(e: crate::ingest::IngestError) -> Self {
        use crate::ingest::IngestError;
        match e {
            IngestError::BadInput(_) | IngestError::DisallowedType(_) => {
                ApiError::BadInput(e.to_string())
            }
            IngestError::NotFound(_) => ApiError::NotFound(e.to_string()),
            IngestError::Kb(inner) => inner.into(),
            IngestError::Embedding(inner) => inner.into(),
            IngestError::Storage { .. } | IngestError::Corrupt { .. } => {
                ApiError::StorageFailure(e.to_string())
            }
            IngestError::Vector(inner) => inner.into(),
            IngestError::Graph(inner) => inner.into(),
        }
    }
}

impl From<crate::retrieval::RetrievalError> for ApiError {
    fn from(e: crate::retrieval::RetrievalError) -> Self {
        use crate::retrieval::RetrievalError;
        match e {
            RetrievalError::BadInput(_) => ApiError::BadInput(e.to_string()),
            RetrievalError::Kb(inner) => inner.into(),
            RetrievalError::Adapter(inner) => inner.into(),
            RetrievalError::Vector(inner) => inner.into(),
            RetrievalError::Internal(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<crate::intent::IntentError> for ApiError {
    fn from(e: crate::intent::IntentError) -> Self {
        ApiError::BadInput(e.to_string())
    }
}
