//! QA pair data model and query result shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One curated question → answer unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QaPair {
    /// Stable identifier.
    pub id: String,
    /// Question text.
    pub question: String,
    /// Answer text.
    pub answer: String,
    /// Owning category label.
    pub category: String,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Optional keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Where the pair came from.
    #[serde(default)]
    pub source: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for creating a pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQaPair {
    /// Question text (required, non-empty).
    pub question: String,
    /// Answer text (required, non-empty).
    pub answer: String,
    /// Category label (required, non-empty).
    pub category: String,
    /// Confidence; defaults to 0.9.
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// Optional keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Optional source tag.
    #[serde(default)]
    pub source: Option<String>,
    /// Optional externally supplied id.
    #[serde(default)]
    pub id: Option<String>,
}

pub(crate) fn default_confidence() -> f32 {
    0.9
}

impl NewQaPair {
    /// Validates required fields and ranges.
    pub fn validate(&self) -> Result<(), super::QaError> {
        if self.question.trim().is_empty() {
            return Err(super::QaError::BadInput("question must not be empty".into()));
        }
        if self.answer.trim().is_empty() {
            return Err(super::QaError::BadInput("answer must not be empty".into()));
        }
        if self.category.trim().is_empty() {
            return Err(super::QaError::BadInput("category must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(super::QaError::BadInput(format!(
                "confidence must be within [0.0, 1.0], got {}",
                self.confidence
            )));
        }
        Ok(())
    }

    /// Materializes a [`QaPair`] with generated id/timestamps where absent.
    pub fn into_pair(self, now: DateTime<Utc>) -> QaPair {
        QaPair {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| format!("qa-{}", uuid::Uuid::new_v4())),
            question: self.question.trim().to_string(),
            answer: self.answer,
            category: self.category.trim().to_string(),
            confidence: self.confidence,
            keywords: self.keywords,
            source: self.source.unwrap_or_else(|| "api".to_string()),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of an existing pair.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QaPairUpdate {
    /// New question text (re-embeds when set).
    pub question: Option<String>,
    /// New answer text.
    pub answer: Option<String>,
    /// New confidence.
    pub confidence: Option<f32>,
    /// New keywords.
    pub keywords: Option<Vec<String>>,
    /// New source tag.
    pub source: Option<String>,
}

/// One similarity match.
#[derive(Debug, Clone, Serialize)]
pub struct QaMatch {
    /// The matched pair.
    pub pair: QaPair,
    /// Cosine similarity against the query.
    pub similarity: f32,
}

/// Result of a similarity query.
#[derive(Debug, Clone, Serialize)]
pub struct QaQueryResult {
    /// Whether the best match cleared `min_similarity`.
    pub found: bool,
    /// The best answer when found.
    pub answer: Option<String>,
    /// Similarity of the best match when found.
    pub similarity: Option<f32>,
    /// All matches above the threshold, best first, truncated to `top_k`.
    pub matches: Vec<QaMatch>,
    /// Threshold that was in effect.
    pub min_similarity: f32,
}

impl QaQueryResult {
    /// An empty miss.
    pub fn miss(min_similarity: f32) -> Self {
        Self {
            found: false,
            answer: None,
            similarity: None,
            matches: Vec::new(),
            min_similarity,
        }
    }
}

/// Per-pair outcome of a batch add.
#[derive(Debug, Clone, Serialize)]
pub struct BatchAddOutcome {
    /// Index of the pair in the request.
    pub index: usize,
    /// Assigned id on success.
    pub id: Option<String>,
    /// Whether this pair was persisted.
    pub success: bool,
    /// Failure detail when not.
    pub error: Option<String>,
}

/// Result of a category delete.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryDeleteResult {
    /// Pairs removed from the category.
    pub deleted_count: usize,
    /// Whether an on-disk directory existed and was removed.
    pub folder_deleted: bool,
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Serialize)]
pub struct QaStatistics {
    /// Total pair count across categories.
    pub total_pairs: usize,
    /// Pair count per category.
    pub categories: std::collections::BTreeMap<String, usize>,
    /// Mean confidence across all pairs.
    pub average_confidence: f32,
    /// Similarity threshold in effect for queries.
    pub similarity_threshold: f32,
    /// Embedding dimension of the store.
    pub vector_dimension: usize,
}
