//! Knowledge-base metadata.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-KB tuning knobs. Changing them never rewrites stored documents; they
/// shape future ingest and retrieval only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KbConfig {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub chunk_overlap: usize,
    /// Whether the graph is rebuilt automatically on ingest.
    pub auto_update: bool,
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            chunk_overlap: 100,
            auto_update: true,
        }
    }
}

/// Partial config update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KbConfigPatch {
    /// New chunk size.
    pub chunk_size: Option<usize>,
    /// New chunk overlap.
    pub chunk_overlap: Option<usize>,
    /// New auto-update flag.
    pub auto_update: Option<bool>,
    /// New description.
    pub description: Option<String>,
    /// New language.
    pub language: Option<String>,
}

/// A knowledge base's identity and settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KbInfo {
    /// Unique name.
    pub name: String,
    /// Human description.
    pub description: String,
    /// Answer language hint.
    pub language: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Working directory on disk.
    pub working_dir: PathBuf,
    /// Tuning knobs.
    pub config: KbConfig,
}

impl KbInfo {
    /// Validates a KB name: non-empty, filesystem-safe.
    pub fn validate_name(name: &str) -> Result<(), super::KbError> {
        if name.trim().is_empty() {
            return Err(super::KbError::BadInput("name must not be empty".into()));
        }
        if name.len() > 128 {
            return Err(super::KbError::BadInput("name is too long".into()));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(super::KbError::BadInput(
                "name may only contain letters, digits, '-' and '_'".into(),
            ));
        }
        Ok(())
    }
}
