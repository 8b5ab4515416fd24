//! Document ingestion pipeline.
//!
//! Text goes in; chunks, embeddings, and graph entities come out, all under
//! the owning KB's working directory. Every document moves through the
//! status KV (`pending → processing → ready | failed`), and a failed embed
//! leaves no partial chunks behind.

pub mod chunk;
pub mod error;
pub mod kv;

#[cfg(test)]
mod tests;

pub use chunk::{TextChunk, chunk_text, extract_entities};
pub use error::{IngestError, IngestResult};
pub use kv::KvStore;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::kb::KnowledgeBase;
use crate::llm::Embedder;
use crate::vector::ChunkMeta;

/// Lifecycle state of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocStatus {
    /// Accepted, not yet processed.
    Pending,
    /// Chunking/embedding in progress.
    Processing,
    /// Fully ingested and queryable.
    Ready,
    /// Processing failed; see the record's error.
    Failed,
}

/// Status record for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocRecord {
    /// Document id.
    pub id: String,
    /// Correlation id supplied by or returned to the caller.
    pub track_id: String,
    /// Original source path, when ingested from a file.
    #[serde(default)]
    pub source: Option<String>,
    /// Current status.
    pub status: DocStatus,
    /// Failure detail when status is `failed`.
    #[serde(default)]
    pub error: Option<String>,
    /// Number of chunks produced.
    pub chunk_count: usize,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last transition timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Full original text of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullDoc {
    /// Document id.
    pub id: String,
    /// Original text.
    pub text: String,
    /// Original source path, when ingested from a file.
    #[serde(default)]
    pub source: Option<String>,
}

/// Chunk text persisted in the KB's chunk KV store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Chunk id (`<doc_id>-<ordinal>`).
    pub id: String,
    /// Owning document id.
    pub doc_id: String,
    /// Chunk text.
    pub text: String,
    /// Byte offset within the document.
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

/// Outcome of one insert.
#[derive(Debug, Clone, Serialize)]
pub struct InsertOutcome {
    /// Document id.
    pub doc_id: String,
    /// Correlation id.
    pub track_id: String,
    /// Final status.
    pub status: DocStatus,
    /// Chunks produced.
    pub chunk_count: usize,
}

/// The ingestion pipeline.
pub struct IngestPipeline {
    embedder: Arc<dyn Embedder>,
    upload_dir: PathBuf,
    allowed_file_types: Vec<String>,
    max_file_size: u64,
}

impl std::fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("upload_dir", &self.upload_dir)
            .field("allowed", &self.allowed_file_types)
            .finish()
    }
}

impl IngestPipeline {
    /// Creates the pipeline.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        upload_dir: impl Into<PathBuf>,
        allowed_file_types: Vec<String>,
        max_file_size: u64,
    ) -> Self {
        Self {
            embedder,
            upload_dir: upload_dir.into(),
            allowed_file_types,
            max_file_size,
        }
    }

    /// Ingests one text into `kb`.
    pub async fn insert_text(
        &self,
        kb: &KnowledgeBase,
        text: &str,
        doc_id: Option<String>,
        track_id: Option<String>,
        source: Option<String>,
    ) -> IngestResult<InsertOutcome> {
        if text.trim().is_empty() {
            return Err(IngestError::BadInput("text must not be empty".into()));
        }

        let doc_id = doc_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("doc-{}", uuid::Uuid::new_v4()));
        let track_id = track_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("track-{}", uuid::Uuid::new_v4()));

        let now = Utc::now();
        let mut record = DocRecord {
            id: doc_id.clone(),
            track_id: track_id.clone(),
            source: source.clone(),
            status: DocStatus::Pending,
            error: None,
            chunk_count: 0,
            created_at: now,
            updated_at: now,
        };
        kb.with_status_mut(|status| status.put(doc_id.clone(), record.clone()))??;

        record.status = DocStatus::Processing;
        record.updated_at = Utc::now();
        kb.with_status_mut(|status| status.put(doc_id.clone(), record.clone()))??;

        match self.process(kb, &doc_id, text, source).await {
            Ok(chunk_count) => {
                record.status = DocStatus::Ready;
                record.chunk_count = chunk_count;
                record.updated_at = Utc::now();
                kb.with_status_mut(|status| status.put(doc_id.clone(), record.clone()))??;
                info!(doc = %doc_id, track = %track_id, chunks = chunk_count, "document ingested");
                Ok(InsertOutcome {
                    doc_id,
                    track_id,
                    status: DocStatus::Ready,
                    chunk_count,
                })
            }
            Err(e) => {
                // Roll the document back to a clean failed state: no chunks,
                // no vectors, no graph residue.
                warn!(doc = %doc_id, error = %e, "ingest failed, rolling back partial state");
                self.rollback(kb, &doc_id);
                record.status = DocStatus::Failed;
                record.error = Some(e.to_string());
                record.updated_at = Utc::now();
                let _ = kb.with_status_mut(|status| status.put(doc_id.clone(), record.clone()));
                Err(e)
            }
        }
    }

    async fn process(
        &self,
        kb: &KnowledgeBase,
        doc_id: &str,
        text: &str,
        source: Option<String>,
    ) -> IngestResult<usize> {
        let (chunk_size, chunk_overlap, auto_update) = {
            let info = kb.info()?;
            (
                info.config.chunk_size,
                info.config.chunk_overlap,
                info.config.auto_update,
            )
        };

        let chunks = chunk_text(text, chunk_size, chunk_overlap);
        if chunks.is_empty() {
            return Err(IngestError::BadInput("text produced no chunks".into()));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        for embedding in &embeddings {
            crate::constants::validate_embedding_dim(self.embedder.dim(), embedding)
                .map_err(crate::llm::AdapterError::from)?;
        }

        let metas: Vec<ChunkMeta> = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| ChunkMeta {
                id: format!("{doc_id}-{i}"),
                doc_id: doc_id.to_string(),
                start: c.start,
                end: c.end,
            })
            .collect();

        kb.with_vector_mut(|index| index.insert(metas.clone(), &embeddings))??;

        let stored: Vec<(String, StoredChunk)> = metas
            .iter()
            .zip(&chunks)
            .map(|(meta, c)| {
                (
                    meta.id.clone(),
                    StoredChunk {
                        id: meta.id.clone(),
                        doc_id: doc_id.to_string(),
                        text: c.text.clone(),
                        start: c.start,
                        end: c.end,
                    },
                )
            })
            .collect();
        kb.with_chunks_mut(|store| store.put_many(stored))??;

        kb.with_docs_mut(|docs| {
            docs.put(
                doc_id.to_string(),
                FullDoc {
                    id: doc_id.to_string(),
                    text: text.to_string(),
                    source,
                },
            )
        })??;

        if auto_update {
            kb.with_graph_mut(|graph| -> IngestResult<()> {
                for (meta, c) in metas.iter().zip(&chunks) {
                    let entities = extract_entities(&c.text);
                    for entity in &entities {
                        graph.upsert_node(entity, "entity", &meta.id);
                    }
                    for (i, a) in entities.iter().enumerate() {
                        for b in entities.iter().skip(i + 1) {
                            graph.upsert_edge(a, b, "co-occurs", 1.0);
                        }
                    }
                }
                graph.persist()?;
                Ok(())
            })??;
        }

        debug!(doc = doc_id, chunks = chunks.len(), "document processed");
        Ok(chunks.len())
    }

    /// Removes whatever a failed ingest managed to write.
    fn rollback(&self, kb: &KnowledgeBase, doc_id: &str) {
        let removed_chunks: HashSet<String> = kb
            .with_chunks(|store| {
                store
                    .iter()
                    .filter(|(_, c)| c.doc_id == doc_id)
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default();

        let _ = kb.with_vector_mut(|index| index.remove_doc(doc_id));
        let _ = kb.with_chunks_mut(|store| store.remove_where(|_, c| c.doc_id != doc_id));
        let _ = kb.with_docs_mut(|docs| docs.remove(doc_id));
        if !removed_chunks.is_empty() {
            let _ = kb.with_graph_mut(|graph| {
                graph.remove_chunks(&removed_chunks);
                graph.persist()
            });
        }
    }

    /// Ingests many texts; each succeeds or fails on its own.
    pub async fn insert_texts(
        &self,
        kb: &KnowledgeBase,
        texts: &[String],
        track_id: Option<String>,
    ) -> Vec<IngestResult<InsertOutcome>> {
        let mut outcomes = Vec::with_capacity(texts.len());
        for text in texts {
            outcomes.push(
                self.insert_text(kb, text, None, track_id.clone(), None)
                    .await,
            );
        }
        outcomes
    }

    /// Ingests an uploaded file: persists the upload, then inserts its text.
    pub async fn insert_file(
        &self,
        kb: &KnowledgeBase,
        filename: &str,
        bytes: &[u8],
        track_id: Option<String>,
    ) -> IngestResult<InsertOutcome> {
        if bytes.len() as u64 > self.max_file_size {
            return Err(IngestError::BadInput(format!(
                "file exceeds the {} byte limit",
                self.max_file_size
            )));
        }

        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !self.allowed_file_types.iter().any(|t| t == &extension) {
            return Err(IngestError::DisallowedType(extension));
        }

        // Binary formats are parsed by upstream collaborators; everything
        // accepted here is treated as UTF-8 text.
        let text = String::from_utf8_lossy(bytes).to_string();

        let stored_name = format!("{}-{}", uuid::Uuid::new_v4(), sanitize_filename(filename));
        let stored_path = self.upload_dir.join(&stored_name);
        std::fs::create_dir_all(&self.upload_dir)
            .map_err(|e| IngestError::storage(&self.upload_dir, e))?;
        std::fs::write(&stored_path, bytes).map_err(|e| IngestError::storage(&stored_path, e))?;

        self.insert_text(kb, &text, None, track_id, Some(filename.to_string()))
            .await
    }

    /// Walks a server-local directory and ingests every allowed file.
    pub async fn insert_directory(
        &self,
        kb: &KnowledgeBase,
        dir: &Path,
        track_id: Option<String>,
    ) -> IngestResult<Vec<IngestResult<InsertOutcome>>> {
        if !dir.is_dir() {
            return Err(IngestError::BadInput(format!(
                "'{}' is not a directory",
                dir.display()
            )));
        }

        let mut files: Vec<PathBuf> = Vec::new();
        collect_files(dir, &mut files).map_err(|e| IngestError::storage(dir, e))?;
        files.sort();

        let mut outcomes = Vec::new();
        for file in files {
            let extension = file
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();
            if !self.allowed_file_types.iter().any(|t| t == &extension) {
                continue;
            }
            let result: IngestResult<InsertOutcome> = async {
                let bytes =
                    std::fs::read(&file).map_err(|e| IngestError::storage(&file, e))?;
                let text = String::from_utf8_lossy(&bytes).to_string();
                self.insert_text(
                    kb,
                    &text,
                    None,
                    track_id.clone(),
                    Some(file.display().to_string()),
                )
                .await
            }
            .await;
            outcomes.push(result);
        }
        Ok(outcomes)
    }

    /// Status record for a document.
    pub fn doc_status(&self, kb: &KnowledgeBase, doc_id: &str) -> IngestResult<DocRecord> {
        kb.with_status(|status| status.get(doc_id).cloned())?
            .ok_or_else(|| IngestError::NotFound(doc_id.to_string()))
    }
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
