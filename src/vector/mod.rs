//! Per-KB chunk vector index.
//!
//! One index per knowledge base, persisted under `vector_cache/` as an
//! id-aligned f32 matrix (`vectors.bin`) plus chunk metadata (`chunks.json`).
//! Chunk text itself lives in the KB's text-chunk KV store; the index only
//! knows ids, owners, and embeddings.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::validate_embedding_dim;

const CHUNKS_FILE: &str = "chunks.json";
const VECTORS_FILE: &str = "vectors.bin";

/// Errors from the vector index.
#[derive(Debug, Error)]
pub enum VectorError {
    /// Disk I/O failed.
    #[error("vector storage failure at {path}: {source}")]
    Storage {
        /// Path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Files do not agree with each other.
    #[error("corrupted vector index at {path}: {detail}")]
    Corrupt {
        /// Path involved.
        path: PathBuf,
        /// What was inconsistent.
        detail: String,
    },

    /// An embedding did not match the index dimension.
    #[error(transparent)]
    Dimension(#[from] crate::constants::DimValidationError),
}

/// Metadata for one indexed chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMeta {
    /// Chunk id (`<doc_id>-<ordinal>`).
    pub id: String,
    /// Owning document id.
    pub doc_id: String,
    /// Byte offset of the chunk within its document.
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

/// A scored index hit.
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// The matched chunk.
    pub chunk: ChunkMeta,
    /// Cosine similarity.
    pub score: f32,
}

/// The index: metadata rows aligned with a row-major f32 matrix.
#[derive(Debug)]
pub struct VectorIndex {
    dir: PathBuf,
    dim: usize,
    chunks: Vec<ChunkMeta>,
    matrix: Vec<f32>,
}

impl VectorIndex {
    /// Opens the index directory, creating an empty one if needed.
    pub fn open(dir: impl Into<PathBuf>, dim: usize) -> Result<Self, VectorError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| VectorError::Storage {
            path: dir.clone(),
            source: e,
        })?;

        let chunks_path = dir.join(CHUNKS_FILE);
        if !chunks_path.exists() {
            let index = Self {
                dir,
                dim,
                chunks: Vec::new(),
                matrix: Vec::new(),
            };
            index.persist()?;
            return Ok(index);
        }

        let chunk_bytes = fs::read(&chunks_path).map_err(|e| VectorError::Storage {
            path: chunks_path.clone(),
            source: e,
        })?;
        let chunks: Vec<ChunkMeta> =
            serde_json::from_slice(&chunk_bytes).map_err(|e| VectorError::Corrupt {
                path: chunks_path.clone(),
                detail: e.to_string(),
            })?;

        let vectors_path = dir.join(VECTORS_FILE);
        let vector_bytes = fs::read(&vectors_path).map_err(|e| VectorError::Storage {
            path: vectors_path.clone(),
            source: e,
        })?;
        let expected = chunks.len() * dim * 4;
        if vector_bytes.len() != expected {
            return Err(VectorError::Corrupt {
                path: vectors_path,
                detail: format!("{} bytes on disk, expected {}", vector_bytes.len(), expected),
            });
        }

        Ok(Self {
            dir,
            dim,
            matrix: bytemuck::cast_slice::<u8, f32>(&vector_bytes).to_vec(),
            chunks,
        })
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns `true` when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The index dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Appends chunks with their embeddings and persists.
    pub fn insert(
        &mut self,
        chunks: Vec<ChunkMeta>,
        embeddings: &[Vec<f32>],
    ) -> Result<(), VectorError> {
        if chunks.len() != embeddings.len() {
            return Err(VectorError::Corrupt {
                path: self.dir.clone(),
                detail: format!(
                    "{} chunks with {} embeddings",
                    chunks.len(),
                    embeddings.len()
                ),
            });
        }
        for embedding in embeddings {
            validate_embedding_dim(self.dim, embedding)?;
        }

        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            self.matrix.extend_from_slice(embedding);
            self.chunks.push(chunk);
        }
        self.persist()
    }

    /// Removes all chunks of a document. Returns how many were dropped.
    pub fn remove_doc(&mut self, doc_id: &str) -> Result<usize, VectorError> {
        let keep: Vec<usize> = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.doc_id != doc_id)
            .map(|(i, _)| i)
            .collect();
        let removed = self.chunks.len() - keep.len();
        if removed == 0 {
            return Ok(0);
        }

        let mut matrix = Vec::with_capacity(keep.len() * self.dim);
        let mut chunks = Vec::with_capacity(keep.len());
        for i in keep {
            matrix.extend_from_slice(&self.matrix[i * self.dim..(i + 1) * self.dim]);
            chunks.push(self.chunks[i].clone());
        }
        self.matrix = matrix;
        self.chunks = chunks;

        self.persist()?;
        Ok(removed)
    }

    /// Cosine top-k over the whole index.
    pub fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<VectorHit>, VectorError> {
        validate_embedding_dim(self.dim, query)?;
        if self.chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<VectorHit> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(row, chunk)| VectorHit {
                chunk: chunk.clone(),
                score: crate::qa::category::cosine_similarity(
                    query,
                    &self.matrix[row * self.dim..(row + 1) * self.dim],
                ),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Chunk count per document.
    pub fn doc_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for chunk in &self.chunks {
            *counts.entry(chunk.doc_id.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Drops everything and persists the empty state.
    pub fn clear(&mut self) -> Result<usize, VectorError> {
        let removed = self.chunks.len();
        self.chunks.clear();
        self.matrix.clear();
        self.persist()?;
        Ok(removed)
    }

    fn persist(&self) -> Result<(), VectorError> {
        let chunks_json =
            serde_json::to_vec_pretty(&self.chunks).map_err(|e| VectorError::Corrupt {
                path: self.dir.join(CHUNKS_FILE),
                detail: e.to_string(),
            })?;
        write_atomic(&self.dir, CHUNKS_FILE, &chunks_json)?;
        write_atomic(&self.dir, VECTORS_FILE, bytemuck::cast_slice(&self.matrix))?;
        Ok(())
    }
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), VectorError> {
    let path = dir.join(name);
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| VectorError::Storage {
        path: path.clone(),
        source: e,
    })?;
    tmp.write_all(bytes).map_err(|e| VectorError::Storage {
        path: path.clone(),
        source: e,
    })?;
    tmp.persist(&path).map_err(|e| VectorError::Storage {
        path,
        source: e.error,
    })?;
    Ok(())
}
