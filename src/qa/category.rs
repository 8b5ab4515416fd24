//! One open QA category: pair map, embedding matrix, row index, persistence.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{QaError, QaResult};
use super::model::QaPair;

const PAIRS_FILE: &str = "pairs.json";
const VECTORS_FILE: &str = "vectors.bin";
const META_FILE: &str = "meta.json";

#[derive(Debug, Serialize, Deserialize)]
struct CategoryMeta {
    pair_count: usize,
    embedding_dim: usize,
    updated_at: DateTime<Utc>,
}

/// In-memory form of one category.
///
/// The matrix is row-major f32; `row_order[i]` names the pair behind row `i`
/// and `row_index` is its inverse. On disk, rows are written in sorted-id
/// order (the stable iteration of `pairs.json`), so the files can always be
/// cross-checked against each other.
#[derive(Debug)]
pub struct CategoryStore {
    name: String,
    dir: PathBuf,
    dim: usize,
    pairs: HashMap<String, QaPair>,
    matrix: Vec<f32>,
    row_order: Vec<String>,
    row_index: HashMap<String, usize>,
}

impl CategoryStore {
    /// Creates an empty category and writes its initial files.
    pub fn create(dir: &Path, name: &str, dim: usize) -> QaResult<Self> {
        fs::create_dir_all(dir).map_err(|e| QaError::storage(dir, e))?;
        let store = Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            dim,
            pairs: HashMap::new(),
            matrix: Vec::new(),
            row_order: Vec::new(),
            row_index: HashMap::new(),
        };
        store.persist()?;
        Ok(store)
    }

    /// Loads a category from its directory, validating file consistency.
    pub fn load(dir: &Path, name: &str, dim: usize) -> QaResult<Self> {
        let meta_path = dir.join(META_FILE);
        let meta_bytes =
            fs::read(&meta_path).map_err(|e| QaError::storage(meta_path.clone(), e))?;
        let meta: CategoryMeta =
            serde_json::from_slice(&meta_bytes).map_err(|e| QaError::Corrupt {
                path: meta_path.clone(),
                detail: e.to_string(),
            })?;

        if meta.embedding_dim != dim {
            return Err(QaError::Corrupt {
                path: meta_path,
                detail: format!(
                    "embedding dimension mismatch: store has {}, service expects {}",
                    meta.embedding_dim, dim
                ),
            });
        }

        let pairs_path = dir.join(PAIRS_FILE);
        let pairs_bytes =
            fs::read(&pairs_path).map_err(|e| QaError::storage(pairs_path.clone(), e))?;
        let pairs: BTreeMap<String, QaPair> =
            serde_json::from_slice(&pairs_bytes).map_err(|e| QaError::Corrupt {
                path: pairs_path.clone(),
                detail: e.to_string(),
            })?;

        if pairs.len() != meta.pair_count {
            return Err(QaError::Corrupt {
                path: pairs_path,
                detail: format!(
                    "pair count mismatch: pairs.json has {}, meta.json says {}",
                    pairs.len(),
                    meta.pair_count
                ),
            });
        }

        let vectors_path = dir.join(VECTORS_FILE);
        let vector_bytes =
            fs::read(&vectors_path).map_err(|e| QaError::storage(vectors_path.clone(), e))?;
        let expected_bytes = pairs.len() * dim * 4;
        if vector_bytes.len() != expected_bytes {
            return Err(QaError::Corrupt {
                path: vectors_path,
                detail: format!(
                    "vector file holds {} bytes, expected {}",
                    vector_bytes.len(),
                    expected_bytes
                ),
            });
        }

        let matrix: Vec<f32> = bytemuck::cast_slice::<u8, f32>(&vector_bytes).to_vec();

        // Rows were persisted in sorted-id order; BTreeMap iteration matches.
        let row_order: Vec<String> = pairs.keys().cloned().collect();
        let row_index = row_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        Ok(Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            dim,
            pairs: pairs.into_iter().collect(),
            matrix,
            row_order,
            row_index,
        })
    }

    /// The category name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Live pair count.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` if the category holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// All pairs, unsorted.
    pub fn pairs(&self) -> impl Iterator<Item = &QaPair> {
        self.pairs.values()
    }

    /// Looks up one pair.
    pub fn get(&self, id: &str) -> Option<&QaPair> {
        self.pairs.get(id)
    }

    /// Appends a pair with its question embedding and rewrites the files.
    pub fn append(&mut self, pair: QaPair, embedding: &[f32]) -> QaResult<()> {
        crate::constants::validate_embedding_dim(self.dim, embedding).map_err(|e| {
            QaError::BadInput(e.to_string())
        })?;
        if self.pairs.contains_key(&pair.id) {
            return Err(QaError::BadInput(format!(
                "pair id '{}' already exists in category '{}'",
                pair.id, self.name
            )));
        }

        let row = self.row_order.len();
        self.matrix.extend_from_slice(embedding);
        self.row_order.push(pair.id.clone());
        self.row_index.insert(pair.id.clone(), row);
        self.pairs.insert(pair.id.clone(), pair);

        self.persist()
    }

    /// Replaces an existing pair, optionally with a new embedding.
    pub fn replace(
        &mut self,
        pair: QaPair,
        embedding: Option<&[f32]>,
    ) -> QaResult<()> {
        let row = *self.row_index.get(&pair.id).ok_or_else(|| QaError::NotFound {
            kind: "pair",
            id: pair.id.clone(),
        })?;

        if let Some(embedding) = embedding {
            crate::constants::validate_embedding_dim(self.dim, embedding)
                .map_err(|e| QaError::BadInput(e.to_string()))?;
            self.matrix[row * self.dim..(row + 1) * self.dim].copy_from_slice(embedding);
        }
        self.pairs.insert(pair.id.clone(), pair);

        self.persist()
    }

    /// Removes a pair: swap its row with the last, truncate, fix the index.
    pub fn remove(&mut self, id: &str) -> QaResult<QaPair> {
        let row = *self.row_index.get(id).ok_or_else(|| QaError::NotFound {
            kind: "pair",
            id: id.to_string(),
        })?;
        let last = self.row_order.len() - 1;

        if row != last {
            let (head, tail) = self.matrix.split_at_mut(last * self.dim);
            head[row * self.dim..(row + 1) * self.dim].copy_from_slice(&tail[..self.dim]);

            let moved_id = self.row_order[last].clone();
            self.row_order.swap(row, last);
            self.row_index.insert(moved_id, row);
        }

        self.matrix.truncate(last * self.dim);
        self.row_order.pop();
        self.row_index.remove(id);
        let pair = self
            .pairs
            .remove(id)
            .expect("row_index and pairs are kept in step");

        self.persist()?;
        Ok(pair)
    }

    /// Embedding row for a pair, if present.
    pub fn embedding_of(&self, id: &str) -> Option<&[f32]> {
        let row = *self.row_index.get(id)?;
        Some(&self.matrix[row * self.dim..(row + 1) * self.dim])
    }

    /// Cosine top-k against the whole matrix.
    ///
    /// Ties on similarity prefer higher confidence, then the lexicographically
    /// smaller pair id.
    pub fn top_k(&self, query: &[f32], k: usize, min_similarity: f32) -> Vec<(String, f32)> {
        if self.row_order.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(String, f32)> = self
            .row_order
            .iter()
            .enumerate()
            .map(|(row, id)| {
                let vector = &self.matrix[row * self.dim..(row + 1) * self.dim];
                (id.clone(), cosine_similarity(query, vector))
            })
            .filter(|(_, sim)| *sim >= min_similarity)
            .collect();

        scored.sort_by(|(a_id, a_sim), (b_id, b_sim)| {
            b_sim
                .partial_cmp(a_sim)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let a_conf = self.pairs[a_id].confidence;
                    let b_conf = self.pairs[b_id].confidence;
                    b_conf
                        .partial_cmp(&a_conf)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a_id.cmp(b_id))
        });

        scored.truncate(k);
        scored
    }

    /// Finds a pair whose embedding clears the duplicate threshold.
    pub fn find_duplicate(&self, embedding: &[f32], threshold: f32) -> Option<(String, f32)> {
        self.row_order
            .iter()
            .enumerate()
            .map(|(row, id)| {
                let vector = &self.matrix[row * self.dim..(row + 1) * self.dim];
                (id.clone(), cosine_similarity(embedding, vector))
            })
            .filter(|(_, sim)| *sim > threshold)
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Truncates the storage files to empty and removes the directory.
    pub fn destroy(self) -> QaResult<bool> {
        // Truncate before unlink so a crash mid-delete leaves an empty
        // category rather than a half-populated one.
        for file in [PAIRS_FILE, VECTORS_FILE, META_FILE] {
            let path = self.dir.join(file);
            if path.exists() {
                fs::write(&path, b"").map_err(|e| QaError::storage(&path, e))?;
            }
        }

        let existed = self.dir.exists();
        if existed {
            fs::remove_dir_all(&self.dir).map_err(|e| QaError::storage(&self.dir, e))?;
        }
        Ok(existed)
    }

    /// Rewrites all three files atomically (write to temp, then rename).
    ///
    /// Rows are emitted in sorted-id order so `pairs.json` iteration and
    /// `vectors.bin` rows stay aligned without a separate order file.
    pub fn persist(&self) -> QaResult<()> {
        let sorted: BTreeMap<&String, &QaPair> =
            self.pairs.iter().map(|(k, v)| (k, v)).collect();

        let mut vector_bytes: Vec<u8> = Vec::with_capacity(self.matrix.len() * 4);
        for id in sorted.keys() {
            let row = self.row_index[*id];
            let slice = &self.matrix[row * self.dim..(row + 1) * self.dim];
            vector_bytes.extend_from_slice(bytemuck::cast_slice(slice));
        }

        let pairs_json = serde_json::to_vec_pretty(&sorted).map_err(|e| QaError::Corrupt {
            path: self.dir.join(PAIRS_FILE),
            detail: e.to_string(),
        })?;

        let meta = CategoryMeta {
            pair_count: self.pairs.len(),
            embedding_dim: self.dim,
            updated_at: Utc::now(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta).map_err(|e| QaError::Corrupt {
            path: self.dir.join(META_FILE),
            detail: e.to_string(),
        })?;

        write_atomic(&self.dir, PAIRS_FILE, &pairs_json)?;
        write_atomic(&self.dir, VECTORS_FILE, &vector_bytes)?;
        write_atomic(&self.dir, META_FILE, &meta_json)?;
        Ok(())
    }
}

/// Writes `bytes` to `dir/name` via a temp file in the same directory.
fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> QaResult<()> {
    let path = dir.join(name);
    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| QaError::storage(&path, e))?;
    tmp.write_all(bytes).map_err(|e| QaError::storage(&path, e))?;
    tmp.persist(&path)
        .map_err(|e| QaError::storage(&path, e.error))?;
    Ok(())
}

/// Cosine similarity of two equal-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
