//! Fixed-QA matching subsystem.
//!
//! A category-partitioned vector store over curated (question, answer) pairs.
//! Each category is a directory (`pairs.json`, `vectors.bin`, `meta.json`)
//! under one root; a root `index.json` lists known categories. Categories are
//! the concurrency unit: writes and queries on one category serialize through
//! a keyed lock, different categories proceed independently, and batch writes
//! fence all involved categories through an ordered multi-lock.

pub mod category;
pub mod error;
pub mod import;
pub mod model;


pub use category::CategoryStore;
pub use error::{QaError, QaResult};
pub use import::{ImportFormat, ImportReport};
pub use model::{
    BatchAddOutcome, CategoryDeleteResult, NewQaPair, QaMatch, QaPair, QaPairUpdate,
    QaQueryResult, QaStatistics,
};

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::constants::{QA_DUPLICATE_THRESHOLD, TOP_K_MAX, TOP_K_MIN};
use crate::llm::Embedder;
use crate::sync::{InitLock, KeyedLocks, init_once};

const INDEX_FILE: &str = "index.json";

type SharedCategory = Arc<RwLock<CategoryStore>>;

/// The fixed-QA store.
pub struct QaStore {
    root: PathBuf,
    dim: usize,
    default_min_similarity: f32,
    embedder: Arc<dyn Embedder>,
    locks: KeyedLocks,
    create_lock: InitLock,
    /// Open categories.
    categories: DashMap<String, SharedCategory>,
    /// Categories known on disk but not necessarily loaded.
    known: RwLock<BTreeSet<String>>,
    /// Pair id → owning category, for loaded categories.
    id_index: DashMap<String, String>,
}

impl std::fmt::Debug for QaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QaStore")
            .field("root", &self.root)
            .field("dim", &self.dim)
            .field("loaded_categories", &self.categories.len())
            .finish()
    }
}

impl QaStore {
    /// Opens the store at `root`, creating the directory and index if absent.
    ///
    /// Categories listed in the index are loaded lazily on first touch.
    pub fn open(
        root: impl Into<PathBuf>,
        dim: usize,
        default_min_similarity: f32,
        embedder: Arc<dyn Embedder>,
    ) -> QaResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| QaError::storage(&root, e))?;

        let index_path = root.join(INDEX_FILE);
        let known: BTreeSet<String> = if index_path.exists() {
            let bytes = fs::read(&index_path).map_err(|e| QaError::storage(&index_path, e))?;
            serde_json::from_slice(&bytes).map_err(|e| QaError::Corrupt {
                path: index_path.clone(),
                detail: e.to_string(),
            })?
        } else {
            BTreeSet::new()
        };

        let store = Self {
            root,
            dim,
            default_min_similarity,
            embedder,
            locks: KeyedLocks::new(),
            create_lock: InitLock::new("qa-category-create"),
            categories: DashMap::new(),
            known: RwLock::new(known),
            id_index: DashMap::new(),
        };
        if !index_path.exists() {
            store.persist_index()?;
        }

        info!(
            root = %store.root.display(),
            known = store.known.read().len(),
            "QA store opened"
        );
        Ok(store)
    }

    /// The similarity threshold used when a query does not override it.
    pub fn default_min_similarity(&self) -> f32 {
        self.default_min_similarity
    }

    /// The store's embedding dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    // -- create --

    /// Adds one pair, lazily creating its category.
    pub async fn add(&self, new: NewQaPair) -> QaResult<String> {
        new.validate()?;
        let embedding = self.embedder.embed(&new.question).await?;
        let category = new.category.trim().to_string();

        let _lock = self.locks.acquire(&category, "write").await?;
        let shared = self.ensure_storage(&category).await?;

        let pair = new.into_pair(Utc::now());
        let id = pair.id.clone();
        shared.write().append(pair, &embedding)?;
        self.id_index.insert(id.clone(), category);

        Ok(id)
    }

    /// Adds many pairs.
    ///
    /// All involved categories are locked up front in lexicographic order, so
    /// the batch serializes against every single-category writer it overlaps.
    /// Each pair succeeds or fails on its own; failures do not roll back
    /// earlier successes.
    pub async fn add_batch(&self, pairs: Vec<NewQaPair>) -> QaResult<Vec<BatchAddOutcome>> {
        let mut outcomes: Vec<BatchAddOutcome> = (0..pairs.len())
            .map(|index| BatchAddOutcome {
                index,
                id: None,
                success: false,
                error: None,
            })
            .collect();

        // Validate and embed before taking any lock.
        let mut staged: Vec<(usize, NewQaPair, Vec<f32>)> = Vec::new();
        {
            let mut texts = Vec::new();
            let mut valid = Vec::new();
            for (i, new) in pairs.into_iter().enumerate() {
                match new.validate() {
                    Ok(()) => {
                        texts.push(new.question.clone());
                        valid.push((i, new));
                    }
                    Err(e) => outcomes[i].error = Some(e.to_string()),
                }
            }
            if !valid.is_empty() {
                let embeddings = self.embedder.embed_batch(&texts).await?;
                for ((i, new), embedding) in valid.into_iter().zip(embeddings) {
                    staged.push((i, new, embedding));
                }
            }
        }

        if staged.is_empty() {
            return Ok(outcomes);
        }

        let mut categories: Vec<String> = staged
            .iter()
            .map(|(_, new, _)| new.category.trim().to_string())
            .collect();
        categories.sort();
        categories.dedup();
        let category_refs: Vec<&str> = categories.iter().map(String::as_str).collect();

        let _locks = self.locks.acquire_many(&category_refs, "batch").await?;

        for (i, new, embedding) in staged {
            let category = new.category.trim().to_string();
            let result: QaResult<String> = async {
                let shared = self.ensure_storage(&category).await?;
                let pair = new.into_pair(Utc::now());
                let id = pair.id.clone();
                shared.write().append(pair, &embedding)?;
                Ok(id)
            }
            .await;

            match result {
                Ok(id) => {
                    self.id_index.insert(id.clone(), category);
                    outcomes[i].id = Some(id);
                    outcomes[i].success = true;
                }
                Err(e) => outcomes[i].error = Some(e.to_string()),
            }
        }

        Ok(outcomes)
    }

    // -- query --

    /// Similarity query over one category or all of them.
    pub async fn query(
        &self,
        question: &str,
        top_k: usize,
        min_similarity: Option<f32>,
        category: Option<&str>,
    ) -> QaResult<QaQueryResult> {
        if question.trim().is_empty() {
            return Err(QaError::BadInput("question must not be empty".into()));
        }
        if !(TOP_K_MIN..=TOP_K_MAX).contains(&top_k) {
            return Err(QaError::BadInput(format!(
                "top_k must be within [{TOP_K_MIN}, {TOP_K_MAX}], got {top_k}"
            )));
        }
        let min_similarity = min_similarity.unwrap_or(self.default_min_similarity);
        if !(0.0..=1.0).contains(&min_similarity) {
            return Err(QaError::BadInput(format!(
                "min_similarity must be within [0.0, 1.0], got {min_similarity}"
            )));
        }

        let query_vec = self.embedder.embed(question).await?;

        // Lock scope: the one named category, or every category in lex order.
        let scope: Vec<String> = match category {
            Some(name) => {
                if !self.category_exists(name) {
                    return Ok(QaQueryResult::miss(min_similarity));
                }
                vec![name.to_string()]
            }
            None => self.known_categories(),
        };
        if scope.is_empty() {
            return Ok(QaQueryResult::miss(min_similarity));
        }

        let refs: Vec<&str> = scope.iter().map(String::as_str).collect();
        let _locks = self.locks.acquire_many(&refs, "query").await?;

        let mut matches: Vec<QaMatch> = Vec::new();
        for name in &scope {
            let Some(shared) = self.load_if_present(name).await? else {
                continue;
            };
            let guard = shared.read();
            for (id, similarity) in guard.top_k(&query_vec, top_k, min_similarity) {
                if let Some(pair) = guard.get(&id) {
                    matches.push(QaMatch {
                        pair: pair.clone(),
                        similarity,
                    });
                }
            }
        }

        // Global re-sort across categories with the same tie discipline.
        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.pair
                        .confidence
                        .partial_cmp(&a.pair.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.pair.id.cmp(&b.pair.id))
        });
        matches.truncate(top_k);

        let best = matches.first();
        Ok(QaQueryResult {
            found: best.is_some(),
            answer: best.map(|m| m.pair.answer.clone()),
            similarity: best.map(|m| m.similarity),
            matches,
            min_similarity,
        })
    }

    // -- read --

    /// Looks up one pair by id.
    pub async fn get_pair(&self, id: &str) -> QaResult<QaPair> {
        let category = self.category_of(id).await?;
        let _lock = self.locks.acquire(&category, "read").await?;

        let shared = self
            .load_if_present(&category)
            .await?
            .ok_or_else(|| QaError::NotFound {
                kind: "pair",
                id: id.to_string(),
            })?;
        let guard = shared.read();
        guard.get(id).cloned().ok_or_else(|| QaError::NotFound {
            kind: "pair",
            id: id.to_string(),
        })
    }

    /// Lists pairs with optional filters, sorted by (category, id).
    pub async fn list_pairs(
        &self,
        category: Option<&str>,
        min_confidence: Option<f32>,
        offset: usize,
        limit: usize,
    ) -> QaResult<(usize, Vec<QaPair>)> {
        let scope: Vec<String> = match category {
            Some(name) => {
                if !self.category_exists(name) {
                    return Ok((0, Vec::new()));
                }
                vec![name.to_string()]
            }
            None => self.known_categories(),
        };
        if scope.is_empty() {
            return Ok((0, Vec::new()));
        }

        let refs: Vec<&str> = scope.iter().map(String::as_str).collect();
        let _locks = self.locks.acquire_many(&refs, "read").await?;

        let mut all: Vec<QaPair> = Vec::new();
        for name in &scope {
            let Some(shared) = self.load_if_present(name).await? else {
                continue;
            };
            let guard = shared.read();
            all.extend(guard.pairs().cloned());
        }

        if let Some(min) = min_confidence {
            all.retain(|p| p.confidence >= min);
        }
        all.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.id.cmp(&b.id)));

        let total = all.len();
        let page: Vec<QaPair> = all.into_iter().skip(offset).take(limit).collect();
        Ok((total, page))
    }

    // -- update --

    /// Applies a partial update; a changed question re-embeds.
    pub async fn update_pair(&self, id: &str, update: QaPairUpdate) -> QaResult<QaPair> {
        if let Some(confidence) = update.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(QaError::BadInput(format!(
                    "confidence must be within [0.0, 1.0], got {confidence}"
                )));
            }
        }

        let category = self.category_of(id).await?;

        // Embed outside the lock when the question changes.
        let new_embedding = match &update.question {
            Some(question) if !question.trim().is_empty() => {
                Some(self.embedder.embed(question).await?)
            }
            Some(_) => return Err(QaError::BadInput("question must not be empty".into())),
            None => None,
        };

        let _lock = self.locks.acquire(&category, "write").await?;
        let shared = self
            .load_if_present(&category)
            .await?
            .ok_or_else(|| QaError::NotFound {
                kind: "pair",
                id: id.to_string(),
            })?;

        let mut guard = shared.write();
        let mut pair = guard
            .get(id)
            .cloned()
            .ok_or_else(|| QaError::NotFound {
                kind: "pair",
                id: id.to_string(),
            })?;

        if let Some(question) = update.question {
            pair.question = question.trim().to_string();
        }
        if let Some(answer) = update.answer {
            pair.answer = answer;
        }
        if let Some(confidence) = update.confidence {
            pair.confidence = confidence;
        }
        if let Some(keywords) = update.keywords {
            pair.keywords = keywords;
        }
        if let Some(source) = update.source {
            pair.source = source;
        }
        pair.updated_at = Utc::now();

        guard.replace(pair.clone(), new_embedding.as_deref())?;
        Ok(pair)
    }

    // -- delete --

    /// Deletes one pair.
    pub async fn delete_pair(&self, id: &str) -> QaResult<QaPair> {
        let category = self.category_of(id).await?;
        let _lock = self.locks.acquire(&category, "write").await?;

        let shared = self
            .load_if_present(&category)
            .await?
            .ok_or_else(|| QaError::NotFound {
                kind: "pair",
                id: id.to_string(),
            })?;

        let pair = shared.write().remove(id)?;
        self.id_index.remove(id);
        Ok(pair)
    }

    /// Deletes a whole category: pairs, cross-references, files, directory.
    pub async fn delete_category(&self, name: &str) -> QaResult<CategoryDeleteResult> {
        let _lock = self.locks.acquire(name, "delete").await?;

        // Re-check under the lock; a concurrent delete may have won.
        let loaded = self.categories.remove(name).map(|(_, v)| v);
        let dir = self.category_dir(name);

        let deleted_count = match loaded {
            Some(shared) => {
                let store = match Arc::try_unwrap(shared) {
                    Ok(lock) => lock.into_inner(),
                    Err(shared) => {
                        // Another holder still has the Arc; fall back to
                        // draining it in place before dropping our reference.
                        let guard = shared.read();
                        let count = guard.len();
                        for pair in guard.pairs() {
                            self.id_index.remove(&pair.id);
                        }
                        drop(guard);
                        self.forget_category(name)?;
                        if dir.exists() {
                            fs::remove_dir_all(&dir)
                                .map_err(|e| QaError::storage(&dir, e))?;
                            return Ok(CategoryDeleteResult {
                                deleted_count: count,
                                folder_deleted: true,
                            });
                        }
                        return Ok(CategoryDeleteResult {
                            deleted_count: count,
                            folder_deleted: false,
                        });
                    }
                };
                let count = store.len();
                for pair in store.pairs() {
                    self.id_index.remove(&pair.id);
                }
                let folder_deleted = store.destroy()?;
                self.forget_category(name)?;
                return Ok(CategoryDeleteResult {
                    deleted_count: count,
                    folder_deleted,
                });
            }
            // Never loaded: count pairs from disk when readable, then remove.
            None => match CategoryStore::load(&dir, name, self.dim) {
                Ok(store) => store.len(),
                Err(_) => 0,
            },
        };

        let folder_deleted = if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| QaError::storage(&dir, e))?;
            true
        } else {
            false
        };
        self.forget_category(name)?;

        debug!(category = name, deleted_count, folder_deleted, "category deleted");
        Ok(CategoryDeleteResult {
            deleted_count,
            folder_deleted,
        })
    }

    // -- import / export --

    /// Imports records parsed from an uploaded payload.
    ///
    /// A record whose question embeds above the duplicate threshold against an
    /// existing pair in the same category either replaces that pair
    /// (`overwrite_existing`) or is skipped and reported.
    pub async fn import(
        &self,
        payload: &[u8],
        format: ImportFormat,
        overwrite_existing: bool,
    ) -> QaResult<ImportReport> {
        let records = import::parse_records(payload, format)?;
        let mut report = ImportReport::default();

        for (index, record) in records.into_iter().enumerate() {
            report.processed += 1;

            if let Err(e) = record.validate() {
                report.failed += 1;
                report.failed_records.push(import::FailedRecord {
                    index,
                    question: record.question.clone(),
                    error: e.to_string(),
                });
                continue;
            }

            let embedding = self.embedder.embed(&record.question).await?;
            let category = record.category.trim().to_string();

            let _lock = self.locks.acquire(&category, "write").await?;
            let result: QaResult<bool> = async {
                let shared = self.ensure_storage(&category).await?;
                let mut guard = shared.write();

                if let Some((existing_id, similarity)) =
                    guard.find_duplicate(&embedding, QA_DUPLICATE_THRESHOLD)
                {
                    if !overwrite_existing {
                        debug!(
                            question = %record.question,
                            existing = %existing_id,
                            similarity,
                            "skipping duplicate on import"
                        );
                        return Ok(false);
                    }
                    let existing = guard
                        .get(&existing_id)
                        .cloned()
                        .expect("duplicate id came from this category");
                    let mut pair = record.clone().into_pair(Utc::now());
                    pair.id = existing.id;
                    pair.created_at = existing.created_at;
                    guard.replace(pair, Some(&embedding))?;
                    return Ok(true);
                }

                let pair = record.clone().into_pair(Utc::now());
                let id = pair.id.clone();
                guard.append(pair, &embedding)?;
                drop(guard);
                self.id_index.insert(id, category.clone());
                Ok(true)
            }
            .await;

            match result {
                Ok(true) => report.succeeded += 1,
                Ok(false) => report.duplicate_skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    report.failed_records.push(import::FailedRecord {
                        index,
                        question: record.question.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            duplicates = report.duplicate_skipped,
            "QA import finished"
        );
        Ok(report)
    }

    /// Exports every pair, sorted by (category, id).
    pub async fn export(&self) -> QaResult<Vec<QaPair>> {
        let (_, pairs) = self.list_pairs(None, None, 0, usize::MAX).await?;
        Ok(pairs)
    }

    // -- statistics --

    /// Aggregate statistics, taken under all category locks so no mid-write
    /// state is observable.
    pub async fn statistics(&self) -> QaResult<QaStatistics> {
        let scope = self.known_categories();
        let refs: Vec<&str> = scope.iter().map(String::as_str).collect();
        let _locks = self.locks.acquire_many(&refs, "stats").await?;

        let mut categories = BTreeMap::new();
        let mut total = 0usize;
        let mut confidence_sum = 0.0f64;

        for name in &scope {
            let Some(shared) = self.load_if_present(name).await? else {
                continue;
            };
            let guard = shared.read();
            let count = guard.len();
            if count == 0 {
                continue;
            }
            categories.insert(name.clone(), count);
            total += count;
            confidence_sum += guard.pairs().map(|p| p.confidence as f64).sum::<f64>();
        }

        Ok(QaStatistics {
            total_pairs: total,
            categories,
            average_confidence: if total == 0 {
                0.0
            } else {
                (confidence_sum / total as f64) as f32
            },
            similarity_threshold: self.default_min_similarity,
            vector_dimension: self.dim,
        })
    }

    /// Known category names, loaded or not, in lexicographic order.
    pub fn known_categories(&self) -> Vec<String> {
        self.known.read().iter().cloned().collect()
    }

    // -- internals --

    fn category_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn category_exists(&self, name: &str) -> bool {
        self.known.read().contains(name)
    }

    /// Resolves the owning category of a pair id, loading categories lazily
    /// until the id is found.
    async fn category_of(&self, id: &str) -> QaResult<String> {
        if let Some(entry) = self.id_index.get(id) {
            return Ok(entry.value().clone());
        }

        // The pair may live in a category that has not been touched yet.
        for name in self.known_categories() {
            if self.categories.contains_key(&name) {
                continue;
            }
            let _lock = self.locks.acquire(&name, "read").await?;
            self.load_if_present(&name).await?;
            if let Some(entry) = self.id_index.get(id) {
                return Ok(entry.value().clone());
            }
        }

        Err(QaError::NotFound {
            kind: "pair",
            id: id.to_string(),
        })
    }

    /// Loads a category from disk if its directory exists.
    ///
    /// Caller must hold the category lock.
    async fn load_if_present(&self, name: &str) -> QaResult<Option<SharedCategory>> {
        if let Some(entry) = self.categories.get(name) {
            return Ok(Some(entry.value().clone()));
        }

        let dir = self.category_dir(name);
        if !dir.join("meta.json").exists() {
            return Ok(None);
        }

        let store = CategoryStore::load(&dir, name, self.dim)?;
        for pair in store.pairs() {
            self.id_index.insert(pair.id.clone(), name.to_string());
        }
        let shared: SharedCategory = Arc::new(RwLock::new(store));
        self.categories.insert(name.to_string(), shared.clone());
        debug!(category = name, "category loaded");
        Ok(Some(shared))
    }

    /// Double-checked lazy creation of category storage.
    ///
    /// Caller must hold the category lock; the global create lock guarantees
    /// that two writers racing on a never-seen category produce exactly one
    /// storage object.
    async fn ensure_storage(&self, name: &str) -> QaResult<SharedCategory> {
        let categories = &self.categories;
        let read = || categories.get(name).map(|e| e.value().clone());

        let shared = init_once(&self.create_lock, read, || async {
            if let Some(shared) = self.load_if_present(name).await? {
                return Ok(shared);
            }

            let dir = self.category_dir(name);
            let store = CategoryStore::create(&dir, name, self.dim)?;
            let shared: SharedCategory = Arc::new(RwLock::new(store));
            // Publish fully-built storage: map entry first, then the index,
            // both before the create lock is released.
            self.categories.insert(name.to_string(), shared.clone());
            self.remember_category(name)?;
            info!(category = name, "category storage created");
            Ok(shared)
        })
        .await
        .map_err(|e| match e {
            crate::sync::InitError::Lock(l) => QaError::Lock(l),
            crate::sync::InitError::Init(inner) => inner,
        })?;

        Ok(shared)
    }

    fn remember_category(&self, name: &str) -> QaResult<()> {
        {
            let mut known = self.known.write();
            if !known.insert(name.to_string()) {
                return Ok(());
            }
        }
        self.persist_index()
    }

    fn forget_category(&self, name: &str) -> QaResult<()> {
        self.categories.remove(name);
        {
            let mut known = self.known.write();
            if !known.remove(name) {
                return Ok(());
            }
        }
        self.persist_index()
    }

    fn persist_index(&self) -> QaResult<()> {
        let names: Vec<String> = self.known.read().iter().cloned().collect();
        let bytes = serde_json::to_vec_pretty(&names).map_err(|e| QaError::Corrupt {
            path: self.root.join(INDEX_FILE),
            detail: e.to_string(),
        })?;
        write_atomic_root(&self.root, INDEX_FILE, &bytes)
    }
}

fn write_atomic_root(dir: &Path, name: &str, bytes: &[u8]) -> QaResult<()> {
    let path = dir.join(name);
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| QaError::storage(&path, e))?;
    tmp.write_all(bytes).map_err(|e| QaError::storage(&path, e))?;
    tmp.persist(&path)
        .map_err(|e| QaError::storage(&path, e.error))?;
    Ok(())
}
