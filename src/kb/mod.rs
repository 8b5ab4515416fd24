//! Multi-tenant knowledge-base lifecycle.
//!
//! Each KB is a working directory holding document KV stores, a chunk vector
//! index, and a knowledge graph. Exactly one KB is "current" for ambient
//! queries; any request may override it. Creation is double-checked under a
//! keyed lock, and a created directory is fully laid out before the KB
//! becomes visible to anyone.

pub mod error;
pub mod meta;


pub use error::{KbError, KbResult};
pub use meta::{KbConfig, KbConfigPatch, KbInfo};

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::graph::GraphStore;
use crate::ingest::kv::KvStore;
use crate::ingest::{DocRecord, FullDoc, StoredChunk};
use crate::sync::KeyedLocks;
use crate::vector::VectorIndex;

const META_FILE: &str = "meta.json";
const FULL_DOCS_FILE: &str = "kv_store_full_docs.json";
const TEXT_CHUNKS_FILE: &str = "kv_store_text_chunks.json";
const DOC_STATUS_FILE: &str = "kv_store_doc_status.json";
const GRAPH_FILE: &str = "graph_chunk_entity_relation.graphml";
const VECTOR_DIR: &str = "vector_cache";
const BACKUPS_DIR: &str = "_backups";

/// One open knowledge base.
///
/// All stores sit behind short-lived `parking_lot` locks; cross-store
/// consistency is the ingest pipeline's job, done under the KB manager's
/// keyed lock. Once `deleted` flips, every accessor answers `NotFound` so
/// in-flight handles fail cleanly on their next storage call.
pub struct KnowledgeBase {
    info: RwLock<KbInfo>,
    vector: RwLock<VectorIndex>,
    graph: RwLock<GraphStore>,
    full_docs: RwLock<KvStore<FullDoc>>,
    text_chunks: RwLock<KvStore<StoredChunk>>,
    doc_status: RwLock<KvStore<DocRecord>>,
    deleted: AtomicBool,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("name", &self.info.read().name)
            .field("deleted", &self.deleted.load(Ordering::Relaxed))
            .finish()
    }
}

impl KnowledgeBase {
    /// Creates a KB with a fully initialized working directory.
    fn create(
        dir: &Path,
        name: &str,
        description: String,
        language: String,
        config: KbConfig,
        dim: usize,
    ) -> KbResult<Self> {
        fs::create_dir_all(dir).map_err(|e| KbError::storage(dir, e))?;

        let info = KbInfo {
            name: name.to_string(),
            description,
            language,
            created_at: Utc::now(),
            working_dir: dir.to_path_buf(),
            config,
        };
        write_meta(dir, &info)?;

        // Lay out every store file before anyone can observe the KB.
        let vector = VectorIndex::open(dir.join(VECTOR_DIR), dim)?;
        let graph = GraphStore::open(dir.join(GRAPH_FILE))?;
        let full_docs = KvStore::open(dir.join(FULL_DOCS_FILE)).map_err(kb_from_ingest)?;
        let text_chunks = KvStore::open(dir.join(TEXT_CHUNKS_FILE)).map_err(kb_from_ingest)?;
        let doc_status = KvStore::open(dir.join(DOC_STATUS_FILE)).map_err(kb_from_ingest)?;

        Ok(Self {
            info: RwLock::new(info),
            vector: RwLock::new(vector),
            graph: RwLock::new(graph),
            full_docs: RwLock::new(full_docs),
            text_chunks: RwLock::new(text_chunks),
            doc_status: RwLock::new(doc_status),
            deleted: AtomicBool::new(false),
        })
    }

    /// Opens an existing KB, healing missing store files.
    ///
    /// A partially created directory (e.g. an interrupted older deployment)
    /// gets its missing files recreated empty; each heal logs a warning.
    fn open(dir: &Path, name: &str, dim: usize) -> KbResult<Self> {
        let meta_path = dir.join(META_FILE);
        let meta_bytes = fs::read(&meta_path).map_err(|e| KbError::storage(&meta_path, e))?;
        let mut info: KbInfo =
            serde_json::from_slice(&meta_bytes).map_err(|e| KbError::Corrupt {
                path: meta_path,
                detail: e.to_string(),
            })?;
        info.name = name.to_string();
        info.working_dir = dir.to_path_buf();

        for file in [FULL_DOCS_FILE, TEXT_CHUNKS_FILE, DOC_STATUS_FILE, GRAPH_FILE] {
            if !dir.join(file).exists() {
                warn!(kb = name, file, "store file missing, recreating empty");
            }
        }

        Ok(Self {
            info: RwLock::new(info),
            vector: RwLock::new(VectorIndex::open(dir.join(VECTOR_DIR), dim)?),
            graph: RwLock::new(GraphStore::open(dir.join(GRAPH_FILE))?),
            full_docs: RwLock::new(
                KvStore::open(dir.join(FULL_DOCS_FILE)).map_err(kb_from_ingest)?,
            ),
            text_chunks: RwLock::new(
                KvStore::open(dir.join(TEXT_CHUNKS_FILE)).map_err(kb_from_ingest)?,
            ),
            doc_status: RwLock::new(
                KvStore::open(dir.join(DOC_STATUS_FILE)).map_err(kb_from_ingest)?,
            ),
            deleted: AtomicBool::new(false),
        })
    }

    fn guard(&self) -> KbResult<()> {
        if self.deleted.load(Ordering::Acquire) {
            return Err(KbError::NotFound(self.info.read().name.clone()));
        }
        Ok(())
    }

    fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    /// The KB name.
    pub fn name(&self) -> String {
        self.info.read().name.clone()
    }

    /// Metadata snapshot.
    pub fn info(&self) -> KbResult<KbInfo> {
        self.guard()?;
        Ok(self.info.read().clone())
    }

    /// Applies a config patch and persists the metadata.
    pub fn update_config(&self, patch: KbConfigPatch) -> KbResult<KbInfo> {
        self.guard()?;
        let mut info = self.info.write();
        if let Some(chunk_size) = patch.chunk_size {
            if chunk_size == 0 {
                return Err(KbError::BadInput("chunk_size must be non-zero".into()));
            }
            info.config.chunk_size = chunk_size;
        }
        if let Some(chunk_overlap) = patch.chunk_overlap {
            if chunk_overlap >= info.config.chunk_size {
                return Err(KbError::BadInput(
                    "chunk_overlap must be smaller than chunk_size".into(),
                ));
            }
            info.config.chunk_overlap = chunk_overlap;
        }
        if let Some(auto_update) = patch.auto_update {
            info.config.auto_update = auto_update;
        }
        if let Some(description) = patch.description {
            info.description = description;
        }
        if let Some(language) = patch.language {
            info.language = language;
        }
        write_meta(&info.working_dir, &info)?;
        Ok(info.clone())
    }

    /// Read access to the vector index.
    pub fn with_vector<R>(&self, f: impl FnOnce(&VectorIndex) -> R) -> KbResult<R> {
        self.guard()?;
        Ok(f(&self.vector.read()))
    }

    /// Write access to the vector index.
    pub fn with_vector_mut<R>(&self, f: impl FnOnce(&mut VectorIndex) -> R) -> KbResult<R> {
        self.guard()?;
        Ok(f(&mut self.vector.write()))
    }

    /// Read access to the graph store.
    pub fn with_graph<R>(&self, f: impl FnOnce(&GraphStore) -> R) -> KbResult<R> {
        self.guard()?;
        Ok(f(&self.graph.read()))
    }

    /// Write access to the graph store.
    pub fn with_graph_mut<R>(&self, f: impl FnOnce(&mut GraphStore) -> R) -> KbResult<R> {
        self.guard()?;
        Ok(f(&mut self.graph.write()))
    }

    /// Read access to the full-document store.
    pub fn with_docs<R>(&self, f: impl FnOnce(&KvStore<FullDoc>) -> R) -> KbResult<R> {
        self.guard()?;
        Ok(f(&self.full_docs.read()))
    }

    /// Write access to the full-document store.
    pub fn with_docs_mut<R>(&self, f: impl FnOnce(&mut KvStore<FullDoc>) -> R) -> KbResult<R> {
        self.guard()?;
        Ok(f(&mut self.full_docs.write()))
    }

    /// Read access to the chunk-text store.
    pub fn with_chunks<R>(&self, f: impl FnOnce(&KvStore<StoredChunk>) -> R) -> KbResult<R> {
        self.guard()?;
        Ok(f(&self.text_chunks.read()))
    }

    /// Write access to the chunk-text store.
    pub fn with_chunks_mut<R>(
        &self,
        f: impl FnOnce(&mut KvStore<StoredChunk>) -> R,
    ) -> KbResult<R> {
        self.guard()?;
        Ok(f(&mut self.text_chunks.write()))
    }

    /// Read access to the document-status store.
    pub fn with_status<R>(&self, f: impl FnOnce(&KvStore<DocRecord>) -> R) -> KbResult<R> {
        self.guard()?;
        Ok(f(&self.doc_status.read()))
    }

    /// Write access to the document-status store.
    pub fn with_status_mut<R>(
        &self,
        f: impl FnOnce(&mut KvStore<DocRecord>) -> R,
    ) -> KbResult<R> {
        self.guard()?;
        Ok(f(&mut self.doc_status.write()))
    }
}

fn kb_from_ingest(e: crate::ingest::IngestError) -> KbError {
    use crate::ingest::IngestError;
    match e {
        IngestError::Storage { path, source } => KbError::Storage { path, source },
        IngestError::Corrupt { path, detail } => KbError::Corrupt { path, detail },
        other => KbError::BadInput(other.to_string()),
    }
}

fn write_meta(dir: &Path, info: &KbInfo) -> KbResult<()> {
    let path = dir.join(META_FILE);
    let bytes = serde_json::to_vec_pretty(info).map_err(|e| KbError::Corrupt {
        path: path.clone(),
        detail: e.to_string(),
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| KbError::storage(&path, e))?;
    tmp.write_all(&bytes).map_err(|e| KbError::storage(&path, e))?;
    tmp.persist(&path).map_err(|e| KbError::storage(&path, e.error))?;
    Ok(())
}

/// Owns every open KB and the current-KB pointer.
pub struct KbManager {
    root: PathBuf,
    dim: usize,
    kbs: DashMap<String, Arc<KnowledgeBase>>,
    current: RwLock<String>,
    locks: KeyedLocks,
}

impl std::fmt::Debug for KbManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KbManager")
            .field("root", &self.root)
            .field("open", &self.kbs.len())
            .field("current", &*self.current.read())
            .finish()
    }
}

impl KbManager {
    /// Name of the KB created at first startup and used until a switch.
    pub const DEFAULT_KB: &'static str = "default";

    /// Opens the manager, registering every KB directory under `root` and
    /// guaranteeing the default KB exists.
    pub fn open(root: impl Into<PathBuf>, dim: usize) -> KbResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| KbError::storage(&root, e))?;

        let manager = Self {
            root: root.clone(),
            dim,
            kbs: DashMap::new(),
            current: RwLock::new(Self::DEFAULT_KB.to_string()),
            locks: KeyedLocks::new(),
        };

        let entries = fs::read_dir(&root).map_err(|e| KbError::storage(&root, e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !path.is_dir() || name == BACKUPS_DIR {
                continue;
            }
            if !path.join(META_FILE).exists() {
                warn!(dir = %path.display(), "skipping directory without meta.json");
                continue;
            }
            match KnowledgeBase::open(&path, &name, dim) {
                Ok(kb) => {
                    manager.kbs.insert(name.clone(), Arc::new(kb));
                    info!(kb = %name, "knowledge base registered");
                }
                Err(e) => warn!(kb = %name, error = %e, "failed to open knowledge base"),
            }
        }

        if !manager.kbs.contains_key(Self::DEFAULT_KB) {
            let dir = root.join(Self::DEFAULT_KB);
            let kb = KnowledgeBase::create(
                &dir,
                Self::DEFAULT_KB,
                "Default knowledge base".to_string(),
                "en".to_string(),
                KbConfig::default(),
                dim,
            )?;
            manager.kbs.insert(Self::DEFAULT_KB.to_string(), Arc::new(kb));
            info!("default knowledge base created");
        }

        Ok(manager)
    }

    /// Lists all KBs, sorted by name.
    pub fn list(&self) -> Vec<KbInfo> {
        let mut infos: Vec<KbInfo> = self
            .kbs
            .iter()
            .filter_map(|entry| entry.value().info().ok())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Creates a KB. Duplicate names fail with `AlreadyExists`.
    pub async fn create(
        &self,
        name: &str,
        description: String,
        language: String,
        config: KbConfig,
    ) -> KbResult<KbInfo> {
        KbInfo::validate_name(name)?;

        let _lock = self.locks.acquire(name, "create").await?;

        // Double-check under the lock: the map, then the directory.
        if self.kbs.contains_key(name) {
            return Err(KbError::AlreadyExists(name.to_string()));
        }
        let dir = self.root.join(name);
        if dir.exists() {
            return Err(KbError::AlreadyExists(name.to_string()));
        }

        let kb = KnowledgeBase::create(&dir, name, description, language, config, self.dim)?;
        let info = kb.info()?;
        self.kbs.insert(name.to_string(), Arc::new(kb));
        info!(kb = name, "knowledge base created");
        Ok(info)
    }

    /// Deletes a KB and its directory tree.
    ///
    /// The current KB is protected unless `force` is set. In-flight handles
    /// observe `NotFound` on their next storage call.
    pub async fn delete(&self, name: &str, force: bool) -> KbResult<()> {
        if *self.current.read() == name && !force {
            return Err(KbError::CurrentKb(name.to_string()));
        }

        let _lock = self.locks.acquire(name, "delete").await?;

        let Some((_, kb)) = self.kbs.remove(name) else {
            return Err(KbError::NotFound(name.to_string()));
        };
        kb.mark_deleted();

        let dir = self.root.join(name);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| KbError::storage(&dir, e))?;
        }

        // A force-deleted current KB falls back to the default.
        let mut current = self.current.write();
        if *current == name {
            *current = Self::DEFAULT_KB.to_string();
        }

        info!(kb = name, "knowledge base deleted");
        Ok(())
    }

    /// Switches the process-wide current KB.
    ///
    /// In-flight queries keep the `Arc` of the KB they resolved and run to
    /// completion against it.
    pub fn switch_current(&self, name: &str) -> KbResult<KbInfo> {
        let kb = self
            .kbs
            .get(name)
            .ok_or_else(|| KbError::NotFound(name.to_string()))?;
        let info = kb.info()?;
        *self.current.write() = name.to_string();
        info!(kb = name, "current knowledge base switched");
        Ok(info)
    }

    /// The current KB's info.
    pub fn current(&self) -> KbResult<KbInfo> {
        let name = self.current.read().clone();
        self.info(&name)
    }

    /// Info for one KB.
    pub fn info(&self, name: &str) -> KbResult<KbInfo> {
        self.kbs
            .get(name)
            .ok_or_else(|| KbError::NotFound(name.to_string()))?
            .info()
    }

    /// Resolves a KB handle: the named one, or the current one.
    pub fn get(&self, name: Option<&str>) -> KbResult<Arc<KnowledgeBase>> {
        let name = match name {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => self.current.read().clone(),
        };
        self.kbs
            .get(&name)
            .map(|entry| entry.value().clone())
            .ok_or(KbError::NotFound(name))
    }

    /// Copies the KB's working directory into the backups area.
    pub async fn backup(&self, name: &str) -> KbResult<PathBuf> {
        let _lock = self.locks.acquire(name, "backup").await?;
        if !self.kbs.contains_key(name) {
            return Err(KbError::NotFound(name.to_string()));
        }

        let src = self.root.join(name);
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let dest = self.root.join(BACKUPS_DIR).join(format!("{name}-{stamp}"));
        copy_dir(&src, &dest)?;
        info!(kb = name, backup = %dest.display(), "knowledge base backed up");
        Ok(dest)
    }

    /// Replaces a KB's contents from a backup directory.
    pub async fn restore(&self, name: &str, backup_path: &Path) -> KbResult<KbInfo> {
        KbInfo::validate_name(name)?;
        if !backup_path.join(META_FILE).exists() {
            return Err(KbError::BadInput(format!(
                "'{}' is not a knowledge base backup",
                backup_path.display()
            )));
        }

        let _lock = self.locks.acquire(name, "restore").await?;

        if let Some((_, old)) = self.kbs.remove(name) {
            old.mark_deleted();
        }
        let dir = self.root.join(name);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| KbError::storage(&dir, e))?;
        }
        copy_dir(backup_path, &dir)?;

        let kb = KnowledgeBase::open(&dir, name, self.dim)?;
        let info = kb.info()?;
        self.kbs.insert(name.to_string(), Arc::new(kb));
        info!(kb = name, from = %backup_path.display(), "knowledge base restored");
        Ok(info)
    }

    /// Applies a config patch to one KB.
    pub fn update_config(&self, name: &str, patch: KbConfigPatch) -> KbResult<KbInfo> {
        self.kbs
            .get(name)
            .ok_or_else(|| KbError::NotFound(name.to_string()))?
            .update_config(patch)
    }

    /// Whether the manager is initialized (used by the health probe).
    pub fn is_ready(&self) -> bool {
        !self.kbs.is_empty()
    }
}

fn copy_dir(src: &Path, dest: &Path) -> KbResult<()> {
    fs::create_dir_all(dest).map_err(|e| KbError::storage(dest, e))?;
    let entries = fs::read_dir(src).map_err(|e| KbError::storage(src, e))?;
    for entry in entries.flatten() {
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if from.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|e| KbError::storage(&from, e))?;
        }
    }
    Ok(())
}
