//! File-backed JSON KV stores used inside a KB working directory.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::error::{IngestError, IngestResult};

/// A whole-file JSON map with atomic rewrites.
///
/// Small by design: these stores hold per-KB document metadata and chunk
/// text, bounded by what one tenant ingests, and are always accessed under
/// the KB's lock.
#[derive(Debug)]
pub struct KvStore<T> {
    path: PathBuf,
    entries: BTreeMap<String, T>,
}

impl<T: Serialize + DeserializeOwned + Clone> KvStore<T> {
    /// Opens the store, creating an empty file if absent.
    pub fn open(path: impl Into<PathBuf>) -> IngestResult<Self> {
        let path = path.into();
        if !path.exists() {
            let store = Self {
                path,
                entries: BTreeMap::new(),
            };
            store.persist()?;
            return Ok(store);
        }

        let bytes = fs::read(&path).map_err(|e| IngestError::storage(&path, e))?;
        let entries: BTreeMap<String, T> = if bytes.is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_slice(&bytes).map_err(|e| IngestError::Corrupt {
                path: path.clone(),
                detail: e.to_string(),
            })?
        };
        Ok(Self { path, entries })
    }

    /// Looks up a key.
    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key)
    }

    /// Inserts or replaces a value and persists.
    pub fn put(&mut self, key: impl Into<String>, value: T) -> IngestResult<()> {
        self.entries.insert(key.into(), value);
        self.persist()
    }

    /// Inserts many values with a single rewrite.
    pub fn put_many(&mut self, items: Vec<(String, T)>) -> IngestResult<()> {
        for (key, value) in items {
            self.entries.insert(key, value);
        }
        self.persist()
    }

    /// Removes a key and persists. Returns the removed value.
    pub fn remove(&mut self, key: &str) -> IngestResult<Option<T>> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Removes every key matching the predicate with a single rewrite.
    pub fn remove_where(&mut self, keep: impl Fn(&str, &T) -> bool) -> IngestResult<usize> {
        let before = self.entries.len();
        self.entries.retain(|k, v| keep(k, v));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Entry count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &T)> {
        self.entries.iter()
    }

    fn persist(&self) -> IngestResult<()> {
        let bytes = serde_json::to_vec_pretty(&self.entries).map_err(|e| IngestError::Corrupt {
            path: self.path.clone(),
            detail: e.to_string(),
        })?;
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| IngestError::storage(&self.path, e))?;
        tmp.write_all(&bytes)
            .map_err(|e| IngestError::storage(&self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| IngestError::storage(&self.path, e.error))?;
        Ok(())
    }
}
