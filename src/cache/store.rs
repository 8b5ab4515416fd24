//! A single named cache: LRU bounded by entries and bytes, per-entry TTL.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

/// Sliding window length for hit-rate accounting.
const HIT_WINDOW: usize = 1024;

/// Per-cache statistics.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    /// Live entry count.
    pub item_count: usize,
    /// Approximate resident size in MB.
    pub size_mb: f64,
    /// Hit rate over the recent access window, in [0, 1].
    pub hit_rate: f64,
}

#[derive(Debug, Clone)]
struct Entry {
    value: Arc<serde_json::Value>,
    inserted_at: Instant,
    ttl: Duration,
    bytes: u64,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

#[derive(Debug)]
struct Inner {
    entries: LruCache<String, Entry>,
    total_bytes: u64,
    // Ring of recent lookup outcomes; true = hit.
    outcomes: Vec<bool>,
    outcome_cursor: usize,
    outcome_len: usize,
}

/// One named cache with uniform get/set/clear/stats semantics.
///
/// `get` never fails: expired entries are pruned on access and reported as a
/// miss. `set` is best-effort and refuses values larger than the byte budget.
#[derive(Debug)]
pub struct CacheStore {
    name: &'static str,
    inner: Mutex<Inner>,
    max_entries: usize,
    max_bytes: u64,
    default_ttl: Duration,
}

impl CacheStore {
    /// Creates a cache bounded by `max_entries` and `max_bytes`.
    pub fn new(
        name: &'static str,
        max_entries: usize,
        max_bytes: u64,
        default_ttl: Duration,
    ) -> Self {
        let cap = NonZeroUsize::new(max_entries.max(1)).expect("max(1) is non-zero");
        Self {
            name,
            inner: Mutex::new(Inner {
                entries: LruCache::new(cap),
                total_bytes: 0,
                outcomes: vec![false; HIT_WINDOW],
                outcome_cursor: 0,
                outcome_len: 0,
            }),
            max_entries: max_entries.max(1),
            max_bytes,
            default_ttl,
        }
    }

    /// The cache name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Looks up a fingerprint. Expired entries are removed and count as a miss.
    pub fn get(&self, key: &str) -> Option<Arc<serde_json::Value>> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key) {
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => {
                let value = entry.value.clone();
                Self::record(&mut inner, true);
                return Some(value);
            }
            None => false,
        };

        if expired {
            if let Some(entry) = inner.entries.pop(key) {
                inner.total_bytes = inner.total_bytes.saturating_sub(entry.bytes);
            }
        }
        Self::record(&mut inner, false);
        None
    }

    /// Inserts a value with an optional TTL override.
    ///
    /// Returns `false` when the value alone exceeds the byte budget; the cache
    /// stays untouched in that case.
    pub fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) -> bool {
        let bytes = approximate_size(&value);
        if bytes > self.max_bytes {
            tracing::debug!(
                cache = self.name,
                bytes = bytes,
                budget = self.max_bytes,
                "refusing oversize cache entry"
            );
            return false;
        }

        let entry = Entry {
            value: Arc::new(value),
            inserted_at: Instant::now(),
            ttl: ttl.unwrap_or(self.default_ttl),
            bytes,
        };

        let mut inner = self.inner.lock();

        if let Some(old) = inner.entries.put(key.to_string(), entry) {
            inner.total_bytes = inner.total_bytes.saturating_sub(old.bytes);
        }
        inner.total_bytes += bytes;

        // Byte-bound eviction; the entry-count bound is enforced by LruCache.
        while inner.total_bytes > self.max_bytes {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => {
                    inner.total_bytes = inner.total_bytes.saturating_sub(evicted.bytes);
                }
                None => break,
            }
        }

        true
    }

    /// Removes a single entry.
    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.pop(key) {
            Some(entry) => {
                inner.total_bytes = inner.total_bytes.saturating_sub(entry.bytes);
                true
            }
            None => false,
        }
    }

    /// Clears the cache, returning `(entries_removed, bytes_freed)`.
    pub fn clear(&self) -> (usize, u64) {
        let mut inner = self.inner.lock();
        let count = inner.entries.len();
        let bytes = inner.total_bytes;
        inner.entries.clear();
        inner.total_bytes = 0;
        (count, bytes)
    }

    /// Current statistics. Prunes expired entries first so counts are honest.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            if let Some(entry) = inner.entries.pop(&key) {
                inner.total_bytes = inner.total_bytes.saturating_sub(entry.bytes);
            }
        }

        let hits = inner.outcomes[..inner.outcome_len]
            .iter()
            .filter(|hit| **hit)
            .count();
        let hit_rate = if inner.outcome_len == 0 {
            0.0
        } else {
            hits as f64 / inner.outcome_len as f64
        };

        CacheStats {
            item_count: inner.entries.len(),
            size_mb: inner.total_bytes as f64 / (1024.0 * 1024.0),
            hit_rate,
        }
    }

    /// Entry-count bound.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Byte bound.
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn record(inner: &mut Inner, hit: bool) {
        let cursor = inner.outcome_cursor;
        inner.outcomes[cursor] = hit;
        inner.outcome_cursor = (cursor + 1) % HIT_WINDOW;
        inner.outcome_len = (inner.outcome_len + 1).min(HIT_WINDOW);
    }
}

/// Approximate serialized size of a JSON value in bytes.
fn approximate_size(value: &serde_json::Value) -> u64 {
    match serde_json::to_vec(value) {
        Ok(bytes) => bytes.len() as u64,
        Err(_) => 0,
    }
}
