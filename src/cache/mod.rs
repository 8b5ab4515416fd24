//! Multi-tier cache coordinator.
//!
//! Five named caches with identical semantics, owned by one coordinator that
//! handles invalidation order and aggregate statistics.

pub mod store;

#[cfg(test)]
mod tests;

pub use store::{CacheStats, CacheStore};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::System;
use thiserror::Error;

/// The five coordinated caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// Full LLM responses keyed by request fingerprint.
    LlmResponse,
    /// Embedding vectors keyed by text fingerprint.
    Vector,
    /// Graph neighborhoods keyed by label+depth.
    KnowledgeGraph,
    /// Parsed documents keyed by content hash.
    Documents,
    /// Assembled query results keyed by query fingerprint.
    Queries,
}

impl CacheKind {
    /// All kinds, in `clear_all` invalidation order: cheap derived data first,
    /// expensive-to-rebuild vectors last.
    pub const CLEAR_ORDER: [CacheKind; 5] = [
        CacheKind::Queries,
        CacheKind::Documents,
        CacheKind::LlmResponse,
        CacheKind::KnowledgeGraph,
        CacheKind::Vector,
    ];

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::LlmResponse => "llm_response",
            CacheKind::Vector => "vector",
            CacheKind::KnowledgeGraph => "knowledge_graph",
            CacheKind::Documents => "documents",
            CacheKind::Queries => "queries",
        }
    }

    /// Parses a cache name. Accepts the short `llm` alias used by the HTTP
    /// surface alongside canonical names.
    pub fn parse(name: &str) -> Option<CacheKind> {
        match name {
            "llm" | "llm_response" => Some(CacheKind::LlmResponse),
            "vector" => Some(CacheKind::Vector),
            "knowledge_graph" => Some(CacheKind::KnowledgeGraph),
            "documents" => Some(CacheKind::Documents),
            "queries" => Some(CacheKind::Queries),
            _ => None,
        }
    }
}

/// Errors from coordinator-level operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The named cache does not exist.
    #[error("unknown cache type '{0}'")]
    UnknownType(String),
}

/// Result of a clear operation.
#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    /// Entries removed.
    pub entries_removed: usize,
    /// Bytes freed.
    pub bytes_freed: u64,
}

/// Aggregate statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStats {
    /// Per-cache stats keyed by canonical name.
    pub caches: HashMap<&'static str, CacheStats>,
    /// Resident memory of this process in MB.
    pub process_memory_mb: f64,
    /// Used host memory in MB.
    pub host_used_memory_mb: f64,
    /// Total host memory in MB.
    pub host_total_memory_mb: f64,
    /// Whether caching is enabled at all.
    pub enabled: bool,
}

/// Sizing for one cache.
#[derive(Debug, Clone, Copy)]
struct CacheBudget {
    max_entries: usize,
    max_bytes: u64,
}

const DEFAULT_BUDGET_MB: u64 = 128;
const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Owns the five caches and their invalidation/statistics contract.
///
/// When caching is disabled every `get` is a miss and every `set` a no-op, so
/// callers never need to branch on configuration.
pub struct CacheCoordinator {
    caches: HashMap<CacheKind, Arc<CacheStore>>,
    enabled: bool,
    system: Mutex<System>,
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("enabled", &self.enabled)
            .field("caches", &self.caches.len())
            .finish()
    }
}

impl CacheCoordinator {
    /// Builds the coordinator from configuration.
    ///
    /// `per_cache_size_limits` maps cache names to MB budgets; unnamed caches
    /// get the default budget.
    pub fn new(
        enabled: bool,
        default_ttl: Duration,
        per_cache_size_limits: &HashMap<String, u64>,
    ) -> Self {
        let mut caches = HashMap::new();
        for kind in CacheKind::CLEAR_ORDER {
            let budget = Self::budget_for(kind, per_cache_size_limits);
            caches.insert(
                kind,
                Arc::new(CacheStore::new(
                    kind.as_str(),
                    budget.max_entries,
                    budget.max_bytes,
                    default_ttl,
                )),
            );
        }
        Self {
            caches,
            enabled,
            system: Mutex::new(System::new()),
        }
    }

    fn budget_for(kind: CacheKind, limits: &HashMap<String, u64>) -> CacheBudget {
        let mb = limits
            .get(kind.as_str())
            .copied()
            .unwrap_or(DEFAULT_BUDGET_MB);
        CacheBudget {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_bytes: mb * 1024 * 1024,
        }
    }

    /// Whether caching is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Looks up `key` in the named cache.
    pub fn get(&self, kind: CacheKind, key: &str) -> Option<Arc<serde_json::Value>> {
        if !self.enabled {
            return None;
        }
        self.store(kind).get(key)
    }

    /// Stores `value` in the named cache.
    pub fn set(
        &self,
        kind: CacheKind,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        self.store(kind).set(key, value, ttl)
    }

    /// Clears one cache by name. Unknown names are rejected.
    pub fn clear_type(&self, name: &str) -> Result<ClearResult, CacheError> {
        let kind = CacheKind::parse(name).ok_or_else(|| CacheError::UnknownType(name.to_string()))?;
        let (entries_removed, bytes_freed) = self.store(kind).clear();
        tracing::info!(cache = kind.as_str(), entries = entries_removed, "cache cleared");
        Ok(ClearResult {
            entries_removed,
            bytes_freed,
        })
    }

    /// Clears every cache in the fixed order, then hints memory compaction.
    pub fn clear_all(&self) -> ClearResult {
        let mut total = ClearResult {
            entries_removed: 0,
            bytes_freed: 0,
        };
        for kind in CacheKind::CLEAR_ORDER {
            let (entries, bytes) = self.store(kind).clear();
            total.entries_removed += entries;
            total.bytes_freed += bytes;
        }

        // The allocator reclaims lazily; the hint is observability, the frees
        // above are the actual work.
        tracing::info!(
            entries = total.entries_removed,
            bytes = total.bytes_freed,
            "all caches cleared, memory compaction hinted"
        );
        total
    }

    /// Per-cache stats plus process/host memory snapshot.
    pub fn stats_all(&self) -> CoordinatorStats {
        let mut caches = HashMap::new();
        for (kind, store) in &self.caches {
            caches.insert(kind.as_str(), store.stats());
        }

        let (process_mb, used_mb, total_mb) = self.memory_snapshot();

        CoordinatorStats {
            caches,
            process_memory_mb: process_mb,
            host_used_memory_mb: used_mb,
            host_total_memory_mb: total_mb,
            enabled: self.enabled,
        }
    }

    /// Stats for one cache.
    pub fn stats(&self, kind: CacheKind) -> CacheStats {
        self.store(kind).stats()
    }

    fn memory_snapshot(&self) -> (f64, f64, f64) {
        let mut system = self.system.lock();
        system.refresh_memory();

        let pid = sysinfo::get_current_pid().ok();
        let process_mb = pid
            .and_then(|pid| {
                system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
                system.process(pid).map(|p| p.memory() as f64 / (1024.0 * 1024.0))
            })
            .unwrap_or(0.0);

        let used_mb = system.used_memory() as f64 / (1024.0 * 1024.0);
        let total_mb = system.total_memory() as f64 / (1024.0 * 1024.0);
        (process_mb, used_mb, total_mb)
    }

    fn store(&self, kind: CacheKind) -> &CacheStore {
        self.caches
            .get(&kind)
            .expect("all cache kinds are constructed in new()")
    }
}
