//! Concurrency primitives: keyed locks, ordered multi-locks, double-checked init.
//!
//! Every acquisition is bounded by a timeout and surfaces
//! [`LockError::Timeout`] rather than ever succeeding silently.


use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::constants::DEFAULT_LOCK_TIMEOUT_SECS;

/// Errors returned by lock acquisition.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock could not be acquired within the configured bound.
    #[error("timed out acquiring lock '{name}' for {purpose} after {waited:?}")]
    Timeout {
        /// Lock name.
        name: String,
        /// Purpose the caller declared.
        purpose: &'static str,
        /// How long the caller waited.
        waited: Duration,
    },
}

/// A held keyed lock. Releases on drop.
#[derive(Debug)]
pub struct LockHandle {
    name: String,
    purpose: &'static str,
    _guard: OwnedMutexGuard<()>,
}

impl LockHandle {
    /// The lock name this handle holds.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared purpose.
    pub fn purpose(&self) -> &'static str {
        self.purpose
    }
}

/// A held ordered multi-lock. Releases in reverse acquisition order on drop.
#[derive(Debug)]
pub struct MultiLockHandle {
    handles: Vec<LockHandle>,
}

impl MultiLockHandle {
    /// Names held by this handle, in acquisition (lexicographic) order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handles.iter().map(|h| h.name())
    }
}

impl Drop for MultiLockHandle {
    fn drop(&mut self) {
        // Reverse acquisition order.
        while let Some(handle) = self.handles.pop() {
            drop(handle);
        }
    }
}

/// A table of named locks.
///
/// Same name serializes regardless of purpose — the purpose string exists for
/// tracing and error reporting only. This deliberately fences readers and
/// writers of one resource against each other.
#[derive(Debug)]
pub struct KeyedLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl KeyedLocks {
    /// Creates a lock table with the default 30 s acquisition bound.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS))
    }

    /// Creates a lock table with a custom acquisition bound.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    /// Acquires the lock for `name`, waiting at most the configured bound.
    pub async fn acquire(&self, name: &str, purpose: &'static str) -> Result<LockHandle, LockError> {
        let mutex = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = tokio::time::timeout(self.timeout, mutex.lock_owned())
            .await
            .map_err(|_| LockError::Timeout {
                name: name.to_string(),
                purpose,
                waited: self.timeout,
            })?;

        tracing::trace!(name = %name, purpose = purpose, "lock acquired");

        Ok(LockHandle {
            name: name.to_string(),
            purpose,
            _guard: guard,
        })
    }

    /// Acquires all named locks in lexicographic order.
    ///
    /// Callers that always go through this method cannot deadlock against each
    /// other: the acquisition order is total. Duplicate names are collapsed.
    pub async fn acquire_many(
        &self,
        names: &[&str],
        purpose: &'static str,
    ) -> Result<MultiLockHandle, LockError> {
        let mut sorted: Vec<&str> = names.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut handles = Vec::with_capacity(sorted.len());
        for name in sorted {
            handles.push(self.acquire(name, purpose).await?);
        }

        Ok(MultiLockHandle { handles })
    }

    /// Number of lock entries currently in the table.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Drops table entries nobody holds or waits on.
    ///
    /// Safe because re-acquisition recreates the entry; only entries whose
    /// `Arc` has a single owner (the table itself) are removed.
    pub fn sweep(&self) -> usize {
        let before = self.locks.len();
        self.locks
            .retain(|_, mutex| Arc::strong_count(mutex) > 1 || mutex.try_lock().is_err());
        before - self.locks.len()
    }
}

impl Default for KeyedLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// A single named lock for one global critical section.
///
/// Used for "create storage for a never-seen resource" sections, where two
/// concurrent writers must produce exactly one storage object.
#[derive(Debug)]
pub struct InitLock {
    name: &'static str,
    mutex: Arc<Mutex<()>>,
    timeout: Duration,
}

impl InitLock {
    /// Creates a named init lock with the default bound.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            mutex: Arc::new(Mutex::new(())),
            timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
        }
    }

    /// Acquires the init lock.
    pub async fn acquire(&self) -> Result<LockHandle, LockError> {
        let guard = tokio::time::timeout(self.timeout, self.mutex.clone().lock_owned())
            .await
            .map_err(|_| LockError::Timeout {
                name: self.name.to_string(),
                purpose: "init",
                waited: self.timeout,
            })?;

        Ok(LockHandle {
            name: self.name.to_string(),
            purpose: "init",
            _guard: guard,
        })
    }
}

/// Double-checked lazy initialization.
///
/// 1. `read()` with no lock held — return if present.
/// 2. Acquire the init lock.
/// 3. `read()` again — return if another initializer won.
/// 4. Run `init`, which must publish the value before returning it.
///
/// For any resource id, at most one `init` completes, and no reader observes
/// a partially initialized resource (publication happens inside `init`, under
/// the lock, after the resource is fully built).
pub async fn init_once<T, E, Fut>(
    lock: &InitLock,
    read: impl Fn() -> Option<Arc<T>>,
    init: impl FnOnce() -> Fut,
) -> Result<Arc<T>, InitError<E>>
where
    Fut: Future<Output = Result<Arc<T>, E>>,
{
    if let Some(existing) = read() {
        return Ok(existing);
    }

    let _guard = lock.acquire().await?;

    if let Some(existing) = read() {
        return Ok(existing);
    }

    init().await.map_err(InitError::Init)
}

/// Errors from [`init_once`].
#[derive(Debug, Error)]
pub enum InitError<E> {
    /// The init lock could not be acquired in time.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The initializer itself failed.
    #[error("initialization failed: {0}")]
    Init(E),
}
