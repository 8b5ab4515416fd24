//! Tiered fixed-window rate limiting with per-user minimum intervals.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use super::UserIdentity;

/// Upper bound on tracked identities; least-recently-touched buckets evict.
const DEFAULT_MAX_BUCKETS: usize = 100_000;

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Admit the request; a token was consumed.
    Accept,
    /// The tier's window quota is exhausted.
    RejectRate {
        /// Time until the window resets.
        retry_after: Duration,
    },
    /// The request arrived before the minimum inter-arrival interval elapsed.
    RejectInterval {
        /// Time until the next request may be accepted.
        retry_after: Duration,
    },
}

impl Decision {
    /// `true` for [`Decision::Accept`].
    pub fn is_accept(&self) -> bool {
        matches!(self, Decision::Accept)
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    window_start: Instant,
    count: u32,
    last_accepted: Option<Instant>,
}

/// Per-identity fixed-window counter plus minimum-interval enforcement.
///
/// The bucket table is LRU-bounded; one slow leak of identities cannot grow
/// it without bound. A periodic [`sweep`](RateGate::sweep) drops buckets whose
/// window has long expired.
#[derive(Debug)]
pub struct RateGate {
    buckets: Mutex<LruCache<String, Bucket>>,
    window: Duration,
    min_interval: Duration,
    tiers: HashMap<String, u32>,
    default_capacity: u32,
}

impl RateGate {
    /// Creates a gate from configuration.
    pub fn new(
        window: Duration,
        min_interval: Duration,
        tiers: HashMap<String, u32>,
        default_capacity: u32,
    ) -> Self {
        Self::with_max_buckets(window, min_interval, tiers, default_capacity, DEFAULT_MAX_BUCKETS)
    }

    /// Creates a gate with an explicit bucket-table bound.
    pub fn with_max_buckets(
        window: Duration,
        min_interval: Duration,
        tiers: HashMap<String, u32>,
        default_capacity: u32,
        max_buckets: usize,
    ) -> Self {
        let cap = NonZeroUsize::new(max_buckets.max(1)).expect("max(1) is non-zero");
        Self {
            buckets: Mutex::new(LruCache::new(cap)),
            window,
            min_interval,
            tiers,
            default_capacity,
        }
    }

    /// Capacity for a tier, via the `default` tier for unknown names.
    pub fn capacity_for(&self, tier: &str) -> u32 {
        self.tiers
            .get(tier)
            .or_else(|| self.tiers.get("default"))
            .copied()
            .unwrap_or(self.default_capacity)
    }

    /// Checks admission for `identity`, consuming a token only on accept.
    pub fn check(&self, identity: &UserIdentity) -> Decision {
        self.check_at(identity, Instant::now())
    }

    /// Admission check with an explicit clock, for deterministic tests.
    pub fn check_at(&self, identity: &UserIdentity, now: Instant) -> Decision {
        let capacity = self.capacity_for(&identity.tier);
        let mut buckets = self.buckets.lock();

        if !buckets.contains(&identity.user_id) {
            buckets.put(
                identity.user_id.clone(),
                Bucket {
                    window_start: now,
                    count: 0,
                    last_accepted: None,
                },
            );
        }
        let bucket = buckets
            .get_mut(&identity.user_id)
            .expect("bucket was just ensured");

        // Roll the fixed window forward.
        if now.duration_since(bucket.window_start) >= self.window {
            bucket.window_start = now;
            bucket.count = 0;
        }

        if bucket.count >= capacity {
            let elapsed = now.duration_since(bucket.window_start);
            let retry_after = self.window.saturating_sub(elapsed);
            return Decision::RejectRate { retry_after };
        }

        if !self.min_interval.is_zero() {
            if let Some(last) = bucket.last_accepted {
                let since = now.duration_since(last);
                if since < self.min_interval {
                    return Decision::RejectInterval {
                        retry_after: self.min_interval - since,
                    };
                }
            }
        }

        bucket.count += 1;
        bucket.last_accepted = Some(now);
        Decision::Accept
    }

    /// Number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Drops buckets idle for more than two windows. Returns removals.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let horizon = self.window * 2;
        let mut buckets = self.buckets.lock();

        let stale: Vec<String> = buckets
            .iter()
            .filter(|(_, b)| now.duration_since(b.window_start) > horizon)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            buckets.pop(id);
        }
        stale.len()
    }
}
