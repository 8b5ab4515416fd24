//! Per-request metrics, health probing, and log tailing.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpStream;
use tracing::debug;

use crate::constants::{HEALTH_CHECK_BUDGET_SECS, HEALTH_PROBE_CACHE_SECS};

/// Log-scale latency buckets in milliseconds; the last bucket is open-ended.
const LATENCY_BUCKETS_MS: [u64; 15] = [
    1, 2, 5, 10, 20, 50, 100, 200, 500, 1_000, 2_000, 5_000, 10_000, 30_000, 60_000,
];

#[derive(Debug, Default)]
struct Histogram {
    counts: [u64; LATENCY_BUCKETS_MS.len() + 1],
    total: u64,
    sum_ms: u64,
}

impl Histogram {
    fn record(&mut self, latency: Duration) {
        let ms = latency.as_millis() as u64;
        let bucket = LATENCY_BUCKETS_MS
            .iter()
            .position(|&upper| ms <= upper)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.counts[bucket] += 1;
        self.total += 1;
        self.sum_ms += ms;
    }

    /// Upper bound of the bucket holding the `p`-th percentile.
    fn percentile_ms(&self, p: f64) -> u64 {
        if self.total == 0 {
            return 0;
        }
        let target = ((self.total as f64) * p).ceil() as u64;
        let mut seen = 0u64;
        for (i, count) in self.counts.iter().enumerate() {
            seen += count;
            if seen >= target {
                return LATENCY_BUCKETS_MS
                    .get(i)
                    .copied()
                    .unwrap_or(*LATENCY_BUCKETS_MS.last().expect("buckets non-empty"));
            }
        }
        *LATENCY_BUCKETS_MS.last().expect("buckets non-empty")
    }
}

#[derive(Debug, Default)]
struct RouteMetrics {
    by_status: BTreeMap<u16, u64>,
    latency: Histogram,
}

/// Latency summary for one route.
#[derive(Debug, Clone, Serialize)]
pub struct RouteSnapshot {
    /// Requests per status code.
    pub by_status: BTreeMap<u16, u64>,
    /// Total requests.
    pub total: u64,
    /// Mean latency in ms.
    pub mean_ms: f64,
    /// p50 latency bucket in ms.
    pub p50_ms: u64,
    /// p95 latency bucket in ms.
    pub p95_ms: u64,
    /// p99 latency bucket in ms.
    pub p99_ms: u64,
}

/// Full metrics snapshot for the HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Total requests served.
    pub total_requests: u64,
    /// Requests that ended in a 5xx.
    pub total_errors: u64,
    /// Bytes read from request bodies.
    pub bytes_in: u64,
    /// Bytes written to response bodies.
    pub bytes_out: u64,
    /// Seconds since process start.
    pub uptime_secs: u64,
    /// Per-route breakdown keyed by `METHOD route`.
    pub routes: BTreeMap<String, RouteSnapshot>,
}

/// Process-wide request metrics.
#[derive(Debug)]
pub struct Metrics {
    started: Instant,
    total: AtomicU64,
    errors: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    routes: Mutex<BTreeMap<String, RouteMetrics>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            total: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            routes: Mutex::new(BTreeMap::new()),
        }
    }

    /// Records one finished request against its route template.
    pub fn record(
        &self,
        method: &str,
        route: &str,
        status: u16,
        latency: Duration,
        bytes_in: u64,
        bytes_out: u64,
    ) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if status >= 500 {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_in.fetch_add(bytes_in, Ordering::Relaxed);
        self.bytes_out.fetch_add(bytes_out, Ordering::Relaxed);

        let key = format!("{method} {route}");
        let mut routes = self.routes.lock();
        let entry = routes.entry(key).or_default();
        *entry.by_status.entry(status).or_insert(0) += 1;
        entry.latency.record(latency);
    }

    /// Snapshot for `/metrics`.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let routes = self.routes.lock();
        let mut out = BTreeMap::new();
        for (key, metrics) in routes.iter() {
            let total = metrics.latency.total;
            out.insert(
                key.clone(),
                RouteSnapshot {
                    by_status: metrics.by_status.clone(),
                    total,
                    mean_ms: if total == 0 {
                        0.0
                    } else {
                        metrics.latency.sum_ms as f64 / total as f64
                    },
                    p50_ms: metrics.latency.percentile_ms(0.50),
                    p95_ms: metrics.latency.percentile_ms(0.95),
                    p99_ms: metrics.latency.percentile_ms(0.99),
                },
            );
        }

        MetricsSnapshot {
            total_requests: self.total.load(Ordering::Relaxed),
            total_errors: self.errors.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            uptime_secs: self.started.elapsed().as_secs(),
            routes: out,
        }
    }
}

/// Health of one dependency.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyHealth {
    /// Dependency name.
    pub name: &'static str,
    /// Whether it answered.
    pub healthy: bool,
    /// Failure detail when unhealthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Overall health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// `healthy` or `degraded`.
    pub status: &'static str,
    /// Per-dependency results.
    pub dependencies: Vec<DependencyHealth>,
}

impl HealthReport {
    /// Builds the report; degraded when any dependency failed.
    pub fn from_dependencies(dependencies: Vec<DependencyHealth>) -> Self {
        let status = if dependencies.iter().all(|d| d.healthy) {
            "healthy"
        } else {
            "degraded"
        };
        Self {
            status,
            dependencies,
        }
    }
}

/// TCP reachability probe with a short-lived cache.
///
/// The embedding service is probed at most once per cache window so the
/// health endpoint stays cheap under polling.
#[derive(Debug)]
pub struct TcpProber {
    target: Option<SocketAddr>,
    target_raw: String,
    cached: Mutex<Option<(Instant, bool)>>,
}

impl TcpProber {
    /// Creates a prober for the host behind an API base URL.
    pub fn for_api_base(api_base: &str) -> Self {
        Self {
            target: parse_probe_addr(api_base),
            target_raw: api_base.to_string(),
            cached: Mutex::new(None),
        }
    }

    /// Probes (or serves the cached result).
    pub async fn probe(&self) -> DependencyHealth {
        let Some(target) = self.target else {
            return DependencyHealth {
                name: "embedding",
                healthy: false,
                detail: Some(format!("unresolvable address '{}'", self.target_raw)),
            };
        };

        if let Some((at, healthy)) = *self.cached.lock() {
            if at.elapsed() < Duration::from_secs(HEALTH_PROBE_CACHE_SECS) {
                return DependencyHealth {
                    name: "embedding",
                    healthy,
                    detail: (!healthy).then(|| "cached probe failure".to_string()),
                };
            }
        }

        let healthy = matches!(
            tokio::time::timeout(Duration::from_secs(1), TcpStream::connect(target)).await,
            Ok(Ok(_))
        );
        *self.cached.lock() = Some((Instant::now(), healthy));
        debug!(target = %target, healthy, "embedding service probed");

        DependencyHealth {
            name: "embedding",
            healthy,
            detail: (!healthy).then(|| format!("tcp connect to {target} failed")),
        }
    }
}

/// The whole-health-check budget.
pub fn health_budget() -> Duration {
    Duration::from_secs(HEALTH_CHECK_BUDGET_SECS)
}

fn parse_probe_addr(api_base: &str) -> Option<SocketAddr> {
    let without_scheme = api_base
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(api_base);
    let authority = without_scheme.split('/').next()?;
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().ok()?),
        None => (
            authority,
            if api_base.starts_with("https") { 443 } else { 80 },
        ),
    };
    use std::net::ToSocketAddrs;
    (host, port).to_socket_addrs().ok()?.next()
}

/// Returns the last `lines` lines of the log file.
pub fn tail_log(path: &Path, lines: usize) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].iter().map(|s| s.to_string()).collect())
}
