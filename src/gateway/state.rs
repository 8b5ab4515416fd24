//! Shared application state threaded through every handler.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::CacheCoordinator;
use crate::config::Config;
use crate::identity::{IdentityResolver, RateGate};
use crate::ingest::IngestPipeline;
use crate::kb::KbManager;
use crate::orchestrator::Orchestrator;
use crate::qa::QaStore;
use crate::telemetry::{Metrics, TcpProber};

/// One owner for everything a handler can touch.
///
/// Constructed once at startup; handlers receive it as an explicit context
/// rather than reaching for globals.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Arc<Config>,
    /// Identity derivation.
    pub identity: Arc<IdentityResolver>,
    /// Admission control.
    pub rate_gate: Arc<RateGate>,
    /// The five coordinated caches.
    pub cache: Arc<CacheCoordinator>,
    /// The fixed-QA store.
    pub qa: Arc<QaStore>,
    /// KB lifecycle.
    pub kb_manager: Arc<KbManager>,
    /// Document ingestion.
    pub ingest: Arc<IngestPipeline>,
    /// The query pipeline.
    pub orchestrator: Arc<Orchestrator>,
    /// Request metrics.
    pub metrics: Arc<Metrics>,
    /// Embedding-service reachability probe.
    pub prober: Arc<TcpProber>,
    /// Structured log file backing `/logs`.
    pub log_path: PathBuf,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("log_path", &self.log_path)
            .finish()
    }
}
