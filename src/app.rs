//! Application assembly: configuration + adapters → [`AppState`].

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::CacheCoordinator;
use crate::config::Config;
use crate::gateway::AppState;
use crate::identity::{IdentityConfig, IdentityResolver, RateGate};
use crate::ingest::IngestPipeline;
use crate::intent::IntentEngine;
use crate::kb::KbManager;
use crate::llm::{ChatModel, Embedder, HttpChatModel, HttpEmbedder, HttpReranker, Reranker};
use crate::orchestrator::Orchestrator;
use crate::qa::QaStore;
use crate::retrieval::RetrievalEngine;
use crate::telemetry::{Metrics, TcpProber};

/// The three external-service seams, injectable for tests.
pub struct Adapters {
    /// The LLM client.
    pub llm: Arc<dyn ChatModel>,
    /// The embedding client.
    pub embedder: Arc<dyn Embedder>,
    /// The reranker client, when configured.
    pub reranker: Option<Arc<dyn Reranker>>,
}

impl Adapters {
    /// HTTP adapters pointing at the configured services.
    pub fn from_config(config: &Config) -> Self {
        Self {
            llm: Arc::new(HttpChatModel::new(
                config.llm_api_base.clone(),
                config.llm_api_key.clone(),
                config.llm_model.clone(),
                config.llm_timeout,
            )),
            embedder: Arc::new(HttpEmbedder::new(
                config.embedding_api_base.clone(),
                config.embedding_api_key.clone(),
                config.embedding_model.clone(),
                config.embedding_dim,
                config.embedding_timeout,
            )),
            reranker: config.rerank_enabled.then(|| {
                Arc::new(HttpReranker::new(
                    config.embedding_api_base.clone(),
                    config.embedding_api_key.clone(),
                    config.rerank_model.clone(),
                    config.rerank_timeout,
                )) as Arc<dyn Reranker>
            }),
        }
    }
}

/// Wires every component together.
pub fn build_state(config: Config, adapters: Adapters) -> anyhow::Result<AppState> {
    let config = Arc::new(config);

    let cache = Arc::new(CacheCoordinator::new(
        config.enable_cache,
        config.cache_ttl,
        &config.per_cache_size_limits,
    ));

    let kb_manager = Arc::new(KbManager::open(&config.working_dir, config.embedding_dim)?);

    let qa = Arc::new(QaStore::open(
        &config.qa_storage_dir,
        config.embedding_dim,
        crate::constants::DEFAULT_QA_MIN_SIMILARITY,
        adapters.embedder.clone(),
    )?);

    let ingest = Arc::new(IngestPipeline::new(
        adapters.embedder.clone(),
        &config.upload_dir,
        config.allowed_file_types.clone(),
        config.max_file_size,
    ));

    let intent = Arc::new(IntentEngine::new(
        config.intent_sensitive_vocabulary_path.as_deref(),
        Some(adapters.llm.clone()),
        config.intent_enable_llm,
    )?);

    let retrieval = Arc::new(RetrievalEngine::new(
        kb_manager.clone(),
        adapters.embedder.clone(),
        adapters.llm.clone(),
        adapters.reranker.clone(),
        cache.clone(),
        config.rerank_enabled,
    ));

    let orchestrator = Arc::new(Orchestrator::new(intent, retrieval));

    let identity = Arc::new(IdentityResolver::new(IdentityConfig::from_config(&config)));
    let rate_gate = Arc::new(RateGate::new(
        config.rate_limit_window,
        config.min_interval_per_user,
        config.rate_limit_tiers.clone(),
        config.rate_limit_requests,
    ));

    let prober = Arc::new(TcpProber::for_api_base(&config.embedding_api_base));
    let log_path = log_file_path(&config);

    Ok(AppState {
        config,
        identity,
        rate_gate,
        cache,
        qa,
        kb_manager,
        ingest,
        orchestrator,
        metrics: Arc::new(Metrics::new()),
        prober,
        log_path,
    })
}

/// Where the structured log file lives.
pub fn log_file_path(config: &Config) -> PathBuf {
    config.log_dir.join("ragserve.log")
}

/// Spawns the periodic sweeps that keep bounded tables bounded.
pub fn spawn_maintenance(state: &AppState) {
    let rate_gate = state.rate_gate.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        interval.tick().await;
        loop {
            interval.tick().await;
            let swept = rate_gate.sweep();
            if swept > 0 {
                tracing::debug!(swept, "rate buckets swept");
            }
        }
    });
}
