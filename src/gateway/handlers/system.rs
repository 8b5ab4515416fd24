//! Health, status, metrics, and log routes.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::json;

use crate::gateway::envelope::ApiResponse;
use crate::gateway::error::ApiError;
use crate::gateway::state::AppState;
use crate::telemetry::{DependencyHealth, HealthReport, health_budget};

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// How many trailing lines to return.
    #[serde(default = "default_lines")]
    pub lines: usize,
}

fn default_lines() -> usize {
    100
}

/// `GET /health` — liveness plus dependency status inside a 3 s budget.
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse> {
    let report = tokio::time::timeout(health_budget(), collect_health(&state))
        .await
        .unwrap_or_else(|_| {
            HealthReport::from_dependencies(vec![DependencyHealth {
                name: "health-check",
                healthy: false,
                detail: Some("health check exceeded its budget".to_string()),
            }])
        });

    Json(ApiResponse::ok(report))
}

async fn collect_health(state: &AppState) -> HealthReport {
    let mut dependencies = Vec::with_capacity(3);

    dependencies.push(DependencyHealth {
        name: "kb_manager",
        healthy: state.kb_manager.is_ready(),
        detail: (!state.kb_manager.is_ready()).then(|| "no knowledge bases loaded".to_string()),
    });

    dependencies.push(state.prober.probe().await);

    // The cache coordinator is responsive iff a stats sweep returns.
    let cache_healthy = !state.cache.stats_all().caches.is_empty();
    dependencies.push(DependencyHealth {
        name: "cache_coordinator",
        healthy: cache_healthy,
        detail: (!cache_healthy).then(|| "coordinator returned no caches".to_string()),
    });

    HealthReport::from_dependencies(dependencies)
}

/// `GET /system/status` — verbose snapshot.
pub async fn status(State(state): State<AppState>) -> Result<Json<ApiResponse>, ApiError> {
    let qa_stats = state.qa.statistics().await?;
    let current = state.kb_manager.current().ok();

    Ok(Json(ApiResponse::ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "knowledge_bases": state.kb_manager.list().len(),
        "current_knowledge_base": current,
        "qa": qa_stats,
        "cache": state.cache.stats_all(),
        "metrics": state.metrics.snapshot(),
        "intent": state.orchestrator.intent().status(),
    }))))
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> Json<ApiResponse> {
    Json(ApiResponse::ok(state.metrics.snapshot()))
}

/// `GET /logs?lines=N`
pub async fn logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<ApiResponse>, ApiError> {
    let lines = query.lines.min(5_000);
    let entries = match crate::telemetry::tail_log(&state.log_path, lines) {
        Ok(entries) => entries,
        // A missing log file is an empty log, not a failure.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(ApiError::StorageFailure(e.to_string())),
    };
    Ok(Json(ApiResponse::ok(json!({
        "lines": entries.len(),
        "entries": entries,
    }))))
}
