//! Knowledge-graph routes.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::gateway::envelope::ApiResponse;
use crate::gateway::error::ApiError;
use crate::gateway::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubgraphRequest {
    /// The entity label to center on.
    pub label: String,
    /// Hop depth, clamped to [1, 5].
    #[serde(default = "default_depth")]
    pub max_depth: usize,
    /// Knowledge-base override.
    #[serde(default)]
    pub knowledge_base: Option<String>,
}

fn default_depth() -> usize {
    1
}

#[derive(Debug, Deserialize)]
pub struct GraphKbQuery {
    /// Knowledge-base override.
    #[serde(default)]
    pub knowledge_base: Option<String>,
}

/// `POST /knowledge-graph` — subgraph around a label.
#[instrument(skip_all, fields(label = %request.label))]
pub async fn subgraph(
    State(state): State<AppState>,
    Json(request): Json<SubgraphRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    if request.label.trim().is_empty() {
        return Err(ApiError::BadInput("label must not be empty".into()));
    }
    let subgraph = state.orchestrator.retrieval().subgraph(
        request.knowledge_base.as_deref(),
        &request.label,
        request.max_depth,
    )?;

    match subgraph {
        Some(subgraph) => Ok(Json(ApiResponse::ok(subgraph))),
        None => Err(ApiError::NotFound(format!(
            "entity '{}' not found in the graph",
            request.label
        ))),
    }
}

/// `GET /knowledge-graph/stats`
pub async fn stats(
    State(state): State<AppState>,
    Query(query): Query<GraphKbQuery>,
) -> Result<Json<ApiResponse>, ApiError> {
    let kb = state.kb_manager.get(query.knowledge_base.as_deref())?;
    let stats = kb.with_graph(|graph| graph.stats())?;
    Ok(Json(ApiResponse::ok(stats)))
}

/// `DELETE /knowledge-graph/clear`
#[instrument(skip_all)]
pub async fn clear(
    State(state): State<AppState>,
    Query(query): Query<GraphKbQuery>,
) -> Result<Json<ApiResponse>, ApiError> {
    let kb = state.kb_manager.get(query.knowledge_base.as_deref())?;
    let removed = kb.with_graph_mut(|graph| graph.clear())??;
    Ok(Json(ApiResponse::ok(json!({
        "removed_nodes": removed.nodes,
        "removed_edges": removed.edges,
    }))))
}
