//! Cache coordinator routes.

use axum::Json;
use axum::extract::{Path, State};
use tracing::instrument;

use crate::gateway::envelope::ApiResponse;
use crate::gateway::error::ApiError;
use crate::gateway::state::AppState;

/// `GET /cache/stats`
pub async fn stats(State(state): State<AppState>) -> Json<ApiResponse> {
    Json(ApiResponse::ok(state.cache.stats_all()))
}

/// `DELETE /cache/clear`
#[instrument(skip_all)]
pub async fn clear_all(State(state): State<AppState>) -> Json<ApiResponse> {
    let result = state.cache.clear_all();
    Json(ApiResponse::ok_with_message(
        format!(
            "cleared {} entries, freed {} bytes",
            result.entries_removed, result.bytes_freed
        ),
        result,
    ))
}

/// `DELETE /cache/clear/{type}`
#[instrument(skip_all, fields(cache = %cache_type))]
pub async fn clear_type(
    State(state): State<AppState>,
    Path(cache_type): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    let result = state.cache.clear_type(&cache_type)?;
    Ok(Json(ApiResponse::ok(result)))
}
