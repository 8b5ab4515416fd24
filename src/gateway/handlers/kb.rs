//! Knowledge-base lifecycle routes.

use std::path::PathBuf;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::gateway::envelope::ApiResponse;
use crate::gateway::error::ApiError;
use crate::gateway::state::AppState;
use crate::kb::{KbConfig, KbConfigPatch};

#[derive(Debug, Deserialize)]
pub struct CreateKbRequest {
    /// Unique name.
    pub name: String,
    /// Human description.
    #[serde(default)]
    pub description: String,
    /// Answer language hint.
    #[serde(default = "default_language")]
    pub language: String,
    /// Tuning knobs; defaults apply when absent.
    #[serde(default)]
    pub config: Option<KbConfig>,
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SwitchKbRequest {
    /// The KB to make current.
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteKbQuery {
    /// Required to delete the current KB.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct RestoreKbRequest {
    /// Path of a backup previously produced by the backup route.
    pub path: String,
}

/// `GET /knowledge-bases`
pub async fn list(State(state): State<AppState>) -> Json<ApiResponse> {
    Json(ApiResponse::ok(json!({
        "knowledge_bases": state.kb_manager.list(),
        "current": state.kb_manager.current().ok().map(|i| i.name),
    })))
}

/// `POST /knowledge-bases`
#[instrument(skip_all, fields(kb = %request.name))]
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateKbRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let info = state
        .kb_manager
        .create(
            &request.name,
            request.description,
            request.language,
            request.config.unwrap_or_default(),
        )
        .await?;
    Ok(Json(ApiResponse::ok_with_message(
        format!("knowledge base '{}' created", info.name),
        info,
    )))
}

/// `DELETE /knowledge-bases/{name}?force`
#[instrument(skip_all, fields(kb = %name))]
pub async fn delete(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<DeleteKbQuery>,
) -> Result<Json<ApiResponse>, ApiError> {
    let force = query.force;
    state.kb_manager.delete(&name, force).await?;
    Ok(Json(ApiResponse::ok_with_message(
        format!("knowledge base '{name}' deleted"),
        json!({ "name": name }),
    )))
}

/// `POST /knowledge-bases/switch`
#[instrument(skip_all, fields(kb = %request.name))]
pub async fn switch(
    State(state): State<AppState>,
    Json(request): Json<SwitchKbRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let info = state.kb_manager.switch_current(&request.name)?;
    Ok(Json(ApiResponse::ok_with_message(
        format!("current knowledge base is now '{}'", info.name),
        info,
    )))
}

/// `GET /knowledge-bases/current`
pub async fn current(State(state): State<AppState>) -> Result<Json<ApiResponse>, ApiError> {
    let info = state.kb_manager.current()?;
    Ok(Json(ApiResponse::ok(info)))
}

/// `PUT /knowledge-bases/{name}/config`
#[instrument(skip_all, fields(kb = %name))]
pub async fn update_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(patch): Json<KbConfigPatch>,
) -> Result<Json<ApiResponse>, ApiError> {
    let info = state.kb_manager.update_config(&name, patch)?;
    Ok(Json(ApiResponse::ok(info)))
}

/// `POST /knowledge-bases/{name}/backup`
#[instrument(skip_all, fields(kb = %name))]
pub async fn backup(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    let path = state.kb_manager.backup(&name).await?;
    Ok(Json(ApiResponse::ok(json!({ "backup_path": path }))))
}

/// `POST /knowledge-bases/{name}/restore`
#[instrument(skip_all, fields(kb = %name))]
pub async fn restore(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<RestoreKbRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let info = state
        .kb_manager
        .restore(&name, &PathBuf::from(&request.path))
        .await?;
    Ok(Json(ApiResponse::ok_with_message(
        format!("knowledge base '{name}' restored"),
        info,
    )))
}
