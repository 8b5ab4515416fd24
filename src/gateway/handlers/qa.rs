//! Fixed-QA routes: CRUD, similarity queries, import/export, statistics.

use axum::Json;
use axum::extract::{Multipart, Path, Query, State};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::gateway::envelope::ApiResponse;
use crate::gateway::error::ApiError;
use crate::gateway::state::AppState;
use crate::qa::{ImportFormat, NewQaPair, QaPairUpdate};

#[derive(Debug, Deserialize)]
pub struct QaQueryRequest {
    /// The question to match.
    pub question: String,
    /// Result fanout.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Similarity floor; the store default applies when absent.
    #[serde(default)]
    pub min_similarity: Option<f32>,
    /// Restrict matching to one category.
    #[serde(default)]
    pub category: Option<String>,
}

fn default_top_k() -> usize {
    1
}

#[derive(Debug, Deserialize)]
pub struct QaBatchQueryRequest {
    /// The questions to match.
    pub questions: Vec<QaQueryRequest>,
}

#[derive(Debug, Deserialize)]
pub struct QaBatchAddRequest {
    /// The pairs to add.
    pub pairs: Vec<NewQaPair>,
}

#[derive(Debug, Deserialize)]
pub struct ListPairsQuery {
    /// Category filter.
    #[serde(default)]
    pub category: Option<String>,
    /// Confidence floor.
    #[serde(default)]
    pub min_confidence: Option<f32>,
    /// Page offset.
    #[serde(default)]
    pub offset: usize,
    /// Page size.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// `json` (default) or `csv`.
    #[serde(default)]
    pub format: Option<String>,
}

/// `POST /qa/pairs`
#[instrument(skip_all, fields(category = %pair.category))]
pub async fn add_pair(
    State(state): State<AppState>,
    Json(pair): Json<NewQaPair>,
) -> Result<Json<ApiResponse>, ApiError> {
    let id = state.qa.add(pair).await?;
    Ok(Json(ApiResponse::ok(json!({ "id": id }))))
}

/// `POST /qa/pairs/batch`
#[instrument(skip_all, fields(count = request.pairs.len()))]
pub async fn add_pairs_batch(
    State(state): State<AppState>,
    Json(request): Json<QaBatchAddRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    if request.pairs.is_empty() {
        return Err(ApiError::BadInput("pairs must not be empty".into()));
    }
    let outcomes = state.qa.add_batch(request.pairs).await?;
    let succeeded = outcomes.iter().filter(|o| o.success).count();
    Ok(Json(ApiResponse::ok(json!({
        "succeeded": succeeded,
        "failed": outcomes.len() - succeeded,
        "results": outcomes,
    }))))
}

/// `GET /qa/pairs`
pub async fn list_pairs(
    State(state): State<AppState>,
    Query(query): Query<ListPairsQuery>,
) -> Result<Json<ApiResponse>, ApiError> {
    let (total, pairs) = state
        .qa
        .list_pairs(
            query.category.as_deref(),
            query.min_confidence,
            query.offset,
            query.limit.min(500),
        )
        .await?;
    Ok(Json(ApiResponse::ok(json!({
        "total": total,
        "pairs": pairs,
    }))))
}

/// `GET /qa/pairs/{id}`
pub async fn get_pair(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    let pair = state.qa.get_pair(&id).await?;
    Ok(Json(ApiResponse::ok(pair)))
}

/// `PUT /qa/pairs/{id}`
#[instrument(skip_all, fields(id = %id))]
pub async fn update_pair(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<QaPairUpdate>,
) -> Result<Json<ApiResponse>, ApiError> {
    let pair = state.qa.update_pair(&id, update).await?;
    Ok(Json(ApiResponse::ok(pair)))
}

/// `DELETE /qa/pairs/{id}`
#[instrument(skip_all, fields(id = %id))]
pub async fn delete_pair(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    let pair = state.qa.delete_pair(&id).await?;
    Ok(Json(ApiResponse::ok_with_message(
        format!("pair '{}' deleted", pair.id),
        json!({ "id": pair.id }),
    )))
}

/// `POST /qa/query`
#[instrument(skip_all)]
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QaQueryRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let result = state
        .qa
        .query(
            &request.question,
            request.top_k,
            request.min_similarity,
            request.category.as_deref(),
        )
        .await?;
    Ok(Json(ApiResponse::ok(result)))
}

/// `POST /qa/query/batch`
#[instrument(skip_all, fields(count = request.questions.len()))]
pub async fn query_batch(
    State(state): State<AppState>,
    Json(request): Json<QaBatchQueryRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    if request.questions.is_empty() {
        return Err(ApiError::BadInput("questions must not be empty".into()));
    }

    let mut results = Vec::with_capacity(request.questions.len());
    for entry in request.questions {
        let result = state
            .qa
            .query(
                &entry.question,
                entry.top_k,
                entry.min_similarity,
                entry.category.as_deref(),
            )
            .await;
        results.push(match result {
            Ok(result) => json!({ "success": true, "result": result }),
            Err(e) => {
                let api: ApiError = e.into();
                json!({
                    "success": false,
                    "error_code": api.code(),
                    "message": api.to_string(),
                })
            }
        });
    }
    Ok(Json(ApiResponse::ok(json!({ "results": results }))))
}

/// `POST /qa/import` — multipart with a `file` field plus options.
#[instrument(skip_all)]
pub async fn import(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse>, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut overwrite_existing = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadInput(format!("invalid multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadInput("import file needs a filename".into()))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadInput(format!("failed reading upload: {e}")))?;
                file = Some((filename, bytes.to_vec()));
            }
            "overwrite_existing" => {
                let value = field.text().await.unwrap_or_default();
                overwrite_existing = matches!(value.as_str(), "true" | "1" | "yes");
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| ApiError::BadInput("multipart field 'file' is required".into()))?;
    let format = ImportFormat::from_filename(&filename).ok_or_else(|| {
        ApiError::BadInput(format!("unsupported import file type: '{filename}'"))
    })?;

    let report = state.qa.import(&bytes, format, overwrite_existing).await?;
    Ok(Json(ApiResponse::ok(report)))
}

/// `GET /qa/export`
pub async fn export(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<axum::response::Response, ApiError> {
    use axum::response::IntoResponse;

    let pairs = state.qa.export().await?;
    match query.format.as_deref() {
        Some("csv") => {
            let csv = crate::qa::import::export_csv(&pairs)?;
            Ok((
                [(axum::http::header::CONTENT_TYPE, "text/csv")],
                csv,
            )
                .into_response())
        }
        _ => Ok(Json(ApiResponse::ok(json!({ "pairs": pairs }))).into_response()),
    }
}

/// `GET /qa/statistics`
pub async fn statistics(State(state): State<AppState>) -> Result<Json<ApiResponse>, ApiError> {
    let stats = state.qa.statistics().await?;
    Ok(Json(ApiResponse::ok(stats)))
}

/// `GET /qa/categories`
pub async fn categories(State(state): State<AppState>) -> Result<Json<ApiResponse>, ApiError> {
    let stats = state.qa.statistics().await?;
    Ok(Json(ApiResponse::ok(json!({
        "categories": stats.categories,
    }))))
}

/// `DELETE /qa/categories/{category}`
#[instrument(skip_all, fields(category = %category))]
pub async fn delete_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<ApiResponse>, ApiError> {
    let result = state.qa.delete_category(&category).await?;
    Ok(Json(ApiResponse::ok(result)))
}
