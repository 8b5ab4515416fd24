//! Ingest routes: text, texts, file, files, directory.

use std::path::PathBuf;

use axum::Json;
use axum::extract::{Multipart, State};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::gateway::envelope::ApiResponse;
use crate::gateway::error::ApiError;
use crate::gateway::state::AppState;
use crate::ingest::InsertOutcome;

#[derive(Debug, Deserialize)]
pub struct InsertTextRequest {
    /// The document text.
    pub text: String,
    /// Target KB; the current one when absent.
    #[serde(default)]
    pub knowledge_base: Option<String>,
    /// Externally supplied document id.
    #[serde(default)]
    pub doc_id: Option<String>,
    /// Correlation id.
    #[serde(default)]
    pub track_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InsertTextsRequest {
    /// The documents.
    pub texts: Vec<String>,
    /// Target KB.
    #[serde(default)]
    pub knowledge_base: Option<String>,
    /// Correlation id shared by the batch.
    #[serde(default)]
    pub track_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InsertDirectoryRequest {
    /// Server-local directory to walk.
    pub directory: String,
    /// Target KB.
    #[serde(default)]
    pub knowledge_base: Option<String>,
    /// Correlation id shared by the walk.
    #[serde(default)]
    pub track_id: Option<String>,
}

/// `POST /insert/text`
#[instrument(skip_all, fields(kb = request.knowledge_base.as_deref().unwrap_or("current")))]
pub async fn insert_text(
    State(state): State<AppState>,
    Json(request): Json<InsertTextRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let kb = state.kb_manager.get(request.knowledge_base.as_deref())?;
    let outcome = state
        .ingest
        .insert_text(&kb, &request.text, request.doc_id, request.track_id, None)
        .await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// `POST /insert/texts`
#[instrument(skip_all, fields(count = request.texts.len()))]
pub async fn insert_texts(
    State(state): State<AppState>,
    Json(request): Json<InsertTextsRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    if request.texts.is_empty() {
        return Err(ApiError::BadInput("texts must not be empty".into()));
    }
    let kb = state.kb_manager.get(request.knowledge_base.as_deref())?;
    let outcomes = state
        .ingest
        .insert_texts(&kb, &request.texts, request.track_id)
        .await;
    Ok(Json(ApiResponse::ok(json!({
        "results": collect_outcomes(outcomes),
    }))))
}

/// `POST /insert/file` — multipart, single `file` field.
#[instrument(skip_all)]
pub async fn insert_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ApiResponse>, ApiError> {
    let upload = read_upload(multipart, false).await?;
    let kb = state.kb_manager.get(upload.knowledge_base.as_deref())?;

    let (filename, bytes) = upload
        .files
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::BadInput("multipart field 'file' is required".into()))?;
    let outcome = state
        .ingest
        .insert_file(&kb, &filename, &bytes, upload.track_id)
        .await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// `POST /insert/files` — multipart, repeated `files` field.
#[instrument(skip_all)]
pub async fn insert_files(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ApiResponse>, ApiError> {
    let upload = read_upload(multipart, true).await?;
    if upload.files.is_empty() {
        return Err(ApiError::BadInput("multipart field 'files' is required".into()));
    }
    let kb = state.kb_manager.get(upload.knowledge_base.as_deref())?;

    let mut outcomes = Vec::with_capacity(upload.files.len());
    for (filename, bytes) in upload.files {
        outcomes.push(
            state
                .ingest
                .insert_file(&kb, &filename, &bytes, upload.track_id.clone())
                .await,
        );
    }
    Ok(Json(ApiResponse::ok(json!({
        "results": collect_outcomes(outcomes),
    }))))
}

/// `POST /insert/directory` — server-local path walk.
#[instrument(skip_all, fields(directory = %request.directory))]
pub async fn insert_directory(
    State(state): State<AppState>,
    Json(request): Json<InsertDirectoryRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let kb = state.kb_manager.get(request.knowledge_base.as_deref())?;
    let outcomes = state
        .ingest
        .insert_directory(&kb, &PathBuf::from(&request.directory), request.track_id)
        .await?;
    Ok(Json(ApiResponse::ok(json!({
        "results": collect_outcomes(outcomes),
    }))))
}

struct Upload {
    files: Vec<(String, Vec<u8>)>,
    knowledge_base: Option<String>,
    track_id: Option<String>,
}

/// Drains a multipart body: `file`/`files` plus optional text fields.
async fn read_upload(mut multipart: Multipart, many: bool) -> Result<Upload, ApiError> {
    let mut upload = Upload {
        files: Vec::new(),
        knowledge_base: None,
        track_id: None,
    };

    let file_field = if many { "files" } else { "file" };
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadInput(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == file_field {
            let filename = field
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| ApiError::BadInput("uploaded file needs a filename".into()))?;
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadInput(format!("failed reading upload: {e}")))?;
            upload.files.push((filename, bytes.to_vec()));
            if !many && upload.files.len() > 1 {
                return Err(ApiError::BadInput("exactly one 'file' field expected".into()));
            }
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::BadInput(format!("invalid field '{name}': {e}")))?;
            match name.as_str() {
                "knowledge_base" => upload.knowledge_base = Some(value),
                "track_id" => upload.track_id = Some(value),
                // `language` and unknown fields are accepted and ignored;
                // language is a KB-level setting.
                _ => {}
            }
        }
    }

    Ok(upload)
}

fn collect_outcomes(
    outcomes: Vec<Result<InsertOutcome, crate::ingest::IngestError>>,
) -> Vec<serde_json::Value> {
    outcomes
        .into_iter()
        .map(|result| match result {
            Ok(outcome) => json!({ "success": true, "outcome": outcome }),
            Err(e) => {
                let api: ApiError = e.into();
                json!({
                    "success": false,
                    "error_code": api.code(),
                    "message": api.to_string(),
                })
            }
        })
        .collect()
}
