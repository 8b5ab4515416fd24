//! Query routes: full retrieval, analysis, the gated pipeline, batches.

use axum::extract::{Extension, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::gateway::envelope::ApiResponse;
use crate::gateway::error::ApiError;
use crate::gateway::middleware::TraceId;
use crate::gateway::state::AppState;
use crate::gateway::streaming::sse_response;
use crate::identity::UserIdentity;
use crate::orchestrator::{ExecOutcome, QueryRequest};
use crate::retrieval::RetrievalEngine;

fn outcome_response(outcome: ExecOutcome, trace_id: String) -> Response {
    match outcome {
        ExecOutcome::Answer {
            answer,
            analysis,
            response_time,
        } => {
            let data = json!({
                "answer": answer.answer,
                "mode": answer.mode,
                "knowledge_base": answer.kb,
                "language": answer.language,
                "sources": answer.sources,
                "cached": answer.cached,
                "analysis": analysis,
                "response_time": response_time,
            });
            Json(ApiResponse::ok(data)).into_response()
        }
        ExecOutcome::Rejected { analysis } => {
            let data = json!({
                "should_reject": true,
                "intent_type": analysis.intent_type,
                "safety_level": analysis.safety_level,
                "risk_factors": analysis.risk_factors,
                "safety_tips": analysis.safety_tips,
                "safe_alternatives": analysis.safe_alternatives,
            });
            Json(ApiResponse::rejected(
                "query rejected by safety check",
                "rejected-by-safety",
                data,
            ))
            .into_response()
        }
        ExecOutcome::Stream {
            meta,
            stream,
            started,
            ..
        } => sse_response(meta, stream, started, trace_id).into_response(),
    }
}

/// `POST /query` — the full retrieval pipeline, streaming or not.
#[instrument(skip_all, fields(user = %identity.user_id))]
pub async fn query(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    Extension(trace): Extension<TraceId>,
    Json(request): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    let outcome = state.orchestrator.execute(request, &identity).await?;
    Ok(outcome_response(outcome, trace.0))
}

/// `POST /query/analyze` — intent + safety only; never touches retrieval.
#[instrument(skip_all)]
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let analysis = state.orchestrator.analyze(&request.query).await?;
    Ok(Json(ApiResponse::ok(analysis)))
}

/// `POST /query/safe` — analyze, gate, then retrieve.
#[instrument(skip_all, fields(user = %identity.user_id))]
pub async fn safe_query(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    Extension(trace): Extension<TraceId>,
    Json(request): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    let outcome = state.orchestrator.execute_safe(request, &identity).await?;
    Ok(outcome_response(outcome, trace.0))
}

/// Batch query payload.
#[derive(Debug, Deserialize)]
pub struct BatchQueryRequest {
    /// The queries to run.
    pub queries: Vec<QueryRequest>,
}

/// `POST /query/batch` — independent outcomes per query, never streamed.
#[instrument(skip_all, fields(user = %identity.user_id, count = request.queries.len()))]
pub async fn batch_query(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    Json(request): Json<BatchQueryRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    if request.queries.is_empty() {
        return Err(ApiError::BadInput("queries must not be empty".into()));
    }
    if request.queries.len() > 32 {
        return Err(ApiError::BadInput("at most 32 queries per batch".into()));
    }

    let mut results = Vec::with_capacity(request.queries.len());
    for mut query in request.queries {
        query.stream = false;
        let result = match state.orchestrator.execute(query, &identity).await {
            Ok(ExecOutcome::Answer {
                answer,
                response_time,
                ..
            }) => json!({
                "success": true,
                "answer": answer.answer,
                "mode": answer.mode,
                "response_time": response_time,
            }),
            Ok(ExecOutcome::Rejected { analysis }) => json!({
                "success": false,
                "error_code": "rejected-by-safety",
                "safety_level": analysis.safety_level,
            }),
            Ok(ExecOutcome::Stream { .. }) => {
                unreachable!("stream was forced off for batch entries")
            }
            Err(e) => {
                let api: ApiError = e.into();
                json!({
                    "success": false,
                    "error_code": api.code(),
                    "message": api.to_string(),
                })
            }
        };
        results.push(result);
    }

    Ok(Json(ApiResponse::ok(json!({ "results": results }))))
}

/// `GET /query/modes` — the static mode listing.
pub async fn modes() -> Json<ApiResponse> {
    Json(ApiResponse::ok(json!({ "modes": RetrievalEngine::modes() })))
}
