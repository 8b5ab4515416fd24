//! Intent subsystem routes, including the dynamic configuration surface.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::gateway::envelope::ApiResponse;
use crate::gateway::error::ApiError;
use crate::gateway::state::AppState;
use crate::intent::CustomIntent;
use crate::intent::dfa::SensitiveWord;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    /// The query to analyze.
    pub query: String,
    /// Optional conversation context.
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SafetyCheckRequest {
    /// The content to check.
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SafetyRuleRequest {
    /// Vocabulary entries to add or replace.
    pub rules: Vec<SafetyRuleEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SafetyRuleEntry {
    /// The phrase to match.
    pub word: String,
    /// Category label.
    pub category: String,
    /// Whether a match escalates to the illegal level.
    #[serde(default = "default_illegal")]
    pub illegal: bool,
}

fn default_illegal() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct TemplateRequest {
    /// Intent type name.
    pub intent_type: String,
    /// Template body; must contain `{query}`.
    pub template: String,
}

#[derive(Debug, Deserialize)]
pub struct EnhancementToggleRequest {
    /// Whether enhancement runs.
    pub enabled: bool,
}

/// `POST /intent/analyze`
#[instrument(skip_all)]
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::BadInput("query must not be empty".into()));
    }
    let analysis = state
        .orchestrator
        .intent()
        .analyze(&request.query, request.context.as_deref())
        .await;
    Ok(Json(ApiResponse::ok(analysis)))
}

/// `POST /intent/safety-check`
#[instrument(skip_all)]
pub async fn safety_check(
    State(state): State<AppState>,
    Json(request): Json<SafetyCheckRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    if request.content.trim().is_empty() {
        return Err(ApiError::BadInput("content must not be empty".into()));
    }
    let result = state.orchestrator.intent().safety_check(&request.content);
    Ok(Json(ApiResponse::ok(result)))
}

/// `GET|POST /intent/status`
pub async fn status(State(state): State<AppState>) -> Json<ApiResponse> {
    Json(ApiResponse::ok(state.orchestrator.intent().status()))
}

/// `POST /intent-config/intent-types`
#[instrument(skip_all, fields(name = %custom.name))]
pub async fn register_intent_type(
    State(state): State<AppState>,
    Json(custom): Json<CustomIntent>,
) -> Result<Json<ApiResponse>, ApiError> {
    state.orchestrator.intent().register_intent(custom)?;
    Ok(Json(ApiResponse::ok_with_message(
        "intent type registered; effective on the next call",
        json!({}),
    )))
}

/// `POST /intent-config/safety-rules`
#[instrument(skip_all, fields(count = request.rules.len()))]
pub async fn register_safety_rules(
    State(state): State<AppState>,
    Json(request): Json<SafetyRuleRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let rules: Vec<SensitiveWord> = request
        .rules
        .into_iter()
        .map(|r| SensitiveWord {
            word: r.word,
            category: r.category,
            illegal: r.illegal,
        })
        .collect();
    state.orchestrator.intent().register_safety_rules(rules)?;
    Ok(Json(ApiResponse::ok_with_message(
        "safety rules registered; effective on the next call",
        json!({}),
    )))
}

/// `POST /intent-config/templates`
#[instrument(skip_all, fields(intent = %request.intent_type))]
pub async fn set_template(
    State(state): State<AppState>,
    Json(request): Json<TemplateRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    state
        .orchestrator
        .intent()
        .set_template(&request.intent_type, request.template)?;
    Ok(Json(ApiResponse::ok_with_message(
        "template updated; effective on the next call",
        json!({}),
    )))
}

/// `POST /intent-config/enhancement`
#[instrument(skip_all, fields(enabled = request.enabled))]
pub async fn toggle_enhancement(
    State(state): State<AppState>,
    Json(request): Json<EnhancementToggleRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    state.orchestrator.intent().set_enhancement(request.enabled)?;
    Ok(Json(ApiResponse::ok(json!({ "enabled": request.enabled }))))
}

/// `GET /intent-config/status`
pub async fn config_status(State(state): State<AppState>) -> Json<ApiResponse> {
    status(State(state)).await
}
