//! The HTTP surface.
//!
//! Routes mount under `/api/v1` behind the non-optional middleware stack,
//! outermost first: CORS → identity extraction → rate gate → request
//! logging → routing. Panics in handlers are contained and answered as
//! `internal` with the request's trace id preserved in the logs.

pub mod envelope;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;
pub mod streaming;

pub use envelope::ApiResponse;
pub use error::ApiError;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the full router around an [`AppState`].
pub fn create_router(state: AppState) -> Router {
    let max_body = state.config.max_file_size as usize;

    let api = Router::new()
        // system
        .route("/health", get(handlers::system::health))
        .route("/system/status", get(handlers::system::status))
        .route("/metrics", get(handlers::system::metrics))
        .route("/logs", get(handlers::system::logs))
        // query
        .route("/query", post(handlers::query::query))
        .route("/query/analyze", post(handlers::query::analyze))
        .route("/query/safe", post(handlers::query::safe_query))
        .route("/query/batch", post(handlers::query::batch_query))
        .route("/query/modes", get(handlers::query::modes))
        // insert
        .route("/insert/text", post(handlers::insert::insert_text))
        .route("/insert/texts", post(handlers::insert::insert_texts))
        .route("/insert/file", post(handlers::insert::insert_file))
        .route("/insert/files", post(handlers::insert::insert_files))
        .route("/insert/directory", post(handlers::insert::insert_directory))
        // knowledge bases
        .route(
            "/knowledge-bases",
            get(handlers::kb::list).post(handlers::kb::create),
        )
        .route("/knowledge-bases/switch", post(handlers::kb::switch))
        .route("/knowledge-bases/current", get(handlers::kb::current))
        .route("/knowledge-bases/{name}", delete(handlers::kb::delete))
        .route(
            "/knowledge-bases/{name}/config",
            put(handlers::kb::update_config),
        )
        .route("/knowledge-bases/{name}/backup", post(handlers::kb::backup))
        .route(
            "/knowledge-bases/{name}/restore",
            post(handlers::kb::restore),
        )
        // knowledge graph
        .route("/knowledge-graph", post(handlers::graph::subgraph))
        .route("/knowledge-graph/stats", get(handlers::graph::stats))
        .route("/knowledge-graph/clear", delete(handlers::graph::clear))
        // intent
        .route("/intent/analyze", post(handlers::intent::analyze))
        .route("/intent/safety-check", post(handlers::intent::safety_check))
        .route(
            "/intent/status",
            get(handlers::intent::status).post(handlers::intent::status),
        )
        .route(
            "/intent-config/intent-types",
            post(handlers::intent::register_intent_type),
        )
        .route(
            "/intent-config/safety-rules",
            post(handlers::intent::register_safety_rules),
        )
        .route(
            "/intent-config/templates",
            post(handlers::intent::set_template),
        )
        .route(
            "/intent-config/enhancement",
            post(handlers::intent::toggle_enhancement),
        )
        .route(
            "/intent-config/status",
            get(handlers::intent::config_status),
        )
        // fixed QA
        .route(
            "/qa/pairs",
            get(handlers::qa::list_pairs).post(handlers::qa::add_pair),
        )
        .route("/qa/pairs/batch", post(handlers::qa::add_pairs_batch))
        .route(
            "/qa/pairs/{id}",
            get(handlers::qa::get_pair)
                .put(handlers::qa::update_pair)
                .delete(handlers::qa::delete_pair),
        )
        .route("/qa/query", post(handlers::qa::query))
        .route("/qa/query/batch", post(handlers::qa::query_batch))
        .route("/qa/import", post(handlers::qa::import))
        .route("/qa/export", get(handlers::qa::export))
        .route("/qa/statistics", get(handlers::qa::statistics))
        .route("/qa/categories", get(handlers::qa::categories))
        .route(
            "/qa/categories/{category}",
            delete(handlers::qa::delete_category),
        )
        // cache
        .route("/cache/stats", get(handlers::cache::stats))
        .route("/cache/clear", delete(handlers::cache::clear_all))
        .route("/cache/clear/{type}", delete(handlers::cache::clear_type));

    // Layer order: the last layer added runs first, so this reads
    // innermost-to-outermost against the documented stack.
    Router::new()
        .nest("/api/v1", api)
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::logging_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_gate_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::identity_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(max_body))
        .with_state(state)
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error("route not found", "not-found", None)),
    )
}

fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> axum::response::Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("panic");
    tracing::error!(panic = %detail, "handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::error(
            "internal server error",
            "internal",
            None,
        )),
    )
        .into_response()
}
