//! The middleware stack: identity extraction, rate gate, request logging.
//!
//! Applied outermost-first as CORS → identity → rate gate → logging →
//! routing. None of it is optional.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Instant;

use axum::Json;
use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use super::envelope::ApiResponse;
use super::state::AppState;
use crate::identity::{Decision, UserIdentity};

/// Request-scoped trace id, added by the logging middleware.
#[derive(Debug, Clone)]
pub struct TraceId(pub String);

/// Resolves the caller identity and stashes it as an extension.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let identity = state.identity.resolve(request.headers(), peer);
    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Admission control. Consumes one token per admitted request; rejections
/// answer 429 before any downstream component runs.
pub async fn rate_gate_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(identity) = request.extensions().get::<UserIdentity>().cloned() else {
        // Identity middleware always runs first; missing identity is a bug.
        return ApiResponse::error("identity not resolved", "internal", None).into_error_response();
    };

    match state.rate_gate.check(&identity) {
        Decision::Accept => next.run(request).await,
        Decision::RejectRate { retry_after } => {
            warn!(user = %identity.user_id, tier = %identity.tier, "rate quota exhausted");
            rate_limited_response(
                format!(
                    "rate limit exceeded for tier '{}'; retry in {:.1}s",
                    identity.tier,
                    retry_after.as_secs_f64()
                ),
                "quota",
                retry_after.as_secs_f64(),
            )
        }
        Decision::RejectInterval { retry_after } => {
            warn!(user = %identity.user_id, "minimum request interval violated");
            rate_limited_response(
                format!(
                    "requests too close together; retry in {:.2}s",
                    retry_after.as_secs_f64()
                ),
                "min-interval",
                retry_after.as_secs_f64(),
            )
        }
    }
}

fn rate_limited_response(message: String, reason: &str, retry_after: f64) -> Response {
    let body = ApiResponse::error(
        message,
        "rate-limited",
        Some(serde_json::json!({ "reason": reason, "retry_after": retry_after })),
    );
    (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
}

/// Generates the trace id, spans the request, and records metrics.
pub async fn logging_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let trace_id = Uuid::new_v4().to_string();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let identity = request
        .extensions()
        .get::<UserIdentity>()
        .map(|i| (i.user_id.clone(), i.tier.clone()))
        .unwrap_or_else(|| ("unknown".to_string(), "default".to_string()));
    let bytes_in = request
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    request.extensions_mut().insert(TraceId(trace_id.clone()));

    let span = info_span!(
        "request",
        trace_id = %trace_id,
        method = %method,
        route = %route,
        user = %identity.0,
        tier = %identity.1,
    );

    let started = Instant::now();
    let response = next.run(request).instrument(span.clone()).await;
    let latency = started.elapsed();

    let status = response.status().as_u16();
    let bytes_out = response
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    state
        .metrics
        .record(&method, &route, status, latency, bytes_in, bytes_out);

    span.in_scope(|| {
        info!(
            status,
            latency_ms = latency.as_millis() as u64,
            bytes_in,
            bytes_out,
            "request completed"
        );
    });

    response
}

trait IntoErrorResponse {
    fn into_error_response(self) -> Response;
}

impl IntoErrorResponse for ApiResponse {
    fn into_error_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}
