//! Streaming endpoint handlers.
//!
//! Maps orchestrator outcomes onto user-visible HTTP statuses; this layer
//! is the only place that translation happens.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use streamgate_core::orchestrator::OrchestratorError;
use streamgate_core::{ContentKind, DenialReason, StreamError, StreamOutcome, StreamRequest};
use tracing::{error, info};

use super::range::{
    build_error_response, build_not_satisfiable_response, build_stream_response,
    extract_range_header,
};
use crate::server::AppState;

/// Header carrying the opaque caller identity, injected by the upstream
/// gateway. Trusted as-is; this service does not re-validate it.
const CALLER_ID_HEADER: &str = "X-User-Id";

/// Main streaming handler: `GET /stream/{kind}/{id}`.
pub async fn stream_content(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
    headers: HeaderMap,
) -> Response<Body> {
    {
        let mut metrics = state.metrics.write().await;
        metrics.total_requests += 1;
    }

    let Ok(content_kind) = kind.parse::<ContentKind>() else {
        return build_error_response(StatusCode::BAD_REQUEST, "unknown_content_kind");
    };

    let Some(caller_id) = caller_id(&headers) else {
        return build_error_response(StatusCode::BAD_REQUEST, "missing_caller_identity");
    };

    let request = StreamRequest {
        content_kind,
        content_id: id,
        caller_id,
        range_header: extract_range_header(&headers),
    };

    match state.orchestrator.handle(request).await {
        Ok(StreamOutcome::Stream(stream)) => {
            let framing = stream.framing();
            let mut metrics = state.metrics.write().await;
            metrics.streams_started += 1;
            metrics.bytes_requested += framing.content_length();
            if framing.partial {
                metrics.partial_requests += 1;
            }
            drop(metrics);

            build_stream_response(stream)
        }
        Ok(StreamOutcome::Denied { reason }) => {
            state.metrics.write().await.denied_requests += 1;
            build_denial_response(&reason)
        }
        Ok(StreamOutcome::NotSatisfiable { total }) => {
            state.metrics.write().await.unsatisfiable_ranges += 1;
            build_not_satisfiable_response(total)
        }
        Err(OrchestratorError::DeadlineExceeded) => {
            state.metrics.write().await.failed_requests += 1;
            build_error_response(StatusCode::GATEWAY_TIMEOUT, "deadline_exceeded")
        }
        Err(OrchestratorError::Stream(StreamError::NotFound { locator })) => {
            state.metrics.write().await.failed_requests += 1;
            info!(%locator, "Media file missing, asking client to retry");
            build_retryable_response()
        }
        Err(OrchestratorError::Stream(StreamError::Io(e))) => {
            state.metrics.write().await.failed_requests += 1;
            error!("Media I/O failure: {e}");
            build_error_response(StatusCode::INTERNAL_SERVER_ERROR, "stream_io_failure")
        }
    }
}

/// Denials map to `404` when the content itself is unavailable and `403`
/// for everything entitlement-shaped, always carrying the specific reason.
fn build_denial_response(reason: &DenialReason) -> Response<Body> {
    let status = match reason {
        DenialReason::ContentUnavailable => StatusCode::NOT_FOUND,
        DenialReason::EntitlementCheckFailed | DenialReason::NotEntitled { .. } => {
            StatusCode::FORBIDDEN
        }
    };
    build_error_response(status, reason.as_str())
}

/// A storage race (content resolved but the file is not on disk yet, or
/// was just removed) is retryable by the client.
fn build_retryable_response() -> Response<Body> {
    let mut response =
        build_error_response(StatusCode::SERVICE_UNAVAILABLE, "media_unavailable");
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, axum::http::HeaderValue::from_static("5"));
    response
}

fn caller_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CALLER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Health check endpoint: `GET /health`.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let health_info = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.server_started_at.elapsed().as_secs(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (StatusCode::OK, Json(health_info))
}

/// Runtime statistics endpoint: `GET /stats`.
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.metrics.read().await.clone();
    Json(metrics)
}
