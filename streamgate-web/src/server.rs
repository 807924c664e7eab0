//! HTTP server assembly for StreamGate.
//!
//! Builds the router, wires shared state, and runs the listener. The
//! orchestrator handle and the metrics counters are the only shared state;
//! everything else is request-local.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::get;
use streamgate_core::StreamOrchestrator;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::handlers::{health, stats, stream_content};
use crate::metrics::StreamingMetrics;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<StreamOrchestrator>,
    pub metrics: Arc<RwLock<StreamingMetrics>>,
    pub server_started_at: Instant,
}

impl AppState {
    pub fn new(orchestrator: Arc<StreamOrchestrator>) -> Self {
        Self {
            orchestrator,
            metrics: Arc::new(RwLock::new(StreamingMetrics::default())),
            server_started_at: Instant::now(),
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/stream/{kind}/{id}", get(stream_content))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `addr` and serves requests until the process stops.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server loop fails.
pub async fn run_server(
    addr: SocketAddr,
    orchestrator: Arc<StreamOrchestrator>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(orchestrator);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("StreamGate listening on http://{addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use streamgate_core::config::StreamGateConfig;
    use streamgate_core::fanout::FanOutExecutor;
    use streamgate_core::upstream::{
        ContentKind, ContentLocation, ContentLookup, Entitlement, EntitlementCheck, UpstreamError,
    };
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;

    struct StaticContent {
        total_bytes: u64,
    }

    #[async_trait]
    impl ContentLookup for StaticContent {
        async fn content(
            &self,
            _kind: ContentKind,
            _id: i64,
        ) -> Result<ContentLocation, UpstreamError> {
            Ok(ContentLocation {
                storage_path: "movie.mp4".to_string(),
                total_bytes: self.total_bytes,
                active: true,
            })
        }
    }

    struct AlwaysEntitled;

    #[async_trait]
    impl EntitlementCheck for AlwaysEntitled {
        async fn entitlement(&self, _caller_id: &str) -> Result<Entitlement, UpstreamError> {
            Ok(Entitlement {
                allowed: true,
                reason: None,
            })
        }
    }

    fn test_router(media_root: &TempDir, total_bytes: u64) -> Router {
        let mut config = StreamGateConfig::for_testing();
        config.streaming.media_root = media_root.path().to_path_buf();

        let executor = FanOutExecutor::new(&config.fanout);
        let orchestrator = StreamOrchestrator::new(
            executor.handle(),
            Arc::new(StaticContent { total_bytes }),
            Arc::new(AlwaysEntitled),
            &config,
        );
        // Workers stay alive through the orchestrator's queue handle; the
        // executor struct itself may drop here.
        drop(executor);

        router(AppState::new(Arc::new(orchestrator)))
    }

    #[tokio::test]
    async fn test_stream_route_serves_partial_content() {
        let media_root = TempDir::new().unwrap();
        std::fs::write(media_root.path().join("movie.mp4"), vec![9u8; 1000]).unwrap();

        let app = test_router(&media_root, 1000);
        let request = Request::builder()
            .uri("/stream/movie/42")
            .header("X-User-Id", "user-1")
            .header(header::RANGE, "bytes=100-199")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes 100-199/1000"
        );

        let body = axum::body::to_bytes(response.into_body(), 2048).await.unwrap();
        assert_eq!(body.len(), 100);
    }

    #[tokio::test]
    async fn test_stream_route_requires_caller_identity() {
        let media_root = TempDir::new().unwrap();
        let app = test_router(&media_root, 1000);

        let request = Request::builder()
            .uri("/stream/movie/42")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stream_route_rejects_unknown_kind() {
        let media_root = TempDir::new().unwrap();
        let app = test_router(&media_root, 1000);

        let request = Request::builder()
            .uri("/stream/podcast/42")
            .header("X-User-Id", "user-1")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_route() {
        let media_root = TempDir::new().unwrap();
        let app = test_router(&media_root, 1000);

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
    }
}
