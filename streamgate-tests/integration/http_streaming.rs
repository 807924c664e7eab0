//! End-to-end tests of the HTTP streaming path.
//!
//! Each test runs a live server on an ephemeral port with scripted
//! sibling-service collaborators, then drives it with a real HTTP client:
//! full and partial content delivery, denial bodies, unsatisfiable
//! ranges, storage races, and the health/stats endpoints.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use streamgate_core::StreamOrchestrator;
use streamgate_core::config::StreamGateConfig;
use streamgate_core::fanout::FanOutExecutor;
use streamgate_core::upstream::{
    ContentKind, ContentLocation, ContentLookup, Entitlement, EntitlementCheck, UpstreamError,
};
use streamgate_web::{AppState, router};
use tempfile::TempDir;

/// Scripted content service.
struct TestContent {
    location: Result<ContentLocation, UpstreamError>,
    delay: Option<Duration>,
}

impl TestContent {
    fn active(path: &str, total_bytes: u64) -> Self {
        Self {
            location: Ok(ContentLocation {
                storage_path: path.to_string(),
                total_bytes,
                active: true,
            }),
            delay: None,
        }
    }

    fn inactive(path: &str, total_bytes: u64) -> Self {
        Self {
            location: Ok(ContentLocation {
                storage_path: path.to_string(),
                total_bytes,
                active: false,
            }),
            delay: None,
        }
    }

    fn hanging() -> Self {
        Self {
            location: Ok(ContentLocation {
                storage_path: "movie.mp4".to_string(),
                total_bytes: 1000,
                active: true,
            }),
            delay: Some(Duration::from_secs(60)),
        }
    }
}

#[async_trait]
impl ContentLookup for TestContent {
    async fn content(
        &self,
        _kind: ContentKind,
        _id: i64,
    ) -> Result<ContentLocation, UpstreamError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.location.clone()
    }
}

/// Scripted subscription service.
struct TestEntitlement {
    entitlement: Result<Entitlement, UpstreamError>,
}

impl TestEntitlement {
    fn allowed() -> Self {
        Self {
            entitlement: Ok(Entitlement {
                allowed: true,
                reason: None,
            }),
        }
    }

    fn denied(reason: &str) -> Self {
        Self {
            entitlement: Ok(Entitlement {
                allowed: false,
                reason: Some(reason.to_string()),
            }),
        }
    }
}

#[async_trait]
impl EntitlementCheck for TestEntitlement {
    async fn entitlement(&self, _caller_id: &str) -> Result<Entitlement, UpstreamError> {
        self.entitlement.clone()
    }
}

/// Starts a live server with the given collaborators and media root.
async fn spawn_server(
    content: TestContent,
    entitlement: TestEntitlement,
    media_root: &Path,
) -> SocketAddr {
    let mut config = StreamGateConfig::for_testing();
    config.streaming.media_root = media_root.to_path_buf();

    let executor = FanOutExecutor::new(&config.fanout);
    let orchestrator = Arc::new(StreamOrchestrator::new(
        executor.handle(),
        Arc::new(content),
        Arc::new(entitlement),
        &config,
    ));
    // Workers stay alive through the orchestrator's queue handle.
    drop(executor);

    let app = router(AppState::new(orchestrator));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

fn test_media(total: usize) -> (TempDir, Vec<u8>) {
    let media_root = TempDir::new().unwrap();
    let data: Vec<u8> = (0..total).map(|b| (b % 251) as u8).collect();
    std::fs::write(media_root.path().join("movie.mp4"), &data).unwrap();
    (media_root, data)
}

fn stream_url(addr: SocketAddr) -> String {
    format!("http://{addr}/stream/movie/42")
}

async fn get(
    addr: SocketAddr,
    range: Option<&str>,
) -> reqwest::Response {
    let client = reqwest::Client::new();
    let mut request = client.get(stream_url(addr)).header("X-User-Id", "user-1");
    if let Some(range) = range {
        request = request.header("Range", range);
    }
    request.send().await.unwrap()
}

#[tokio::test]
async fn test_full_content_without_range_header() {
    let (media_root, data) = test_media(1000);
    let addr = spawn_server(
        TestContent::active("movie.mp4", 1000),
        TestEntitlement::allowed(),
        media_root.path(),
    )
    .await;

    let response = get(addr, None).await;

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["accept-ranges"], "bytes");
    assert_eq!(response.headers()["content-length"], "1000");
    assert!(response.headers().get("content-range").is_none());
    assert_eq!(response.bytes().await.unwrap().as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_partial_content_with_range_header() {
    let (media_root, data) = test_media(1000);
    let addr = spawn_server(
        TestContent::active("movie.mp4", 1000),
        TestEntitlement::allowed(),
        media_root.path(),
    )
    .await;

    let response = get(addr, Some("bytes=500-699")).await;

    assert_eq!(response.status(), reqwest::StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()["content-range"], "bytes 500-699/1000");
    assert_eq!(response.headers()["content-length"], "200");
    assert_eq!(response.bytes().await.unwrap().as_ref(), &data[500..=699]);
}

#[tokio::test]
async fn test_denied_entitlement_yields_403_with_reason() {
    // No media file on disk: a denial that still opened the streamer
    // would surface as 503 instead of the expected 403.
    let media_root = TempDir::new().unwrap();
    let addr = spawn_server(
        TestContent::active("movie.mp4", 1000),
        TestEntitlement::denied("expired"),
        media_root.path(),
    )
    .await;

    let response = get(addr, None).await;

    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "error": "expired" }));
}

#[tokio::test]
async fn test_content_timeout_denies_despite_entitlement() {
    let media_root = TempDir::new().unwrap();
    let addr = spawn_server(
        TestContent::hanging(),
        TestEntitlement::allowed(),
        media_root.path(),
    )
    .await;

    let response = get(addr, None).await;

    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "error": "content_unavailable" }));
}

#[tokio::test]
async fn test_inactive_content_yields_404() {
    let (media_root, _) = test_media(1000);
    let addr = spawn_server(
        TestContent::inactive("movie.mp4", 1000),
        TestEntitlement::allowed(),
        media_root.path(),
    )
    .await;

    let response = get(addr, None).await;

    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "error": "content_unavailable" }));
}

#[tokio::test]
async fn test_unsatisfiable_range_yields_416() {
    let (media_root, _) = test_media(1000);
    let addr = spawn_server(
        TestContent::active("movie.mp4", 1000),
        TestEntitlement::allowed(),
        media_root.path(),
    )
    .await;

    let response = get(addr, Some("bytes=1000-1099")).await;

    assert_eq!(
        response.status(),
        reqwest::StatusCode::RANGE_NOT_SATISFIABLE
    );
    assert_eq!(response.headers()["content-range"], "bytes */1000");
}

#[tokio::test]
async fn test_malformed_range_serves_full_content() {
    let (media_root, data) = test_media(500);
    let addr = spawn_server(
        TestContent::active("movie.mp4", 500),
        TestEntitlement::allowed(),
        media_root.path(),
    )
    .await;

    let response = get(addr, Some("bytes=half-way")).await;

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.bytes().await.unwrap().len(), data.len());
}

#[tokio::test]
async fn test_missing_caller_identity_yields_400() {
    let (media_root, _) = test_media(100);
    let addr = spawn_server(
        TestContent::active("movie.mp4", 100),
        TestEntitlement::allowed(),
        media_root.path(),
    )
    .await;

    let response = reqwest::Client::new()
        .get(stream_url(addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "missing_caller_identity");
}

#[tokio::test]
async fn test_storage_race_yields_retryable_503() {
    // The content service resolves a path that is not on disk yet.
    let media_root = TempDir::new().unwrap();
    let addr = spawn_server(
        TestContent::active("not-synced-yet.mp4", 1000),
        TestEntitlement::allowed(),
        media_root.path(),
    )
    .await;

    let response = get(addr, None).await;

    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()["retry-after"], "5");
}

#[tokio::test]
async fn test_resume_via_sequential_ranges() {
    let (media_root, data) = test_media(1000);
    let addr = spawn_server(
        TestContent::active("movie.mp4", 1000),
        TestEntitlement::allowed(),
        media_root.path(),
    )
    .await;

    // A client fetching the first half, disconnecting, then resuming.
    let first = get(addr, Some("bytes=0-499")).await;
    assert_eq!(first.status(), reqwest::StatusCode::PARTIAL_CONTENT);
    let mut assembled = first.bytes().await.unwrap().to_vec();

    let second = get(addr, Some("bytes=500-")).await;
    assert_eq!(second.status(), reqwest::StatusCode::PARTIAL_CONTENT);
    assert_eq!(second.headers()["content-range"], "bytes 500-999/1000");
    assembled.extend_from_slice(&second.bytes().await.unwrap());

    assert_eq!(assembled, data);
}

#[tokio::test]
async fn test_health_endpoint() {
    let media_root = TempDir::new().unwrap();
    let addr = spawn_server(
        TestContent::active("movie.mp4", 100),
        TestEntitlement::allowed(),
        media_root.path(),
    )
    .await;

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_stats_reflect_served_and_denied_requests() {
    let (media_root, _) = test_media(1000);
    let addr = spawn_server(
        TestContent::active("movie.mp4", 1000),
        TestEntitlement::allowed(),
        media_root.path(),
    )
    .await;

    get(addr, None).await.bytes().await.unwrap();
    get(addr, Some("bytes=0-99")).await.bytes().await.unwrap();
    get(addr, Some("bytes=2000-")).await.bytes().await.unwrap();

    let stats: serde_json::Value = reqwest::get(format!("http://{addr}/stats"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(stats["total_requests"], 3);
    assert_eq!(stats["streams_started"], 2);
    assert_eq!(stats["partial_requests"], 1);
    assert_eq!(stats["unsatisfiable_ranges"], 1);
    assert_eq!(stats["bytes_requested"], 1100);
}
