//! Per-request orchestration: fan out, gate, plan, stream.
//!
//! One inbound request flows through a fixed sequence: the content and
//! entitlement tasks fan out to the bounded pool, the gate combines their
//! results, the planner turns the `Range` header into a byte window
//! against the resolved content length, and the streamer opens the media
//! file. The gate runs only after both tasks resolve; the streamer only
//! after the gate allows.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::StreamGateConfig;
use crate::fanout::{FanOutHandle, TaskError, TaskOutcome, UpstreamTask};
use crate::gate::{self, DenialReason, StreamDecision};
use crate::range::{self, RangeError, RangeWindow};
use crate::streaming::{MediaStream, MediaStreamer, StreamError};
use crate::upstream::{ContentKind, ContentLookup, EntitlementCheck};

/// One inbound stream request, owned by the orchestrator for its lifetime.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub content_kind: ContentKind,
    pub content_id: i64,
    /// Opaque caller identity injected by the upstream gateway
    pub caller_id: String,
    pub range_header: Option<String>,
}

/// Terminal outcome of one orchestrated request.
pub enum StreamOutcome {
    /// Open media stream, ready to drain to the response sink
    Stream(MediaStream),
    /// Denied by the gate; terminal
    Denied { reason: DenialReason },
    /// Requested range cannot be satisfied against the content size
    NotSatisfiable { total: u64 },
}

/// Faults that abort a request before or while opening the stream.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The end-to-end deadline elapsed before streaming began.
    #[error("Request deadline exceeded before streaming began")]
    DeadlineExceeded,

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
}

/// Ties the fan-out executor, gate, planner, and streamer together.
///
/// Stateless between requests; the fan-out handle is the only shared
/// resource, and it serializes admission itself.
pub struct StreamOrchestrator {
    fanout: FanOutHandle,
    content: Arc<dyn ContentLookup>,
    entitlement: Arc<dyn EntitlementCheck>,
    streamer: MediaStreamer,
    task_timeout: Duration,
    request_deadline: Duration,
}

impl StreamOrchestrator {
    pub fn new(
        fanout: FanOutHandle,
        content: Arc<dyn ContentLookup>,
        entitlement: Arc<dyn EntitlementCheck>,
        config: &StreamGateConfig,
    ) -> Self {
        Self {
            fanout,
            content,
            entitlement,
            streamer: MediaStreamer::new(&config.streaming),
            task_timeout: config.fanout.task_timeout,
            request_deadline: config.fanout.request_deadline,
        }
    }

    /// Handles one request through to a terminal outcome.
    ///
    /// # Errors
    ///
    /// - `OrchestratorError::DeadlineExceeded` - Deadline elapsed before
    ///   streaming began
    /// - `OrchestratorError::Stream` - Media file missing or unreadable
    pub async fn handle(&self, request: StreamRequest) -> Result<StreamOutcome, OrchestratorError> {
        let started = Instant::now();
        info!(
            kind = %request.content_kind,
            id = request.content_id,
            caller = %request.caller_id,
            range = request.range_header.as_deref().unwrap_or("-"),
            "Stream request received"
        );

        let tasks = self.build_tasks(&request);
        let results = self.fanout.run_all(tasks, self.request_deadline).await;
        debug!(id = request.content_id, "Fan-out resolved");

        let (locator, total_bytes) = match gate::decide(&results) {
            StreamDecision::Deny { reason } => {
                info!(id = request.content_id, %reason, "Stream request denied");
                return Ok(StreamOutcome::Denied { reason });
            }
            StreamDecision::Allow {
                locator,
                total_bytes,
            } => (locator, total_bytes),
        };

        // Never start a stream the deadline cannot account for.
        if started.elapsed() >= self.request_deadline {
            warn!(id = request.content_id, "Deadline exceeded after fan-out");
            return Err(OrchestratorError::DeadlineExceeded);
        }

        let window = match range::plan(request.range_header.as_deref(), total_bytes) {
            Ok(window) => window,
            Err(RangeError::NotSatisfiable { start, total }) => {
                info!(id = request.content_id, start, total, "Range not satisfiable");
                return Ok(StreamOutcome::NotSatisfiable { total });
            }
            // plan() resolves malformed headers to the full window itself,
            // so this arm never fires in practice.
            Err(RangeError::Malformed { .. }) => RangeWindow::full(total_bytes),
        };

        let stream = self.streamer.open(&locator, window).await?;
        info!(
            id = request.content_id,
            start = window.start,
            end = window.end,
            total = window.total,
            "Streaming"
        );

        Ok(StreamOutcome::Stream(stream))
    }

    /// Builds the `{content, entitlement}` fan-out round for one request.
    ///
    /// Collaborator errors become [`TaskError::Transport`] at this
    /// boundary; the gate only ever sees task outcomes.
    fn build_tasks(&self, request: &StreamRequest) -> Vec<UpstreamTask> {
        let content = Arc::clone(&self.content);
        let kind = request.content_kind;
        let id = request.content_id;
        let content_task = UpstreamTask::new(gate::CONTENT_TASK, self.task_timeout, move || {
            async move {
                content
                    .content(kind, id)
                    .await
                    .map(TaskOutcome::Content)
                    .map_err(|e| TaskError::Transport {
                        reason: e.to_string(),
                    })
            }
            .boxed()
        });

        let entitlement = Arc::clone(&self.entitlement);
        let caller_id = request.caller_id.clone();
        let entitlement_task =
            UpstreamTask::new(gate::ENTITLEMENT_TASK, self.task_timeout, move || {
                async move {
                    entitlement
                        .entitlement(&caller_id)
                        .await
                        .map(TaskOutcome::Entitlement)
                        .map_err(|e| TaskError::Transport {
                            reason: e.to_string(),
                        })
                }
                .boxed()
            });

        vec![content_task, entitlement_task]
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures::StreamExt;
    use tempfile::TempDir;

    use super::*;
    use crate::config::StreamGateConfig;
    use crate::fanout::FanOutExecutor;
    use crate::upstream::{ContentLocation, Entitlement, UpstreamError};

    struct FixedContent {
        location: Result<ContentLocation, UpstreamError>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl ContentLookup for FixedContent {
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

    struct FixedEntitlement {
        entitlement: Result<Entitlement, UpstreamError>,
    }

    #[async_trait]
    impl EntitlementCheck for FixedEntitlement {
        async fn entitlement(&self, _caller_id: &str) -> Result<Entitlement, UpstreamError> {
            self.entitlement.clone()
        }
    }

    struct Fixture {
        orchestrator: StreamOrchestrator,
        executor: FanOutExecutor,
        _media_root: TempDir,
    }

    fn fixture(
        content: FixedContent,
        entitlement: FixedEntitlement,
        media: Option<(&str, &[u8])>,
    ) -> Fixture {
        let media_root = TempDir::new().unwrap();
        if let Some((name, data)) = media {
            std::fs::write(media_root.path().join(name), data).unwrap();
        }

        let mut config = StreamGateConfig::for_testing();
        config.streaming.media_root = media_root.path().to_path_buf();

        let executor = FanOutExecutor::new(&config.fanout);
        let orchestrator = StreamOrchestrator::new(
            executor.handle(),
            Arc::new(content),
            Arc::new(entitlement),
            &config,
        );

        Fixture {
            orchestrator,
            executor,
            _media_root: media_root,
        }
    }

    fn active_content(path: &str, total: u64) -> FixedContent {
        FixedContent {
            location: Ok(ContentLocation {
                storage_path: path.to_string(),
                total_bytes: total,
                active: true,
            }),
            delay: None,
        }
    }

    fn entitled() -> FixedEntitlement {
        FixedEntitlement {
            entitlement: Ok(Entitlement {
                allowed: true,
                reason: None,
            }),
        }
    }

    fn request(range: Option<&str>) -> StreamRequest {
        StreamRequest {
            content_kind: ContentKind::Movie,
            content_id: 42,
            caller_id: "caller-1".to_string(),
            range_header: range.map(str::to_string),
        }
    }

    async fn body_of(stream: MediaStream) -> Vec<u8> {
        let mut chunks = stream.into_chunks();
        let mut body = Vec::new();
        while let Some(chunk) = chunks.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        body
    }

    #[tokio::test]
    async fn test_full_content_stream_without_range() {
        let data = vec![8u8; 1000];
        let fx = fixture(
            active_content("movie.mp4", 1000),
            entitled(),
            Some(("movie.mp4", &data)),
        );

        let outcome = fx.orchestrator.handle(request(None)).await.unwrap();
        match outcome {
            StreamOutcome::Stream(stream) => {
                assert!(!stream.framing().partial);
                assert_eq!(stream.framing().content_range(), None);
                assert_eq!(body_of(stream).await.len(), 1000);
            }
            _ => panic!("Expected a stream"),
        }

        fx.executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_partial_content_stream_with_range() {
        let data: Vec<u8> = (0..1000u64).map(|b| (b % 256) as u8).collect();
        let fx = fixture(
            active_content("movie.mp4", 1000),
            entitled(),
            Some(("movie.mp4", &data)),
        );

        let outcome = fx
            .orchestrator
            .handle(request(Some("bytes=500-699")))
            .await
            .unwrap();
        match outcome {
            StreamOutcome::Stream(stream) => {
                assert_eq!(
                    stream.framing().content_range().as_deref(),
                    Some("bytes 500-699/1000")
                );
                assert_eq!(body_of(stream).await, &data[500..=699]);
            }
            _ => panic!("Expected a stream"),
        }

        fx.executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_denied_caller_never_reaches_the_streamer() {
        // No media file on disk: a denial that tried to stream would
        // surface as NotFound instead of Denied.
        let fx = fixture(
            active_content("movie.mp4", 1000),
            FixedEntitlement {
                entitlement: Ok(Entitlement {
                    allowed: false,
                    reason: Some("expired".to_string()),
                }),
            },
            None,
        );

        let outcome = fx.orchestrator.handle(request(None)).await.unwrap();
        match outcome {
            StreamOutcome::Denied { reason } => assert_eq!(reason.as_str(), "expired"),
            _ => panic!("Expected denial"),
        }

        fx.executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_content_timeout_denies_despite_positive_entitlement() {
        let fx = fixture(
            FixedContent {
                location: Ok(ContentLocation {
                    storage_path: "movie.mp4".to_string(),
                    total_bytes: 1000,
                    active: true,
                }),
                delay: Some(Duration::from_secs(10)),
            },
            entitled(),
            None,
        );

        let outcome = fx.orchestrator.handle(request(None)).await.unwrap();
        match outcome {
            StreamOutcome::Denied { reason } => {
                assert_eq!(reason, DenialReason::ContentUnavailable);
            }
            _ => panic!("Expected denial"),
        }
    }

    #[tokio::test]
    async fn test_unsatisfiable_range_reports_total() {
        let data = vec![0u8; 1000];
        let fx = fixture(
            active_content("movie.mp4", 1000),
            entitled(),
            Some(("movie.mp4", &data)),
        );

        let outcome = fx
            .orchestrator
            .handle(request(Some("bytes=1000-1099")))
            .await
            .unwrap();
        match outcome {
            StreamOutcome::NotSatisfiable { total } => assert_eq!(total, 1000),
            _ => panic!("Expected NotSatisfiable"),
        }

        fx.executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_media_surfaces_stream_not_found() {
        let fx = fixture(active_content("ghost.mp4", 1000), entitled(), None);

        let result = fx.orchestrator.handle(request(None)).await;
        match result {
            Err(OrchestratorError::Stream(StreamError::NotFound { locator })) => {
                assert_eq!(locator, "ghost.mp4");
            }
            _ => panic!("Expected NotFound"),
        }

        fx.executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_entitlement_transport_error_fails_closed() {
        let fx = fixture(
            active_content("movie.mp4", 1000),
            FixedEntitlement {
                entitlement: Err(UpstreamError::Transport {
                    reason: "connection refused".to_string(),
                }),
            },
            None,
        );

        let outcome = fx.orchestrator.handle(request(None)).await.unwrap();
        match outcome {
            StreamOutcome::Denied { reason } => {
                assert_eq!(reason, DenialReason::EntitlementCheckFailed);
            }
            _ => panic!("Expected denial"),
        }

        fx.executor.shutdown().await;
    }
}
