//! Centralized configuration for StreamGate.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all StreamGate components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct StreamGateConfig {
    pub fanout: FanOutConfig,
    pub streaming: StreamingConfig,
    pub upstream: UpstreamConfig,
}

/// Fan-out worker pool configuration.
///
/// Controls how many upstream calls may run concurrently across the whole
/// process and how the pool behaves under load. The pool size is independent
/// of request volume; saturation rejects submissions instead of blocking.
#[derive(Debug, Clone)]
pub struct FanOutConfig {
    /// Number of worker tasks servicing the fan-out queue
    pub workers: usize,
    /// Bounded queue capacity; submissions beyond this fail fast
    pub queue_capacity: usize,
    /// Per-task timeout for a single upstream call
    pub task_timeout: Duration,
    /// End-to-end deadline for one inbound request, up to the point
    /// streaming begins
    pub request_deadline: Duration,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            // Async workers multiplex I/O waits; a small multiple of the
            // core count covers the two-call fan-out at realistic load.
            workers: num_cpus::get() * 2,
            queue_capacity: 64,
            task_timeout: Duration::from_secs(2),
            request_deadline: Duration::from_secs(10),
        }
    }
}

/// Media delivery configuration.
///
/// Controls where media files are resolved from and how they are chunked
/// onto the wire.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Base directory for relative storage paths
    pub media_root: PathBuf,
    /// Size of chunks read from disk per stream poll
    pub chunk_size: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("media"),
            chunk_size: 256 * 1024, // 256 KiB
        }
    }
}

/// Sibling-service client configuration.
///
/// Base URLs and timeouts for the content lookup and entitlement check
/// collaborators.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Content management service base URL
    pub content_base_url: String,
    /// Subscription service base URL
    pub entitlement_base_url: String,
    /// TCP connect timeout for upstream calls
    pub connect_timeout: Duration,
    /// Full request timeout for upstream calls
    pub request_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            content_base_url: "http://localhost:8081".to_string(),
            entitlement_base_url: "http://localhost:8082".to_string(),
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(2),
        }
    }
}

impl StreamGateConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Fan-out configuration overrides
        if let Ok(workers) = std::env::var("STREAMGATE_FANOUT_WORKERS") {
            if let Ok(count) = workers.parse::<usize>() {
                if count > 0 {
                    config.fanout.workers = count;
                }
            }
        }

        if let Ok(capacity) = std::env::var("STREAMGATE_FANOUT_QUEUE") {
            if let Ok(count) = capacity.parse::<usize>() {
                if count > 0 {
                    config.fanout.queue_capacity = count;
                }
            }
        }

        if let Ok(timeout) = std::env::var("STREAMGATE_TASK_TIMEOUT_MS") {
            if let Ok(millis) = timeout.parse::<u64>() {
                config.fanout.task_timeout = Duration::from_millis(millis);
            }
        }

        if let Ok(deadline) = std::env::var("STREAMGATE_REQUEST_DEADLINE_MS") {
            if let Ok(millis) = deadline.parse::<u64>() {
                config.fanout.request_deadline = Duration::from_millis(millis);
            }
        }

        // Streaming configuration overrides
        if let Ok(root) = std::env::var("STREAMGATE_MEDIA_ROOT") {
            config.streaming.media_root = PathBuf::from(root);
        }

        // Upstream configuration overrides
        if let Ok(url) = std::env::var("STREAMGATE_CONTENT_URL") {
            config.upstream.content_base_url = url;
        }

        if let Ok(url) = std::env::var("STREAMGATE_ENTITLEMENT_URL") {
            config.upstream.entitlement_base_url = url;
        }

        config
    }

    /// Creates a configuration optimized for testing.
    ///
    /// Small pool, tight timeouts, so failure paths resolve quickly.
    pub fn for_testing() -> Self {
        Self {
            fanout: FanOutConfig {
                workers: 2,
                queue_capacity: 4,
                task_timeout: Duration::from_millis(200),
                request_deadline: Duration::from_secs(2),
            },
            ..Default::default()
        }
    }
}
