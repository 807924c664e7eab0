//! Runtime counters for the streaming endpoint.

use serde::Serialize;

/// Process-lifetime counters, exposed at `/stats`.
///
/// Counts request dispositions, not wire-level progress: `bytes_requested`
/// is the sum of served window sizes, which equals bytes put on the wire
/// unless a client disconnects mid-stream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamingMetrics {
    pub total_requests: u64,
    pub streams_started: u64,
    pub partial_requests: u64,
    pub denied_requests: u64,
    pub unsatisfiable_ranges: u64,
    pub failed_requests: u64,
    pub bytes_requested: u64,
}
