//! StreamGate Core - Entitlement-gated partial-content streaming
//!
//! This crate provides the fundamental building blocks for origin-side media
//! streaming: bounded fan-out to sibling services, the entitlement gate,
//! HTTP range planning, byte-range delivery, and the per-request orchestrator
//! that ties them together.

pub mod config;
pub mod fanout;
pub mod gate;
pub mod orchestrator;
pub mod range;
pub mod streaming;
pub mod tracing_setup;
pub mod upstream;

// Re-export main types for convenient access
pub use config::StreamGateConfig;
pub use fanout::{FanOutExecutor, FanOutHandle, TaskError};
pub use gate::{DenialReason, StreamDecision};
pub use orchestrator::{StreamOrchestrator, StreamOutcome, StreamRequest};
pub use range::{RangeError, RangeWindow};
pub use streaming::{MediaStream, MediaStreamer, StreamError};
pub use upstream::{ContentKind, ContentLookup, EntitlementCheck, UpstreamError};

/// Core errors that can bubble up from any StreamGate subsystem.
///
/// High-level error types representing failures in core functionality.
#[derive(Debug, thiserror::Error)]
pub enum StreamGateError {
    #[error("Range error: {0}")]
    Range(#[from] RangeError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamGateError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            StreamGateError::Range(RangeError::NotSatisfiable { start, total }) => {
                format!("Requested byte position {start} is beyond the content size {total}")
            }
            StreamGateError::Range(_) => "Invalid range request".to_string(),
            StreamGateError::Stream(StreamError::NotFound { locator }) => {
                format!("Media file not found: {locator}")
            }
            StreamGateError::Stream(_) => "Streaming error occurred".to_string(),
            StreamGateError::Upstream(_) => "Upstream service error occurred".to_string(),
            StreamGateError::Configuration { reason } => {
                format!("Configuration error: {reason}")
            }
            StreamGateError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(self, StreamGateError::Range(_))
    }
}

pub type Result<T> = std::result::Result<T, StreamGateError>;
