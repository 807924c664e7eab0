//! Sibling-service collaborators: content lookup and entitlement check.
//!
//! The core is transport-agnostic. Whatever wire format the sibling
//! services speak, the orchestrator only sees these two traits; one
//! concrete adapter per transport lives alongside them (currently REST,
//! see [`rest`]).

pub mod rest;

use async_trait::async_trait;

pub use rest::{RestContentClient, RestEntitlementClient};

/// Kind of content being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Movie,
    Episode,
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "movie" => Ok(ContentKind::Movie),
            "episode" => Ok(ContentKind::Episode),
            _ => Err(format!("Unknown content kind: {s}")),
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Movie => write!(f, "movie"),
            ContentKind::Episode => write!(f, "episode"),
        }
    }
}

/// Resolved storage location of a piece of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLocation {
    /// Path of the media file; relative paths resolve against the
    /// configured media root
    pub storage_path: String,
    /// Size of the media file in bytes, as known to the content service
    pub total_bytes: u64,
    /// Whether the content is currently active for playback
    pub active: bool,
}

/// A caller's entitlement to stream, as reported by the subscription
/// service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entitlement {
    pub allowed: bool,
    /// Upstream-supplied denial reason, if any
    pub reason: Option<String>,
}

/// Errors from a sibling-service call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("Upstream transport failure: {reason}")]
    Transport { reason: String },

    #[error("Upstream returned status {status}")]
    Status { status: u16 },

    #[error("Upstream response could not be decoded: {reason}")]
    Decode { reason: String },
}

/// Resolves a content id to its storage location.
///
/// Calls must be cancelable and timeout-bounded; the fan-out executor
/// enforces its own per-task timeout on top.
#[async_trait]
pub trait ContentLookup: Send + Sync {
    async fn content(&self, kind: ContentKind, id: i64) -> Result<ContentLocation, UpstreamError>;
}

/// Checks whether a caller's subscription entitles them to stream.
#[async_trait]
pub trait EntitlementCheck: Send + Sync {
    async fn entitlement(&self, caller_id: &str) -> Result<Entitlement, UpstreamError>;
}
