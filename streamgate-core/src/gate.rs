//! Entitlement gate: combines fan-out results into a stream/deny decision.
//!
//! The gate is fail-closed. Ambiguous or partial upstream failure (a timed
//! out entitlement check, a missing content lookup) always resolves to a
//! denial; absence of a positive signal is never treated as permission.

use tracing::debug;

use crate::fanout::{FanOutResult, TaskOutcome};

/// Task name the gate expects the content lookup under.
pub const CONTENT_TASK: &str = "content";

/// Task name the gate expects the entitlement check under.
pub const ENTITLEMENT_TASK: &str = "entitlement";

const DEFAULT_DENIAL_REASON: &str = "no_active_subscription";

/// Why a stream request was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// Content could not be resolved, or is not active for playback
    ContentUnavailable,
    /// The entitlement check itself failed; denied fail-closed
    EntitlementCheckFailed,
    /// The caller is not entitled, with the upstream-supplied reason
    NotEntitled { reason: String },
}

impl DenialReason {
    /// Wire-format reason string for the JSON error body.
    pub fn as_str(&self) -> &str {
        match self {
            DenialReason::ContentUnavailable => "content_unavailable",
            DenialReason::EntitlementCheckFailed => "entitlement_check_failed",
            DenialReason::NotEntitled { reason } => reason,
        }
    }
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal output of the gate, consumed once by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDecision {
    /// Stream may proceed from `locator`; range planning against
    /// `total_bytes` is the planner's job, not the gate's.
    Allow { locator: String, total_bytes: u64 },
    /// Terminal denial with the specific reason.
    Deny { reason: DenialReason },
}

/// Combines the fan-out results into an allow/deny decision.
///
/// Precedence: unavailable content first, then a failed entitlement check
/// (fail closed), then an explicit upstream denial. Only when the content
/// is active and the caller is positively entitled does the gate allow.
pub fn decide(results: &FanOutResult) -> StreamDecision {
    let location = match results.get(CONTENT_TASK) {
        Some(Ok(TaskOutcome::Content(location))) => location,
        other => {
            debug!(outcome = ?other, "Content lookup unusable, denying");
            return StreamDecision::Deny {
                reason: DenialReason::ContentUnavailable,
            };
        }
    };

    if !location.active {
        debug!(path = %location.storage_path, "Content inactive, denying");
        return StreamDecision::Deny {
            reason: DenialReason::ContentUnavailable,
        };
    }

    let entitlement = match results.get(ENTITLEMENT_TASK) {
        Some(Ok(TaskOutcome::Entitlement(entitlement))) => entitlement,
        other => {
            debug!(outcome = ?other, "Entitlement check unusable, denying");
            return StreamDecision::Deny {
                reason: DenialReason::EntitlementCheckFailed,
            };
        }
    };

    if !entitlement.allowed {
        let reason = entitlement
            .reason
            .clone()
            .unwrap_or_else(|| DEFAULT_DENIAL_REASON.to_string());
        return StreamDecision::Deny {
            reason: DenialReason::NotEntitled { reason },
        };
    }

    StreamDecision::Allow {
        locator: location.storage_path.clone(),
        total_bytes: location.total_bytes,
    }
}
