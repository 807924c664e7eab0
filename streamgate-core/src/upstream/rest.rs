//! REST adapters for the sibling-service collaborators.
//!
//! Thin JSON-over-HTTP clients for the content management and
//! subscription services. Each call carries its own timeout so the
//! fan-out executor can rely on upstream calls being bounded.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{
    ContentKind, ContentLocation, ContentLookup, Entitlement, EntitlementCheck, UpstreamError,
};
use crate::config::UpstreamConfig;

/// Header carrying the opaque caller identity between services.
pub const CALLER_ID_HEADER: &str = "X-User-Id";

/// Content management service response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentDto {
    video_file_path: Option<String>,
    file_size_bytes: Option<u64>,
    is_active: Option<bool>,
}

/// Subscription service response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionDto {
    status: Option<String>,
}

/// REST client for the content management service.
pub struct RestContentClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RestContentClient {
    /// Builds a client against `config.content_base_url`.
    ///
    /// # Errors
    ///
    /// - `UpstreamError::Transport` - Base URL is invalid or the HTTP
    ///   client cannot be constructed
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        Ok(Self {
            http: build_http_client(config.connect_timeout, config.request_timeout)?,
            base_url: parse_base_url(&config.content_base_url)?,
        })
    }

    fn content_url(&self, kind: ContentKind, id: i64) -> Result<Url, UpstreamError> {
        let path = match kind {
            ContentKind::Movie => format!("api/contents/{id}"),
            ContentKind::Episode => format!("api/episodes/{id}"),
        };
        self.base_url
            .join(&path)
            .map_err(|e| UpstreamError::Transport {
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl ContentLookup for RestContentClient {
    async fn content(&self, kind: ContentKind, id: i64) -> Result<ContentLocation, UpstreamError> {
        let url = self.content_url(kind, id)?;
        debug!(%url, "Fetching content location");

        let response = self.http.get(url).send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        let dto: ContentDto = response.json().await.map_err(decode_error)?;
        let storage_path = dto.video_file_path.ok_or_else(|| UpstreamError::Decode {
            reason: "content response carries no video file path".to_string(),
        })?;

        Ok(ContentLocation {
            storage_path,
            total_bytes: dto.file_size_bytes.unwrap_or(0),
            active: dto.is_active.unwrap_or(false),
        })
    }
}

/// REST client for the subscription service.
pub struct RestEntitlementClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RestEntitlementClient {
    /// Builds a client against `config.entitlement_base_url`.
    ///
    /// # Errors
    ///
    /// - `UpstreamError::Transport` - Base URL is invalid or the HTTP
    ///   client cannot be constructed
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        Ok(Self {
            http: build_http_client(config.connect_timeout, config.request_timeout)?,
            base_url: parse_base_url(&config.entitlement_base_url)?,
        })
    }
}

#[async_trait]
impl EntitlementCheck for RestEntitlementClient {
    async fn entitlement(&self, caller_id: &str) -> Result<Entitlement, UpstreamError> {
        let url = self
            .base_url
            .join("api/subscription/my-subscription")
            .map_err(|e| UpstreamError::Transport {
                reason: e.to_string(),
            })?;
        debug!(%url, "Checking entitlement");

        let response = self
            .http
            .get(url)
            .header(CALLER_ID_HEADER, caller_id)
            .send()
            .await
            .map_err(transport_error)?;

        // No subscription record at all is a clean denial, not a failure.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Entitlement {
                allowed: false,
                reason: Some("no_active_subscription".to_string()),
            });
        }

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        let dto: SubscriptionDto = response.json().await.map_err(decode_error)?;
        Ok(entitlement_from_status(dto.status.as_deref()))
    }
}

/// Maps a subscription status to an entitlement decision.
///
/// Only an `ACTIVE` subscription entitles the caller; any other status is
/// passed through lowercased as the denial reason.
fn entitlement_from_status(status: Option<&str>) -> Entitlement {
    match status {
        Some("ACTIVE") => Entitlement {
            allowed: true,
            reason: None,
        },
        Some(other) => Entitlement {
            allowed: false,
            reason: Some(format!("subscription_{}", other.to_lowercase())),
        },
        None => Entitlement {
            allowed: false,
            reason: Some("no_active_subscription".to_string()),
        },
    }
}

fn build_http_client(
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<reqwest::Client, UpstreamError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .build()
        .map_err(|e| UpstreamError::Transport {
            reason: e.to_string(),
        })
}

fn parse_base_url(base: &str) -> Result<Url, UpstreamError> {
    // A trailing slash keeps Url::join from replacing the last path
    // segment of the base.
    let normalized = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    Url::parse(&normalized).map_err(|e| UpstreamError::Transport {
        reason: format!("invalid base URL {base}: {e}"),
    })
}

fn transport_error(error: reqwest::Error) -> UpstreamError {
    UpstreamError::Transport {
        reason: error.to_string(),
    }
}

fn decode_error(error: reqwest::Error) -> UpstreamError {
    UpstreamError::Decode {
        reason: error.to_string(),
    }
}
