//! HTTP range planning for media delivery.
//!
//! Parses a `Range` header into a byte window against a known content
//! length. Pure functions, no I/O; the streaming layer consumes the
//! resulting [`RangeWindow`].

use tracing::warn;

/// Inclusive byte window `[start, end]` of a resource of `total` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeWindow {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl RangeWindow {
    /// Window covering the entire resource.
    ///
    /// `total` must be at least 1; a zero-length resource has no valid
    /// byte window.
    pub fn full(total: u64) -> Self {
        debug_assert!(total > 0);
        Self {
            start: 0,
            end: total - 1,
            total,
        }
    }

    /// Number of bytes the window covers.
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Whether the window is a strict sub-range of the resource.
    ///
    /// A partial window is served as `206 Partial Content`; a full one
    /// as `200 OK`.
    pub fn is_partial(&self) -> bool {
        self.start != 0 || self.end != self.total - 1
    }
}

/// Errors that can occur during range planning.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("Malformed range header: {header}")]
    Malformed { header: String },

    #[error("Range start {start} not satisfiable, content size is {total}")]
    NotSatisfiable { start: u64, total: u64 },
}

/// Plans the byte window for a request against a resource of `total` bytes.
///
/// A missing or malformed header yields the full window; this is the
/// normal full-content path, not an error. A syntactically valid start
/// beyond the end of the resource is the one unsatisfiable case.
///
/// Only the first of multiple comma-separated ranges is honored; the
/// delivery path serves a single window per response.
///
/// # Errors
///
/// - `RangeError::NotSatisfiable` - Start position at or beyond `total`,
///   or `total` is zero
pub fn plan(range_header: Option<&str>, total: u64) -> Result<RangeWindow, RangeError> {
    if total == 0 {
        return Err(RangeError::NotSatisfiable { start: 0, total: 0 });
    }

    let Some(header) = range_header else {
        return Ok(RangeWindow::full(total));
    };

    let (start, end) = match parse_range_spec(header) {
        Ok(spec) => spec,
        Err(RangeError::Malformed { header }) => {
            warn!("Ignoring malformed range header: {header}");
            return Ok(RangeWindow::full(total));
        }
        Err(other) => return Err(other),
    };

    if start >= total {
        return Err(RangeError::NotSatisfiable { start, total });
    }

    let end = end.unwrap_or(total - 1).min(total - 1);
    if end < start {
        warn!("Ignoring inverted range header: {header}");
        return Ok(RangeWindow::full(total));
    }

    Ok(RangeWindow { start, end, total })
}

/// Parses a `bytes=<start>-<end>` range specification.
///
/// `start` is required; `end` is optional (open-ended range). Returns the
/// raw positions without validating them against any content length.
///
/// # Errors
///
/// - `RangeError::Malformed` - Header is not a parseable `bytes=` range
pub fn parse_range_spec(header: &str) -> Result<(u64, Option<u64>), RangeError> {
    let malformed = || RangeError::Malformed {
        header: header.to_string(),
    };

    let spec = header.strip_prefix("bytes=").ok_or_else(malformed)?;

    // Only the first range of a comma-separated list is honored.
    let first = spec.split(',').next().ok_or_else(malformed)?.trim();

    let (start_str, end_str) = first.split_once('-').ok_or_else(malformed)?;

    let start = start_str.parse::<u64>().map_err(|_| malformed())?;
    let end = if end_str.is_empty() {
        None
    } else {
        Some(end_str.parse::<u64>().map_err(|_| malformed())?)
    };

    Ok((start, end))
}
