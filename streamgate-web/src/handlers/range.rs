//! Range header extraction and response framing for media streaming.
//!
//! Implements the response side of RFC 7233 HTTP Range Requests: partial
//! content framing, `Content-Range` headers, and the `416` shape for
//! unsatisfiable ranges.

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;
use streamgate_core::MediaStream;

/// Extract and parse the Range header from HTTP headers.
///
/// Returns None if no range header is present or its value is not valid
/// UTF-8; syntactic validation of the range itself belongs to the planner.
pub fn extract_range_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::RANGE)
        .and_then(|range| range.to_str().ok())
        .map(|s| s.to_string())
}

/// Build the framed streaming response for an open media stream.
///
/// `206 Partial Content` with `Content-Range` for a strict sub-range,
/// `200 OK` without one for the full window; `Accept-Ranges: bytes` and an
/// exact `Content-Length` either way. The body drains lazily from the
/// stream's chunk sequence.
pub fn build_stream_response(stream: MediaStream) -> Response<Body> {
    let framing = stream.framing().clone();

    let mut response = Response::builder()
        .header(header::CONTENT_TYPE, &framing.content_type)
        .header(header::CONTENT_LENGTH, framing.content_length().to_string())
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, "no-cache");

    if let Some(content_range) = framing.content_range() {
        response = response
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_RANGE, content_range);
    } else {
        response = response.status(StatusCode::OK);
    }

    response
        .body(Body::from_stream(stream.into_chunks()))
        .unwrap_or_else(|_| internal_error_response())
}

/// Build the `416 Range Not Satisfiable` response.
///
/// Carries `Content-Range: bytes */{total}` so the client can retry with
/// a valid window.
pub fn build_not_satisfiable_response(total: u64) -> Response<Body> {
    Response::builder()
        .status(StatusCode::RANGE_NOT_SATISFIABLE)
        .header(header::CONTENT_RANGE, format!("bytes */{total}"))
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::empty())
        .unwrap_or_else(|_| internal_error_response())
}

/// Build a JSON error response of the shape `{"error": reason}`.
pub fn build_error_response(status: StatusCode, reason: &str) -> Response<Body> {
    let body = serde_json::json!({ "error": reason }).to_string();

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| internal_error_response())
}

fn internal_error_response() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_extract_range_header_present() {
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, HeaderValue::from_static("bytes=0-1023"));

        assert_eq!(
            extract_range_header(&headers),
            Some("bytes=0-1023".to_string())
        );
    }

    #[test]
    fn test_extract_range_header_absent() {
        assert_eq!(extract_range_header(&HeaderMap::new()), None);
    }

    #[test]
    fn test_not_satisfiable_response_shape() {
        let response = build_not_satisfiable_response(1000);

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */1000"
        );
        assert_eq!(
            response.headers().get(header::ACCEPT_RANGES).unwrap(),
            "bytes"
        );
    }

    #[tokio::test]
    async fn test_error_response_body_shape() {
        let response = build_error_response(StatusCode::FORBIDDEN, "expired");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "expired" }));
    }
}
