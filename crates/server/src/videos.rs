//! Video range server
//!
//! Serves artifact bytes with `Range` support and progressive-download
//! friendliness. Before the first body byte the artifact must exist and
//! pass the stable-size check; a reader that race-wins the writer gets a
//! `503` with `Retry-After: 0` and the browser retries.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;

use avatar_gateway_core::ArtifactId;
use avatar_gateway_store::RangeStream;

use crate::metrics;
use crate::state::AppState;

/// Budget for the pre-send freshness check.
const READINESS_BUDGET: Duration = Duration::from_millis(100);

/// Outcome of parsing a `Range` header against a known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// No range (or an ignorable malformed header): serve everything.
    Full,
    /// Inclusive byte range.
    Partial(u64, u64),
    /// Syntactically valid but unsatisfiable.
    Unsatisfiable,
}

/// Parse a `Range: bytes=a-b` header. Supports `a-b`, `a-`, and `-n`
/// forms. Malformed headers are ignored per RFC 9110; media elements never
/// send multi-range requests, so those are served whole too.
pub fn parse_range(header: Option<&str>, len: u64) -> RangeSpec {
    let Some(header) = header else {
        return RangeSpec::Full;
    };
    let Some(spec) = header.strip_prefix("bytes=") else {
        return RangeSpec::Full;
    };
    if spec.contains(',') || len == 0 {
        return RangeSpec::Full;
    }

    let Some((start_s, end_s)) = spec.split_once('-') else {
        return RangeSpec::Full;
    };

    match (start_s.trim(), end_s.trim()) {
        ("", "") => RangeSpec::Full,
        // suffix form: last n bytes
        ("", suffix) => match suffix.parse::<u64>() {
            Ok(0) => RangeSpec::Unsatisfiable,
            Ok(n) => RangeSpec::Partial(len.saturating_sub(n), len - 1),
            Err(_) => RangeSpec::Full,
        },
        (start, "") => match start.parse::<u64>() {
            Ok(s) if s < len => RangeSpec::Partial(s, len - 1),
            Ok(_) => RangeSpec::Unsatisfiable,
            Err(_) => RangeSpec::Full,
        },
        (start, end) => match (start.parse::<u64>(), end.parse::<u64>()) {
            (Ok(s), Ok(e)) if s <= e && s < len => RangeSpec::Partial(s, e.min(len - 1)),
            (Ok(_), Ok(_)) => RangeSpec::Unsatisfiable,
            _ => RangeSpec::Full,
        },
    }
}

/// `GET /videos/{artifact_id}` handler. Cache-buster query parameters are
/// accepted and ignored.
pub async fn serve_video(
    State(state): State<AppState>,
    Path(artifact_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let received = Instant::now();
    let id = ArtifactId::from_string(artifact_id);

    let Some(artifact) = state.store.get(&id) else {
        metrics::record_video_request(404);
        return StatusCode::NOT_FOUND.into_response();
    };

    // Freshness gate: never send the first byte of a file that is still in
    // flight between the pipeline and stable storage.
    if state
        .store
        .confirm_stable(&id, READINESS_BUDGET)
        .await
        .is_err()
    {
        tracing::warn!(artifact = %id, "artifact not yet stable, telling client to retry");
        metrics::record_video_request(503);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::RETRY_AFTER, "0")],
        )
            .into_response();
    }

    let total = artifact.byte_size;
    if total == 0 {
        metrics::record_video_request(200);
        return (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, artifact.kind.content_type()),
                (header::ACCEPT_RANGES, "bytes"),
                (header::CACHE_CONTROL, "no-store"),
            ],
        )
            .into_response();
    }
    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());

    let (status, start, end) = match parse_range(range_header, total) {
        RangeSpec::Unsatisfiable => {
            metrics::record_video_request(416);
            return (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                    (header::CONTENT_RANGE, format!("bytes */{total}")),
                ],
            )
                .into_response();
        }
        RangeSpec::Full => (StatusCode::OK, 0, total - 1),
        RangeSpec::Partial(s, e) => (StatusCode::PARTIAL_CONTENT, s, e),
    };

    let stream = match state.store.open_range(&id, start, end).await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::error!(artifact = %id, %err, "failed to open artifact for range read");
            metrics::record_video_request(500);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let content_length = end - start + 1;
    let body = InstrumentedBody::new(stream, id.clone(), received, artifact.age(), content_length);
    metrics::record_video_request(status.as_u16());

    let mut response = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, artifact.kind.content_type())
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, "no-store")
        .header(header::CONTENT_LENGTH, content_length);

    if status == StatusCode::PARTIAL_CONTENT {
        response = response.header(
            header::CONTENT_RANGE,
            format!("bytes {start}-{end}/{total}"),
        );
    }

    match response.body(Body::from_stream(body)) {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(artifact = %id, %err, "failed to build video response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Body wrapper recording TTFB, bytes sent, and throughput. The final log
/// line lands in `Drop` so aborted downloads are accounted for too.
struct InstrumentedBody {
    inner: RangeStream,
    artifact: ArtifactId,
    received: Instant,
    first_byte: Option<Instant>,
    bytes_sent: u64,
    declared: u64,
    age: Duration,
}

impl InstrumentedBody {
    fn new(
        inner: RangeStream,
        artifact: ArtifactId,
        received: Instant,
        age: Duration,
        declared: u64,
    ) -> Self {
        Self {
            inner,
            artifact,
            received,
            first_byte: None,
            bytes_sent: 0,
            declared,
            age,
        }
    }
}

impl Stream for InstrumentedBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = Pin::new(&mut self.inner).poll_next(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            if self.first_byte.is_none() {
                let ttfb = self.received.elapsed();
                self.first_byte = Some(Instant::now());
                metrics::record_video_ttfb(ttfb.as_secs_f64());
            }
            self.bytes_sent += chunk.len() as u64;
        }
        polled
    }
}

impl Drop for InstrumentedBody {
    fn drop(&mut self) {
        let elapsed = self.received.elapsed().as_secs_f64();
        let throughput = if elapsed > 0.0 {
            self.bytes_sent as f64 / elapsed
        } else {
            0.0
        };
        metrics::record_video_throughput(throughput);

        tracing::info!(
            artifact = %self.artifact,
            bytes = self.bytes_sent,
            declared = self.declared,
            elapsed_s = elapsed,
            throughput_bps = throughput as u64,
            ttfb_ms = self.first_byte.map(|t| (t - self.received).as_millis() as u64),
            file_age_s = self.age.as_secs_f64(),
            complete = self.bytes_sent == self.declared,
            "video request finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_header_serves_full() {
        assert_eq!(parse_range(None, 100), RangeSpec::Full);
    }

    #[test]
    fn test_closed_range() {
        assert_eq!(parse_range(Some("bytes=0-49"), 100), RangeSpec::Partial(0, 49));
        assert_eq!(parse_range(Some("bytes=10-10"), 100), RangeSpec::Partial(10, 10));
    }

    #[test]
    fn test_open_ended_range() {
        assert_eq!(parse_range(Some("bytes=40-"), 100), RangeSpec::Partial(40, 99));
    }

    #[test]
    fn test_suffix_range() {
        assert_eq!(parse_range(Some("bytes=-10"), 100), RangeSpec::Partial(90, 99));
        assert_eq!(parse_range(Some("bytes=-200"), 100), RangeSpec::Partial(0, 99));
    }

    #[test]
    fn test_end_clamped_to_length() {
        assert_eq!(parse_range(Some("bytes=50-500"), 100), RangeSpec::Partial(50, 99));
    }

    #[test]
    fn test_unsatisfiable() {
        assert_eq!(parse_range(Some("bytes=100-"), 100), RangeSpec::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=200-300"), 100), RangeSpec::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=5-2"), 100), RangeSpec::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=-0"), 100), RangeSpec::Unsatisfiable);
    }

    #[test]
    fn test_malformed_ignored() {
        assert_eq!(parse_range(Some("frames=0-10"), 100), RangeSpec::Full);
        assert_eq!(parse_range(Some("bytes=abc-def"), 100), RangeSpec::Full);
        assert_eq!(parse_range(Some("bytes=0-10,20-30"), 100), RangeSpec::Full);
    }
}
