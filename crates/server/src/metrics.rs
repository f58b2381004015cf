//! Observability Metrics
//!
//! Prometheus metrics endpoint and recording helpers.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

use crate::state::AppState;

/// Global Prometheus handle
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize metrics recorder
///
/// Must be called once at startup before recording any metrics.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_default_metrics();

    METRICS_HANDLE.get_or_init(|| handle.clone());
    handle
}

/// Get the global metrics handle
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Register default application metrics
fn register_default_metrics() {
    gauge!("avatar_gateway_turns_active").set(0.0);
    counter!("avatar_gateway_turns_total", "phase" => "complete").absolute(0);
    counter!("avatar_gateway_turns_total", "phase" => "failed").absolute(0);
    counter!("avatar_gateway_turns_total", "phase" => "aborted").absolute(0);

    counter!("avatar_gateway_events_emitted_total", "kind" => "transcription").absolute(0);
    counter!("avatar_gateway_events_emitted_total", "kind" => "video_chunk").absolute(0);

    histogram!("avatar_gateway_ttff_seconds").record(0.0);
    histogram!("avatar_gateway_asr_duration_seconds").record(0.0);
    histogram!("avatar_gateway_chunk_generation_seconds").record(0.0);

    counter!("avatar_gateway_video_requests_total", "status" => "200").absolute(0);
    histogram!("avatar_gateway_video_ttfb_seconds").record(0.0);
    histogram!("avatar_gateway_video_throughput_bytes_per_second").record(0.0);
}

/// Record active turns gauge
pub fn record_active_turns(count: usize) {
    gauge!("avatar_gateway_turns_active").set(count as f64);
}

/// Record a finished turn by terminal phase
pub fn record_turn_finished(phase: &'static str) {
    counter!("avatar_gateway_turns_total", "phase" => phase).increment(1);
}

/// Record one emitted SSE event
pub fn record_event_emitted(kind: &'static str) {
    counter!("avatar_gateway_events_emitted_total", "kind" => kind).increment(1);
}

/// Record time to first frame for a turn
pub fn record_ttff(duration_secs: f64) {
    histogram!("avatar_gateway_ttff_seconds").record(duration_secs);
}

/// Record ASR latency
pub fn record_asr_latency(duration_secs: f64) {
    histogram!("avatar_gateway_asr_duration_seconds").record(duration_secs);
}

/// Record one chunk's generation wall time
pub fn record_chunk_generation(duration_secs: f64) {
    histogram!("avatar_gateway_chunk_generation_seconds").record(duration_secs);
}

/// Record a video request by response status
pub fn record_video_request(status: u16) {
    let status: &'static str = match status {
        200 => "200",
        206 => "206",
        404 => "404",
        416 => "416",
        503 => "503",
        _ => "other",
    };
    counter!("avatar_gateway_video_requests_total", "status" => status).increment(1);
}

/// Record video time-to-first-byte
pub fn record_video_ttfb(duration_secs: f64) {
    histogram!("avatar_gateway_video_ttfb_seconds").record(duration_secs);
}

/// Record effective video delivery throughput
pub fn record_video_throughput(bytes_per_second: f64) {
    histogram!("avatar_gateway_video_throughput_bytes_per_second").record(bytes_per_second);
}

/// Metrics endpoint handler
///
/// Returns Prometheus-formatted metrics.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    record_active_turns(state.turns.count());

    match get_metrics_handle() {
        Some(handle) => {
            let metrics = handle.render();
            (
                StatusCode::OK,
                [(
                    header::CONTENT_TYPE,
                    "text/plain; version=0.0.4; charset=utf-8",
                )],
                metrics,
            )
                .into_response()
        }
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response(),
    }
}
