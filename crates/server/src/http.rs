//! HTTP Endpoints
//!
//! The transport surface: voice upload to SSE stream, artifact delivery,
//! single-shot synthesis, asset listings, and probes.

use std::time::Instant;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use avatar_gateway_core::TurnId;
use avatar_gateway_pipeline::TurnRequest;

use crate::metrics;
use crate::sse::SseDispatcher;
use crate::state::AppState;
use crate::videos;
use crate::ServerError;

/// Events buffered between the pipeline and a slow client before
/// back-pressure reaches the pipeline.
const EVENT_BUFFER: usize = 32;

/// Audio containers accepted on upload. Browsers append codec parameters,
/// so these are matched as prefixes.
const ACCEPTED_AUDIO_TYPES: &[&str] = &[
    "audio/webm",
    "audio/wav",
    "audio/x-wav",
    "audio/wave",
    "audio/ogg",
    "application/octet-stream",
];

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let max_upload = state.settings.server.max_upload_bytes;
    let cors_enabled = state.settings.server.cors_enabled;
    let cors_origins = state.settings.server.cors_origins.clone();

    let mut router = Router::new()
        // Conversation
        .route("/conversation/stream", post(conversation_stream))
        .route("/speak", post(speak))

        // Artifact delivery
        .route("/videos/:artifact_id", get(videos::serve_video))

        // Reference assets
        .route("/assets/portraits", get(list_portraits))
        .route("/assets/voices", get(list_voices))

        // Probes
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_handler))

        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_upload + 64 * 1024));

    if cors_enabled {
        let cors = if cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };
        router = router.layer(cors);
    }

    router.with_state(state)
}

/// Root service info
async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "avatar-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "mode": state.settings.mode,
    }))
}

/// Health check
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let models_loaded = state.are_models_loaded();
    Json(serde_json::json!({
        "status": if models_loaded { "healthy" } else { "initializing" },
        "models_loaded": models_loaded,
        "active_turns": state.turns.count(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn is_accepted_audio_type(content_type: &str) -> bool {
    ACCEPTED_AUDIO_TYPES
        .iter()
        .any(|accepted| content_type.starts_with(accepted))
}

/// Voice upload: multipart `audio` (+ optional `language`) in, SSE turn
/// stream out. Input problems surface as HTTP 4xx before any event.
async fn conversation_stream(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ServerError> {
    let mut audio: Option<Bytes> = None;
    let mut language: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::InvalidRequest(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("audio") => {
                if let Some(content_type) = field.content_type() {
                    if !is_accepted_audio_type(content_type) {
                        return Err(ServerError::InvalidRequest(format!(
                            "unsupported audio container: {content_type}"
                        )));
                    }
                }
                audio = Some(field.bytes().await.map_err(|e| {
                    ServerError::InvalidRequest(format!("failed to read audio field: {e}"))
                })?);
            }
            Some("language") => {
                language = field
                    .text()
                    .await
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
            }
            _ => {}
        }
    }

    let audio = audio.ok_or_else(|| ServerError::InvalidRequest("missing audio field".into()))?;
    if audio.is_empty() {
        return Err(ServerError::InvalidRequest("empty audio upload".into()));
    }
    if audio.len() > state.settings.server.max_upload_bytes {
        return Err(ServerError::PayloadTooLarge);
    }

    let language = language.unwrap_or_else(|| "en".to_string());
    ensure_supported_language(&state, &language)?;

    let turn_id = TurnId::new();
    tracing::info!(
        turn = %turn_id,
        bytes = audio.len(),
        language = %language,
        "accepted voice upload"
    );

    let (mut dispatcher, frames) = SseDispatcher::open(turn_id.clone(), EVENT_BUFFER);
    let request = TurnRequest {
        turn_id: turn_id.clone(),
        audio,
        language_hint: Some(language),
        portrait_ref: state.settings.assets.default_portrait.clone(),
        voice_ref: state.settings.assets.default_voice.clone(),
    };

    state.turns.begin(turn_id.clone());
    let pipeline = state.pipeline.clone();
    let turns = state.turns.clone();
    tokio::spawn(async move {
        let outcome = pipeline.run_turn(request, &mut dispatcher).await;
        turns.finish(&outcome.turn_id, outcome.phase);
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-store")
        .header("x-turn-id", turn_id.as_str())
        .body(Body::from_stream(frames))
        .map_err(|e| ServerError::Internal(e.to_string()))
}

fn ensure_supported_language(state: &AppState, language: &str) -> Result<(), ServerError> {
    if state
        .settings
        .server
        .supported_languages
        .iter()
        .any(|l| l == language)
    {
        Ok(())
    } else {
        Err(ServerError::InvalidRequest(format!(
            "unsupported language: {language}; use one of {:?}",
            state.settings.server.supported_languages
        )))
    }
}

/// Single-shot synthesis request
#[derive(Debug, Deserialize)]
struct SpeakRequest {
    text: String,
    #[serde(default = "default_language")]
    language: String,
    portrait: Option<String>,
    voice: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

/// Single-shot synthesis response
#[derive(Debug, Serialize)]
struct SpeakResponse {
    video_url: String,
    audio_duration_s: f64,
    video_duration_s: f64,
    generation_ms: u64,
}

/// Text to one lip-synced clip, no chunking or streaming.
async fn speak(
    State(state): State<AppState>,
    Json(request): Json<SpeakRequest>,
) -> Result<Json<SpeakResponse>, ServerError> {
    if request.text.trim().is_empty() {
        return Err(ServerError::InvalidRequest("empty text".into()));
    }
    ensure_supported_language(&state, &request.language)?;

    let portrait = request
        .portrait
        .unwrap_or_else(|| state.settings.assets.default_portrait.clone());
    let voice = request
        .voice
        .unwrap_or_else(|| state.settings.assets.default_voice.clone());

    let started = Instant::now();
    let clip = state
        .pipeline
        .render_utterance(&request.text, &request.language, &portrait, &voice)
        .await
        .map_err(|err| {
            tracing::error!(%err, "single-shot synthesis failed");
            ServerError::from(err)
        })?;

    Ok(Json(SpeakResponse {
        video_url: format!("/videos/{}", clip.video_id),
        audio_duration_s: clip.audio_duration_s,
        video_duration_s: clip.video_duration_s,
        generation_ms: started.elapsed().as_millis() as u64,
    }))
}

/// List available reference portraits
async fn list_portraits(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let files = list_files(
        &state.settings.assets.portraits_dir,
        &["jpg", "jpeg", "png"],
    )
    .await?;
    Ok(Json(serde_json::json!({ "portraits": files })))
}

/// List available reference voice samples
async fn list_voices(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let files = list_files(&state.settings.assets.voices_dir, &["wav", "mp3"]).await?;
    Ok(Json(serde_json::json!({ "voices": files })))
}

async fn list_files(dir: &str, extensions: &[&str]) -> Result<Vec<String>, ServerError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        // A missing asset directory is an empty gallery, not a failure.
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(ServerError::Internal(err.to_string())),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
    {
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(ext) = name.rsplit('.').next() {
            if extensions.contains(&ext.to_ascii_lowercase().as_str()) {
                files.push(name);
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatar_gateway_config::Settings;
    use avatar_gateway_inference::Engines;

    #[tokio::test]
    async fn test_router_creation() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.asset_store.root_dir = dir.path().to_string_lossy().to_string();

        let state = AppState::build(settings, Engines::canned_default())
            .await
            .unwrap();
        let _ = create_router(state);
    }

    #[test]
    fn test_accepted_audio_types() {
        assert!(is_accepted_audio_type("audio/webm"));
        assert!(is_accepted_audio_type("audio/webm;codecs=opus"));
        assert!(is_accepted_audio_type("audio/wav"));
        assert!(is_accepted_audio_type("audio/ogg"));
        assert!(!is_accepted_audio_type("video/mp4"));
        assert!(!is_accepted_audio_type("text/plain"));
    }

    #[tokio::test]
    async fn test_list_files_missing_dir_is_empty() {
        let files = list_files("/nonexistent/portraits", &["jpg"]).await.unwrap();
        assert!(files.is_empty());
    }
}
