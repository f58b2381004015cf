//! End-to-end tests: real server, real HTTP, canned engines
//!
//! Boots the gateway on a loopback port with canned inference engines and
//! drives whole turns through the client: multipart upload, SSE event
//! stream, and artifact range fetches.

use std::net::SocketAddr;
use std::sync::Arc;

use avatar_gateway_client::{ClientError, ClientEvent, GatewayClient};
use avatar_gateway_config::Settings;
use avatar_gateway_core::EventKind;
use avatar_gateway_inference::{CannedAsr, CannedLipSync, CannedLlm, CannedTts, Engines};
use avatar_gateway_server::{create_router, AppState};

async fn spawn_gateway(response_text: &str) -> (SocketAddr, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.asset_store.root_dir = dir.path().to_string_lossy().to_string();

    let engines = Engines {
        asr: Arc::new(CannedAsr::new("Say something interesting.", "en")),
        llm: Arc::new(CannedLlm::responding(response_text)),
        tts: Arc::new(CannedTts::new()),
        lipsync: Arc::new(CannedLipSync::new()),
    };

    let state = AppState::build(settings, engines).await.unwrap();
    state.set_models_loaded(true);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, dir)
}

async fn collect_events(
    client: &GatewayClient,
) -> Vec<avatar_gateway_client::ReceivedEvent> {
    let mut stream = client
        .stream_turn(b"pretend webm clip".to_vec(), "audio/webm", Some("en"))
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = stream.next_event().await {
        events.push(event.unwrap());
    }
    events
}

#[tokio::test]
async fn test_full_turn_over_http() {
    let (addr, _dir) = spawn_gateway("One; two; three.").await;
    let client = GatewayClient::new(&format!("http://{addr}")).unwrap();

    let events = collect_events(&client).await;

    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Transcription,
            EventKind::LlmResponse,
            EventKind::VideoChunk,
            EventKind::VideoChunk,
            EventKind::VideoChunk,
            EventKind::Complete,
        ]
    );

    // seq dense, timestamps monotonic
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4, 5]);
    for pair in events.windows(2) {
        assert!(pair[1].server_timestamp >= pair[0].server_timestamp);
    }

    // chunk indices dense from 0
    let indices: Vec<u32> = events
        .iter()
        .filter_map(|e| match &e.event {
            ClientEvent::VideoChunk(c) => Some(c.chunk_index),
            _ => None,
        })
        .collect();
    assert_eq!(indices, vec![0, 1, 2]);

    let ClientEvent::Complete(complete) = &events.last().unwrap().event else {
        panic!("stream must end with complete");
    };
    assert_eq!(complete.chunk_count, 3);
}

#[tokio::test]
async fn test_published_videos_fetchable_with_ranges() {
    let (addr, _dir) = spawn_gateway("Hello there. How are you today?").await;
    let client = GatewayClient::new(&format!("http://{addr}")).unwrap();
    let http = reqwest::Client::new();

    let events = collect_events(&client).await;
    let chunk = events
        .iter()
        .find_map(|e| match &e.event {
            ClientEvent::VideoChunk(c) => Some(c.clone()),
            _ => None,
        })
        .expect("at least one chunk");

    let url = client.video_url(&chunk.video_url);

    // full fetch
    let full = http.get(&url).send().await.unwrap();
    assert_eq!(full.status(), 200);
    assert_eq!(
        full.headers().get("accept-ranges").unwrap(),
        "bytes"
    );
    assert_eq!(
        full.headers().get("cache-control").unwrap(),
        "no-store"
    );
    assert_eq!(
        full.headers().get("content-type").unwrap(),
        "video/mp4"
    );
    let body = full.bytes().await.unwrap();
    assert!(!body.is_empty());

    // fetched twice, byte-identical
    let again = http.get(&url).send().await.unwrap().bytes().await.unwrap();
    assert_eq!(body, again);

    // range fetch
    let partial = http
        .get(&url)
        .header("Range", "bytes=0-9")
        .send()
        .await
        .unwrap();
    assert_eq!(partial.status(), 206);
    let content_range = partial
        .headers()
        .get("content-range")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(content_range, format!("bytes 0-9/{}", body.len()));
    let partial_body = partial.bytes().await.unwrap();
    assert_eq!(&partial_body[..], &body[..10]);

    // unsatisfiable range
    let bad = http
        .get(&url)
        .header("Range", format!("bytes={}-", body.len()))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), 416);

    // cache-buster query params are ignored
    let busted = http
        .get(format!("{url}?t=12345"))
        .send()
        .await
        .unwrap();
    assert_eq!(busted.status(), 200);
}

#[tokio::test]
async fn test_unknown_video_is_404() {
    let (addr, _dir) = spawn_gateway("Anything.").await;
    let http = reqwest::Client::new();

    let response = http
        .get(format!("http://{addr}/videos/nonexistent"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_invalid_input_rejected_before_any_sse() {
    let (addr, _dir) = spawn_gateway("Anything.").await;
    let client = GatewayClient::new(&format!("http://{addr}")).unwrap();

    // unsupported language
    let err = client
        .stream_turn(b"clip".to_vec(), "audio/webm", Some("xx"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 400, .. }));

    // missing audio field entirely
    let http = reqwest::Client::new();
    let form = reqwest::multipart::Form::new().text("language", "en");
    let response = http
        .post(format!("http://{addr}/conversation/stream"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // wrong container
    let err = client
        .stream_turn(b"clip".to_vec(), "text/plain", Some("en"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 400, .. }));
}

#[tokio::test]
async fn test_health_reports_models_loaded() {
    let (addr, _dir) = spawn_gateway("Anything.").await;
    let client = GatewayClient::new(&format!("http://{addr}")).unwrap();

    let health = client.health().await.unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["models_loaded"], true);
}

#[tokio::test]
async fn test_speak_single_shot() {
    let (addr, _dir) = spawn_gateway("Anything.").await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("http://{addr}/speak"))
        .json(&serde_json::json!({ "text": "Hello from the gateway.", "language": "en" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    let video_url = body["video_url"].as_str().unwrap();
    assert!(video_url.starts_with("/videos/"));

    let video = http
        .get(format!("http://{addr}{video_url}"))
        .send()
        .await
        .unwrap();
    assert_eq!(video.status(), 200);
}
