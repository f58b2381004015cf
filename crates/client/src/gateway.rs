//! Gateway HTTP client
//!
//! Uploads a voice clip and exposes the turn's SSE stream as typed events.
//! The reader stays open until the server ends the stream; closing it
//! early (e.g. after the first chunk) silently drops every later chunk.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::multipart;

use crate::player::{MediaElement, PlaybackEngine};
use crate::sse::{decode_frame, ReceivedEvent, SseParser};
use crate::ClientError;

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Typed event stream over one turn's response body.
pub struct EventStream {
    bytes: ByteStream,
    parser: SseParser,
    pending: VecDeque<ReceivedEvent>,
    ended: bool,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("pending", &self.pending)
            .field("ended", &self.ended)
            .finish()
    }
}

impl EventStream {
    fn new(bytes: ByteStream) -> Self {
        Self {
            bytes,
            parser: SseParser::new(),
            pending: VecDeque::new(),
            ended: false,
        }
    }

    /// Next event, or None at end of stream.
    pub async fn next_event(&mut self) -> Option<Result<ReceivedEvent, ClientError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.ended {
                return None;
            }

            match self.bytes.next().await {
                Some(Ok(chunk)) => {
                    let frames = match self.parser.push(&chunk) {
                        Ok(frames) => frames,
                        Err(err) => return Some(Err(err)),
                    };
                    for frame in &frames {
                        match decode_frame(frame) {
                            Ok(event) => self.pending.push_back(event),
                            Err(err) => return Some(Err(err)),
                        }
                    }
                }
                Some(Err(err)) => return Some(Err(ClientError::Transport(err))),
                None => self.ended = true,
            }
        }
    }
}

/// Client for one gateway instance.
pub struct GatewayClient {
    base_url: String,
    client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder().build()?,
        })
    }

    /// Upload a voice clip and open the turn's event stream.
    pub async fn stream_turn(
        &self,
        audio: Vec<u8>,
        content_type: &str,
        language: Option<&str>,
    ) -> Result<EventStream, ClientError> {
        let part = multipart::Part::bytes(audio)
            .file_name("clip")
            .mime_str(content_type)?;
        let mut form = multipart::Form::new().part("audio", part);
        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }

        let response = self
            .client
            .post(format!("{}/conversation/stream", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(EventStream::new(Box::pin(response.bytes_stream())))
    }

    /// Gateway health probe.
    pub async fn health(&self) -> Result<serde_json::Value, ClientError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(response.json().await?)
    }

    /// Absolute URL for a relative video path from a `video_chunk` event.
    pub fn video_url(&self, relative: &str) -> String {
        format!("{}{}", self.base_url, relative)
    }
}

/// Pump a turn's events into a playback engine until the stream ends,
/// returning everything received. The stream is read to the very end; the
/// terminal event only marks completion, playback drains on its own.
pub async fn pump_events<M: MediaElement + 'static>(
    mut stream: EventStream,
    engine: &Arc<PlaybackEngine<M>>,
) -> Result<Vec<ReceivedEvent>, ClientError> {
    let mut received = Vec::new();
    while let Some(event) = stream.next_event().await {
        let event = event?;
        engine.handle_event(&event);
        received.push(event);
    }
    Ok(received)
}
