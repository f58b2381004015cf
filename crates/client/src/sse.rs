//! SSE wire parsing
//!
//! Incremental parser for `text/event-stream` frames plus typed decoding of
//! the gateway's event set. Frames may arrive split across arbitrary read
//! boundaries; the parser buffers until a blank line completes a frame.

use avatar_gateway_core::{
    Complete, Envelope, ErrorEvent, EventKind, LlmResponse, Transcription, VideoChunk,
};

use crate::ClientError;

/// One wire frame before typed decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub event: String,
    pub data: String,
}

/// A decoded, stamped event.
#[derive(Debug, Clone)]
pub struct ReceivedEvent {
    pub kind: EventKind,
    pub seq: u64,
    pub server_timestamp: f64,
    pub event: ClientEvent,
}

/// Typed payloads on the receive side.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Transcription(Transcription),
    LlmResponse(LlmResponse),
    VideoChunk(VideoChunk),
    Complete(Complete),
    Error(ErrorEvent),
}

/// Incremental SSE frame parser.
#[derive(Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns every frame completed by this read.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<RawFrame>, ClientError> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = find_frame_end(&self.buffer) {
            let frame_bytes: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            let text = std::str::from_utf8(&frame_bytes)
                .map_err(|e| ClientError::Protocol(format!("non-utf8 frame: {e}")))?;
            if let Some(frame) = parse_frame(text) {
                frames.push(frame);
            }
        }
        Ok(frames)
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

/// Parse one frame's lines. Comment lines and unknown fields are ignored;
/// multiple `data:` lines join with newlines, matching EventSource.
fn parse_frame(text: &str) -> Option<RawFrame> {
    let mut event = String::new();
    let mut data_lines = Vec::new();

    for line in text.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event = value.strip_prefix(' ').unwrap_or(value).to_string();
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if event.is_empty() && data_lines.is_empty() {
        return None;
    }
    Some(RawFrame {
        event,
        data: data_lines.join("\n"),
    })
}

/// Decode a raw frame into a stamped, typed event.
pub fn decode_frame(frame: &RawFrame) -> Result<ReceivedEvent, ClientError> {
    let kind = EventKind::parse(&frame.event)
        .ok_or_else(|| ClientError::Protocol(format!("unknown event kind: {}", frame.event)))?;

    fn envelope<T: serde::de::DeserializeOwned>(
        data: &str,
    ) -> Result<Envelope<T>, ClientError> {
        serde_json::from_str(data)
            .map_err(|e| ClientError::Protocol(format!("bad event payload: {e}")))
    }

    let (seq, server_timestamp, event) = match kind {
        EventKind::Transcription => {
            let env = envelope::<Transcription>(&frame.data)?;
            (env.seq, env.server_timestamp, ClientEvent::Transcription(env.payload))
        }
        EventKind::LlmResponse => {
            let env = envelope::<LlmResponse>(&frame.data)?;
            (env.seq, env.server_timestamp, ClientEvent::LlmResponse(env.payload))
        }
        EventKind::VideoChunk => {
            let env = envelope::<VideoChunk>(&frame.data)?;
            (env.seq, env.server_timestamp, ClientEvent::VideoChunk(env.payload))
        }
        EventKind::Complete => {
            let env = envelope::<Complete>(&frame.data)?;
            (env.seq, env.server_timestamp, ClientEvent::Complete(env.payload))
        }
        EventKind::Error => {
            let env = envelope::<ErrorEvent>(&frame.data)?;
            (env.seq, env.server_timestamp, ClientEvent::Error(env.payload))
        }
    };

    Ok(ReceivedEvent {
        kind,
        seq,
        server_timestamp,
        event,
    })
}
