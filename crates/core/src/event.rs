//! SSE event set
//!
//! The closed set of events a turn can emit, and their payload schemas.
//! The event kind travels on the SSE `event:` line; the payload is the JSON
//! on the `data:` line. The dispatcher stamps every payload with `seq` and
//! `server_timestamp` via [`Envelope`].

use serde::{Deserialize, Serialize};

/// Event kind, as written on the `event:` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Transcription,
    LlmResponse,
    VideoChunk,
    Complete,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transcription => "transcription",
            Self::LlmResponse => "llm_response",
            Self::VideoChunk => "video_chunk",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// Terminal events end the stream; nothing may follow them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "transcription" => Some(Self::Transcription),
            "llm_response" => Some(Self::LlmResponse),
            "video_chunk" => Some(Self::VideoChunk),
            "complete" => Some(Self::Complete),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `transcription` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub language: String,
    /// ASR wall time in seconds.
    pub time: f64,
}

/// `llm_response` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
}

/// `video_chunk` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoChunk {
    /// 0-based, strictly increasing within the turn.
    pub chunk_index: u32,
    /// Relative URL the client fetches the artifact from.
    pub video_url: String,
    pub text_chunk: String,
    /// Generation wall time in seconds.
    pub chunk_time: f64,
    pub audio_duration_s: f64,
    pub video_duration_s: f64,
}

/// `complete` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complete {
    pub total_time: f64,
    pub chunk_count: u32,
}

/// `error` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Human-readable description.
    pub error: String,
    /// Wire name from the error taxonomy.
    pub kind: String,
}

/// One turn event, payload only (unstamped).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TurnEvent {
    Transcription(Transcription),
    LlmResponse(LlmResponse),
    VideoChunk(VideoChunk),
    Complete(Complete),
    Error(ErrorEvent),
}

impl TurnEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Transcription(_) => EventKind::Transcription,
            Self::LlmResponse(_) => EventKind::LlmResponse,
            Self::VideoChunk(_) => EventKind::VideoChunk,
            Self::Complete(_) => EventKind::Complete,
            Self::Error(_) => EventKind::Error,
        }
    }
}

/// Stamped wrapper the dispatcher serializes onto the `data:` line.
///
/// `seq` is dense per turn starting at 0; `server_timestamp` is monotonic
/// seconds since the stream opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub seq: u64,
    pub server_timestamp: f64,
    #[serde(flatten)]
    pub payload: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            EventKind::Transcription,
            EventKind::LlmResponse,
            EventKind::VideoChunk,
            EventKind::Complete,
            EventKind::Error,
        ] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("heartbeat"), None);
    }

    #[test]
    fn test_envelope_flattens_payload() {
        let env = Envelope {
            seq: 3,
            server_timestamp: 1.25,
            payload: Complete {
                total_time: 12.5,
                chunk_count: 4,
            },
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["seq"], 3);
        assert_eq!(json["server_timestamp"], 1.25);
        assert_eq!(json["total_time"], 12.5);
        assert_eq!(json["chunk_count"], 4);
    }

    #[test]
    fn test_turn_event_serializes_payload_only() {
        let event = TurnEvent::VideoChunk(VideoChunk {
            chunk_index: 0,
            video_url: "/videos/abc".into(),
            text_chunk: "Hi there.".into(),
            chunk_time: 4.2,
            audio_duration_s: 1.1,
            video_duration_s: 1.1,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["chunk_index"], 0);
        assert!(json.get("type").is_none());
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(EventKind::Complete.is_terminal());
        assert!(EventKind::Error.is_terminal());
        assert!(!EventKind::VideoChunk.is_terminal());
    }
}
