//! Playback client
//!
//! The consumer side of the gateway: an SSE reader over the turn stream, an
//! ordered chunk queue, and a playback engine that drives a media element
//! through the reset-load-play cycle. The engine mirrors the browser player
//! so its state machine is testable off-browser; a thin wasm or native
//! shell only has to implement [`MediaElement`].

pub mod gateway;
pub mod player;
pub mod queue;
pub mod sse;

pub use gateway::{pump_events, EventStream, GatewayClient};
pub use player::{MediaElement, MediaError, PlaybackEngine};
pub use queue::{ChunkEntry, ChunkQueue};
pub use sse::{ClientEvent, RawFrame, ReceivedEvent, SseParser};

use thiserror::Error;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed event stream: {0}")]
    Protocol(String),
}
