//! SSE dispatcher
//!
//! Serializes one pipeline's events onto one response body. The dispatcher
//! owns the write half of a bounded channel; the receiver backs the HTTP
//! response, so each event is one body frame and nothing can hold an event
//! back in an application buffer.
//!
//! Within a session `seq` is dense (0, 1, 2, ...) in emission order and
//! `server_timestamp` is monotonic seconds since the stream opened. A
//! terminal event (`complete` or `error`) is the last successful emission;
//! emitting past it is an internal invariant violation.

use std::convert::Infallible;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use avatar_gateway_core::{Envelope, EventKind, GatewayError, TurnEvent, TurnId};
use avatar_gateway_pipeline::EventSink;

use crate::metrics;

/// One frame of the response body.
pub type SseFrame = Result<Bytes, Infallible>;

/// Write side of one turn's event stream.
///
/// Owned by exactly one pipeline task; `&mut self` on emit is what enforces
/// the single-writer rule.
pub struct SseDispatcher {
    turn_id: TurnId,
    tx: mpsc::Sender<SseFrame>,
    seq: u64,
    opened: Instant,
    terminated: bool,
    saw_first_chunk: bool,
}

impl SseDispatcher {
    /// Bind a new dispatcher to a turn. The returned stream becomes the
    /// response body.
    pub fn open(turn_id: TurnId, buffer: usize) -> (Self, ReceiverStream<SseFrame>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Self {
                turn_id,
                tx,
                seq: 0,
                opened: Instant::now(),
                terminated: false,
                saw_first_chunk: false,
            },
            ReceiverStream::new(rx),
        )
    }

    pub fn turn_id(&self) -> &TurnId {
        &self.turn_id
    }

    /// Encode one stamped event in SSE wire format:
    /// `event: <kind>\ndata: <json>\n\n`.
    fn encode(kind: EventKind, envelope: &Envelope<TurnEvent>) -> Result<Bytes, GatewayError> {
        let data = serde_json::to_string(envelope)
            .map_err(|e| GatewayError::Internal(format!("event serialization failed: {e}")))?;
        Ok(Bytes::from(format!("event: {kind}\ndata: {data}\n\n")))
    }
}

#[async_trait]
impl EventSink for SseDispatcher {
    async fn emit(&mut self, event: TurnEvent) -> Result<(), GatewayError> {
        if self.terminated {
            return Err(GatewayError::Internal(format!(
                "emit after terminal event on turn {}",
                self.turn_id
            )));
        }

        let kind = event.kind();
        let envelope = Envelope {
            seq: self.seq,
            server_timestamp: self.opened.elapsed().as_secs_f64(),
            payload: event,
        };

        // Stage metrics ride on the events that already carry the timings.
        match &envelope.payload {
            TurnEvent::Transcription(t) => metrics::record_asr_latency(t.time),
            TurnEvent::VideoChunk(c) => {
                metrics::record_chunk_generation(c.chunk_time);
                if !self.saw_first_chunk {
                    self.saw_first_chunk = true;
                    metrics::record_ttff(self.opened.elapsed().as_secs_f64());
                }
            }
            _ => {}
        }

        let frame = Self::encode(kind, &envelope)?;
        let bytes_written = frame.len();

        // A successful send is the write plus the flush: the frame leaves
        // the channel as one HTTP/2 DATA frame.
        self.tx
            .send(Ok(frame))
            .await
            .map_err(|_| GatewayError::ClientDisconnect)?;

        tracing::info!(
            turn = %self.turn_id,
            seq = self.seq,
            kind = %kind,
            wall_time = %chrono::Utc::now().to_rfc3339(),
            bytes = bytes_written,
            "sse event emitted"
        );
        metrics::record_event_emitted(kind.as_str());

        self.seq += 1;
        if kind.is_terminal() {
            self.terminated = true;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.terminated && !self.tx.is_closed()
    }
}
