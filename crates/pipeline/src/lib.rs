//! Turn pipeline
//!
//! Drives one user turn end to end: speech recognition, dialogue response,
//! utterance chunking, and the per-chunk synthesis loop, publishing events
//! through an [`EventSink`] in strict order.

pub mod chunker;
pub mod history;
mod turn;

pub use chunker::split;
pub use history::DialogueHistory;
pub use turn::{Clip, TurnOutcome, TurnPipeline, TurnRequest};

use async_trait::async_trait;

use avatar_gateway_core::{GatewayError, TurnEvent};

/// Where pipeline events go.
///
/// The server binds this to the SSE dispatcher; tests collect events in
/// memory. A sink is owned by exactly one turn and is never shared across
/// tasks.
#[async_trait]
pub trait EventSink: Send {
    /// Emit one event in order.
    ///
    /// Returns `ClientDisconnect` when the consumer is gone; the pipeline
    /// treats that as cancellation.
    async fn emit(&mut self, event: TurnEvent) -> Result<(), GatewayError>;

    /// Cheap connectivity probe checked at stage boundaries, so the
    /// pipeline can stop before starting expensive work.
    fn is_open(&self) -> bool;
}
