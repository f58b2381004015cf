//! Live turn registry
//!
//! Tracks turns with an open SSE stream, for the active-turns gauge and the
//! readiness endpoint. A turn appears here between upload acceptance and
//! its terminal phase.

use std::collections::HashMap;

use parking_lot::RwLock;

use avatar_gateway_core::{TurnId, TurnPhase};

use crate::metrics;

/// Registry of in-flight turns.
#[derive(Default)]
pub struct TurnRegistry {
    active: RwLock<HashMap<TurnId, TurnPhase>>,
}

impl TurnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an accepted turn.
    pub fn begin(&self, turn_id: TurnId) {
        let mut active = self.active.write();
        active.insert(turn_id, TurnPhase::Accepted);
        metrics::record_active_turns(active.len());
    }

    /// Remove a turn that reached a terminal phase.
    pub fn finish(&self, turn_id: &TurnId, phase: TurnPhase) {
        let mut active = self.active.write();
        active.remove(turn_id);
        metrics::record_active_turns(active.len());
        drop(active);

        let label = match phase {
            TurnPhase::Complete => "complete",
            TurnPhase::Failed => "failed",
            _ => "aborted",
        };
        metrics::record_turn_finished(label);
    }

    /// Number of turns with a live stream.
    pub fn count(&self) -> usize {
        self.active.read().len()
    }
}
