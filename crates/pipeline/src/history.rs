//! Dialogue history
//!
//! Process-wide, per-user history of user/assistant exchanges. Reads take a
//! snapshot before the turn starts; writes happen once, when the turn
//! completes. Aborted and failed turns leave no trace.

use parking_lot::Mutex;

use avatar_gateway_core::DialogueTurn;

/// Mutex-guarded dialogue history.
pub struct DialogueHistory {
    turns: Mutex<Vec<DialogueTurn>>,
    /// Maximum retained entries (user and assistant each count as one).
    max_entries: usize,
}

impl DialogueHistory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            turns: Mutex::new(Vec::new()),
            max_entries,
        }
    }

    /// Snapshot taken before a turn's LLM call.
    pub fn snapshot(&self) -> Vec<DialogueTurn> {
        self.turns.lock().clone()
    }

    /// Record a completed exchange.
    pub fn record_exchange(&self, user_text: &str, assistant_text: &str) {
        let mut turns = self.turns.lock();
        turns.push(DialogueTurn::user(user_text));
        turns.push(DialogueTurn::assistant(assistant_text));

        let excess = turns.len().saturating_sub(self.max_entries);
        if excess > 0 {
            turns.drain(..excess);
        }
    }

    pub fn len(&self) -> usize {
        self.turns.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.lock().is_empty()
    }

    pub fn clear(&self) {
        self.turns.lock().clear();
    }
}
