//! Turn identity and lifecycle

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque turn identifier, unique within a process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(String);

impl TurnId {
    /// Allocate a fresh turn ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turn lifecycle phase.
///
/// Transitions are one-way except `Aborted`, which may be entered from any
/// non-terminal phase on client disconnect or cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Accepted,
    Transcribing,
    Reasoning,
    Streaming,
    Complete,
    Failed,
    Aborted,
}

impl TurnPhase {
    /// Is this a terminal phase?
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Transcribing => "transcribing",
            Self::Reasoning => "reasoning",
            Self::Streaming => "streaming",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_ids_unique() {
        let a = TurnId::new();
        let b = TurnId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_terminal_phases() {
        assert!(TurnPhase::Complete.is_terminal());
        assert!(TurnPhase::Failed.is_terminal());
        assert!(TurnPhase::Aborted.is_terminal());
        assert!(!TurnPhase::Streaming.is_terminal());
    }
}
