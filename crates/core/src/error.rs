//! Error taxonomy
//!
//! Every failure in the gateway maps onto one of a closed set of kinds.
//! The kind decides the recovery policy: LLM adapter failures are recovered
//! with a fallback response, artifact races are retried by the browser, and
//! everything else terminates the owning turn.

use thiserror::Error;

use crate::artifact::ArtifactId;

/// Inference pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Asr,
    Llm,
    Tts,
    LipSync,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asr => "asr",
            Self::Llm => "llm",
            Self::Tts => "tts",
            Self::LipSync => "lipsync",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified error kind, carried on the wire in `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    AdapterTimeout,
    AdapterFailure,
    ArtifactNotReady,
    Storage,
    ClientDisconnect,
    Internal,
}

impl ErrorKind {
    /// Wire name used in the `kind` field of `error` events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            // Timeouts and structured failures share one wire kind; the
            // human-readable message carries the distinction.
            Self::AdapterTimeout | Self::AdapterFailure => "adapter",
            Self::ArtifactNotReady => "not_ready",
            Self::Storage => "storage",
            Self::ClientDisconnect => "disconnect",
            Self::Internal => "internal",
        }
    }
}

/// Gateway error.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{stage} adapter timed out after {timeout_ms} ms")]
    AdapterTimeout { stage: Stage, timeout_ms: u64 },

    #[error("{stage} adapter failed: {message}")]
    AdapterFailure { stage: Stage, message: String },

    #[error("artifact {0} not ready")]
    ArtifactNotReady(ArtifactId),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("client disconnected")]
    ClientDisconnect,

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::AdapterTimeout { .. } => ErrorKind::AdapterTimeout,
            Self::AdapterFailure { .. } => ErrorKind::AdapterFailure,
            Self::ArtifactNotReady(_) => ErrorKind::ArtifactNotReady,
            Self::Storage(_) => ErrorKind::Storage,
            Self::ClientDisconnect => ErrorKind::ClientDisconnect,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Is this the one recoverable stage failure (LLM fallback policy)?
    pub fn is_recoverable_llm(&self) -> bool {
        matches!(
            self,
            Self::AdapterTimeout { stage: Stage::Llm, .. }
                | Self::AdapterFailure { stage: Stage::Llm, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_kinds() {
        let e = GatewayError::AdapterFailure {
            stage: Stage::LipSync,
            message: "engine crashed".into(),
        };
        assert_eq!(e.kind().as_str(), "adapter");

        let e = GatewayError::Storage("disk full".into());
        assert_eq!(e.kind().as_str(), "storage");

        let e = GatewayError::Internal("seq gap".into());
        assert_eq!(e.kind().as_str(), "internal");
    }

    #[test]
    fn test_llm_recovery_policy() {
        let llm = GatewayError::AdapterFailure {
            stage: Stage::Llm,
            message: "oom".into(),
        };
        assert!(llm.is_recoverable_llm());

        let tts = GatewayError::AdapterTimeout {
            stage: Stage::Tts,
            timeout_ms: 30_000,
        };
        assert!(!tts.is_recoverable_llm());
    }
}
