//! Core types for the avatar gateway
//!
//! This crate provides the vocabulary shared by all other crates:
//! - Turn and chunk identifiers and lifecycle
//! - Artifact references
//! - The closed SSE event set and payload schemas
//! - Dialogue history types
//! - The error taxonomy

pub mod artifact;
pub mod chunk;
pub mod dialogue;
pub mod error;
pub mod event;
pub mod turn;

pub use artifact::{ArtifactId, ArtifactKind};
pub use chunk::ChunkRecord;
pub use dialogue::{DialogueRole, DialogueTurn};
pub use error::{ErrorKind, GatewayError, Stage};
pub use event::{
    Complete, Envelope, ErrorEvent, EventKind, LlmResponse, Transcription, TurnEvent, VideoChunk,
};
pub use turn::{TurnId, TurnPhase};
