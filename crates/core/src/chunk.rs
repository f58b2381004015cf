//! Chunk records
//!
//! One chunk is one unit of the streamed response: a text fragment plus the
//! audio and video artifacts derived from it.

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactId;
use crate::turn::TurnId;

/// Record of one generated chunk within a turn.
///
/// `index` is 0-based and strictly monotonic within the turn. The record is
/// created only after the chunk's video artifact has been confirmed stable,
/// so holding a `ChunkRecord` implies the chunk is publishable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub turn_id: TurnId,
    pub index: u32,
    /// The fragment spoken in this chunk.
    pub text: String,
    pub audio_artifact: ArtifactId,
    pub video_artifact: ArtifactId,
    /// Seconds from turn start when generation of this chunk began.
    pub generation_start_s: f64,
    /// Seconds from turn start when generation of this chunk finished.
    pub generation_end_s: f64,
    pub audio_duration_s: f64,
    pub video_duration_s: f64,
}

impl ChunkRecord {
    /// Character count of the fragment, used only for chunker decisions.
    pub fn text_duration_hint(&self) -> usize {
        self.text.chars().count()
    }

    /// Wall time spent generating this chunk.
    pub fn generation_secs(&self) -> f64 {
        self.generation_end_s - self.generation_start_s
    }
}
