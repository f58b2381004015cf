//! Artifact references
//!
//! Artifacts are immutable files owned by the asset store. Other components
//! hold non-owning `ArtifactId` references.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque artifact identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Allocate a fresh, process-unique artifact ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Wrap an ID received on the wire (e.g. from a video URL path).
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an artifact contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Audio,
    Video,
}

impl ArtifactKind {
    /// File extension used by the asset store.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Audio => "wav",
            Self::Video => "mp4",
        }
    }

    /// Content type served for this kind.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Audio => "audio/wav",
            Self::Video => "video/mp4",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_extensions() {
        assert_eq!(ArtifactKind::Audio.extension(), "wav");
        assert_eq!(ArtifactKind::Video.extension(), "mp4");
        assert_eq!(ArtifactKind::Video.content_type(), "video/mp4");
    }
}
