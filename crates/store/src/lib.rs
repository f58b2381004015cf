//! Asset store for generated audio/video artifacts
//!
//! A filesystem-backed store with the durability contract the streaming
//! pipeline depends on: a `put` that has flushed and fsynced before it
//! returns, a stable-size confirmation primitive, range-positioned reads,
//! and eviction.

mod store;

pub use store::{Artifact, AssetStore, RangeStream};

use avatar_gateway_core::ArtifactId;
use thiserror::Error;

/// Asset store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage full")]
    StorageFull(#[source] std::io::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown artifact: {0}")]
    UnknownArtifact(ArtifactId),

    #[error("artifact {id} not size-stable within {budget_ms} ms")]
    StabilityTimeout { id: ArtifactId, budget_ms: u64 },

    #[error("range {start}-{end} not satisfiable for {len} byte artifact")]
    RangeNotSatisfiable { start: u64, end: u64, len: u64 },
}

impl StoreError {
    fn from_write_error(err: std::io::Error) -> Self {
        if err.raw_os_error() == Some(28) {
            // ENOSPC
            Self::StorageFull(err)
        } else {
            Self::Io(err)
        }
    }
}
