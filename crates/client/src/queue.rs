//! Ordered chunk queue
//!
//! Entries normally arrive in index order under HTTP/2; the queue still
//! re-sorts on insert as defense in depth. Only the receive handler
//! enqueues and only the playback loop dequeues.

use std::collections::VecDeque;
use std::time::Instant;

/// One queued chunk on the playback side.
#[derive(Debug, Clone)]
pub struct ChunkEntry {
    pub index: u32,
    pub url: String,
    pub seq: u64,
    pub server_timestamp: f64,
    pub received_at: Instant,
}

/// Index-ordered chunk queue.
#[derive(Debug, Default)]
pub struct ChunkQueue {
    entries: VecDeque<ChunkEntry>,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append and restore index order.
    pub fn push(&mut self, entry: ChunkEntry) {
        self.entries.push_back(entry);
        self.entries
            .make_contiguous()
            .sort_by_key(|entry| entry.index);
    }

    pub fn pop_front(&mut self) -> Option<ChunkEntry> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
