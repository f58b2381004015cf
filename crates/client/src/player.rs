//! Playback engine
//!
//! Drives a media element through the per-chunk reset-load-play cycle.
//! The loop is single-flight, waits out gaps between chunks, and exits only
//! once the queue is drained AND the stream has ended. There is no load
//! timeout: a slow chunk load is allowed to finish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::queue::{ChunkEntry, ChunkQueue};
use crate::sse::{ClientEvent, ReceivedEvent};

/// Media element failures, mirroring the HTML5 `MediaError` codes that
/// matter to the loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("source not supported")]
    SrcNotSupported,

    #[error("decode failed")]
    Decode,

    #[error("network error: {0}")]
    Network(String),

    #[error("load aborted")]
    Aborted,
}

/// The seam between the playback loop and whatever actually renders video.
#[async_trait]
pub trait MediaElement: Send + Sync {
    async fn pause(&self);

    /// Clear the element source and any nested source element.
    async fn clear_source(&self);

    async fn set_source(&self, url: &str);

    async fn load(&self);

    /// Resolves once the element can play (canplay / loadeddata) or fails.
    async fn await_ready(&self) -> Result<(), MediaError>;

    /// Play the current source to its end.
    async fn play_to_end(&self) -> Result<(), MediaError>;
}

/// Chunk playback state machine.
pub struct PlaybackEngine<M: MediaElement> {
    element: Arc<M>,
    queue: Mutex<ChunkQueue>,
    is_playing: AtomicBool,
    stream_complete: AtomicBool,
    idle_poll: Duration,
    reset_settle: Duration,
}

impl<M: MediaElement> PlaybackEngine<M> {
    pub fn new(element: Arc<M>) -> Self {
        Self {
            element,
            queue: Mutex::new(ChunkQueue::new()),
            is_playing: AtomicBool::new(false),
            stream_complete: AtomicBool::new(false),
            idle_poll: Duration::from_millis(100),
            reset_settle: Duration::from_millis(50),
        }
    }

    /// Shrink the loop's sleeps (tests).
    pub fn with_timing(mut self, idle_poll: Duration, reset_settle: Duration) -> Self {
        self.idle_poll = idle_poll;
        self.reset_settle = reset_settle;
        self
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::SeqCst)
    }

    pub fn is_stream_complete(&self) -> bool {
        self.stream_complete.load(Ordering::SeqCst)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Terminal event received. Playback is not force-exited; the loop
    /// drains what it has and then stops on its own.
    pub fn mark_stream_complete(&self) {
        self.stream_complete.store(true, Ordering::SeqCst);
    }

    pub fn enqueue(&self, entry: ChunkEntry) {
        self.queue.lock().push(entry);
    }

    /// The playback loop. Single-flight: a second concurrent call is a
    /// no-op.
    pub async fn play_queue(&self) {
        if self
            .is_playing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        loop {
            let next = self.queue.lock().pop_front();
            let Some(chunk) = next else {
                if self.stream_complete.load(Ordering::SeqCst) {
                    break;
                }
                // wait-for-next-chunk: the stream is still live
                tokio::time::sleep(self.idle_poll).await;
                continue;
            };

            self.reset_player().await;
            tokio::time::sleep(self.reset_settle).await;

            self.element.set_source(&chunk.url).await;
            self.element.load().await;

            match self.element.await_ready().await {
                Ok(()) => {
                    if let Err(err) = self.element.play_to_end().await {
                        tracing::warn!(index = chunk.index, %err, "playback error, skipping chunk");
                    }
                }
                Err(err) => {
                    tracing::warn!(index = chunk.index, %err, "media error, skipping chunk");
                }
            }
        }

        self.is_playing.store(false, Ordering::SeqCst);
    }

    /// Full reset between chunks. Breaks the previous chunk's network
    /// request; skipping any step shows up as frozen first frames or
    /// `MEDIA_ERR_SRC_NOT_SUPPORTED`.
    async fn reset_player(&self) {
        self.element.pause().await;
        self.element.clear_source().await;
        self.element.load().await;
    }
}

impl<M: MediaElement + 'static> PlaybackEngine<M> {
    /// Receive handler: enqueue chunks, kick the loop, track completion.
    /// The SSE reader stays open for the whole turn.
    pub fn handle_event(self: &Arc<Self>, event: &ReceivedEvent) {
        match &event.event {
            ClientEvent::VideoChunk(chunk) => {
                self.enqueue(ChunkEntry {
                    index: chunk.chunk_index,
                    url: chunk.video_url.clone(),
                    seq: event.seq,
                    server_timestamp: event.server_timestamp,
                    received_at: Instant::now(),
                });
                if chunk.chunk_index == 0 || self.is_playing() {
                    let engine = Arc::clone(self);
                    tokio::spawn(async move {
                        engine.play_queue().await;
                    });
                }
            }
            ClientEvent::Complete(_) | ClientEvent::Error(_) => {
                self.mark_stream_complete();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        Pause,
        ClearSource,
        SetSource(String),
        Load,
        Ready,
        Played(String),
    }

    #[derive(Default)]
    struct MockElement {
        ops: Mutex<Vec<Op>>,
        failing_urls: Mutex<HashMap<String, MediaError>>,
        play_delay: Option<Duration>,
        active_plays: AtomicUsize,
        max_concurrent_plays: AtomicUsize,
        current: Mutex<Option<String>>,
    }

    impl MockElement {
        fn ops(&self) -> Vec<Op> {
            self.ops.lock().clone()
        }

        fn played(&self) -> Vec<String> {
            self.ops()
                .into_iter()
                .filter_map(|op| match op {
                    Op::Played(url) => Some(url),
                    _ => None,
                })
                .collect()
        }

        fn fail_url(&self, url: &str, err: MediaError) {
            self.failing_urls.lock().insert(url.to_string(), err);
        }
    }

    #[async_trait]
    impl MediaElement for MockElement {
        async fn pause(&self) {
            self.ops.lock().push(Op::Pause);
        }

        async fn clear_source(&self) {
            *self.current.lock() = None;
            self.ops.lock().push(Op::ClearSource);
        }

        async fn set_source(&self, url: &str) {
            *self.current.lock() = Some(url.to_string());
            self.ops.lock().push(Op::SetSource(url.to_string()));
        }

        async fn load(&self) {
            self.ops.lock().push(Op::Load);
        }

        async fn await_ready(&self) -> Result<(), MediaError> {
            let current = self.current.lock().clone().unwrap_or_default();
            if let Some(err) = self.failing_urls.lock().get(&current) {
                return Err(err.clone());
            }
            self.ops.lock().push(Op::Ready);
            Ok(())
        }

        async fn play_to_end(&self) -> Result<(), MediaError> {
            let active = self.active_plays.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent_plays
                .fetch_max(active, Ordering::SeqCst);
            if let Some(delay) = self.play_delay {
                tokio::time::sleep(delay).await;
            }
            self.active_plays.fetch_sub(1, Ordering::SeqCst);

            let current = self.current.lock().clone().unwrap_or_default();
            self.ops.lock().push(Op::Played(current));
            Ok(())
        }
    }

    fn entry(index: u32) -> ChunkEntry {
        ChunkEntry {
            index,
            url: format!("/videos/{index}"),
            seq: index as u64 + 2,
            server_timestamp: index as f64,
            received_at: Instant::now(),
        }
    }

    fn fast_engine(element: Arc<MockElement>) -> PlaybackEngine<MockElement> {
        PlaybackEngine::new(element)
            .with_timing(Duration::from_millis(5), Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_plays_chunks_in_order() {
        let element = Arc::new(MockElement::default());
        let engine = fast_engine(element.clone());

        engine.enqueue(entry(0));
        engine.enqueue(entry(1));
        engine.mark_stream_complete();
        engine.play_queue().await;

        assert_eq!(element.played(), vec!["/videos/0", "/videos/1"]);
        assert!(!engine.is_playing());
    }

    #[tokio::test]
    async fn test_out_of_order_arrival_reordered() {
        let element = Arc::new(MockElement::default());
        let engine = fast_engine(element.clone());

        engine.enqueue(entry(2));
        engine.enqueue(entry(0));
        engine.enqueue(entry(1));
        engine.mark_stream_complete();
        engine.play_queue().await;

        assert_eq!(
            element.played(),
            vec!["/videos/0", "/videos/1", "/videos/2"]
        );
    }

    #[tokio::test]
    async fn test_reset_protocol_before_every_load() {
        let element = Arc::new(MockElement::default());
        let engine = fast_engine(element.clone());

        engine.enqueue(entry(0));
        engine.mark_stream_complete();
        engine.play_queue().await;

        let ops = element.ops();
        // pause, clear src, load (reset) then set src, load, ready, play
        assert_eq!(
            ops,
            vec![
                Op::Pause,
                Op::ClearSource,
                Op::Load,
                Op::SetSource("/videos/0".into()),
                Op::Load,
                Op::Ready,
                Op::Played("/videos/0".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_single_flight_loop() {
        let element = Arc::new(MockElement {
            play_delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        let engine = Arc::new(fast_engine(element.clone()));

        for i in 0..3 {
            engine.enqueue(entry(i));
        }
        engine.mark_stream_complete();

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.play_queue().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        // one loop ran; no chunk played twice, no overlap
        assert_eq!(element.played().len(), 3);
        assert_eq!(element.max_concurrent_plays.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_waits_for_late_chunks_until_stream_complete() {
        let element = Arc::new(MockElement::default());
        let engine = Arc::new(fast_engine(element.clone()));

        engine.enqueue(entry(0));
        let loop_task = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.play_queue().await })
        };

        // chunk 0 drains but the stream is still live: the loop must wait,
        // not exit
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!loop_task.is_finished());
        assert!(engine.is_playing());

        engine.enqueue(entry(1));
        tokio::time::sleep(Duration::from_millis(30)).await;
        engine.mark_stream_complete();
        loop_task.await.unwrap();

        assert_eq!(element.played(), vec!["/videos/0", "/videos/1"]);
        assert!(!engine.is_playing());
    }

    #[tokio::test]
    async fn test_media_error_skips_chunk_and_continues() {
        let element = Arc::new(MockElement::default());
        element.fail_url("/videos/1", MediaError::SrcNotSupported);
        let engine = fast_engine(element.clone());

        engine.enqueue(entry(0));
        engine.enqueue(entry(1));
        engine.enqueue(entry(2));
        engine.mark_stream_complete();
        engine.play_queue().await;

        assert_eq!(element.played(), vec!["/videos/0", "/videos/2"]);
    }

    #[tokio::test]
    async fn test_complete_does_not_force_exit() {
        let element = Arc::new(MockElement {
            play_delay: Some(Duration::from_millis(30)),
            ..Default::default()
        });
        let engine = Arc::new(fast_engine(element.clone()));

        engine.enqueue(entry(0));
        engine.enqueue(entry(1));
        let loop_task = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.play_queue().await })
        };

        // completion arrives mid-playback; remaining chunks still play
        tokio::time::sleep(Duration::from_millis(10)).await;
        engine.mark_stream_complete();
        loop_task.await.unwrap();

        assert_eq!(element.played(), vec!["/videos/0", "/videos/1"]);
    }
}
