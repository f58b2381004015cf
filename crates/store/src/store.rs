//! Store implementation

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;
use futures::Stream;
use parking_lot::{Mutex, RwLock};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::watch;

use avatar_gateway_core::{ArtifactId, ArtifactKind};

use crate::StoreError;

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Immutable artifact metadata, captured at publish time.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: ArtifactId,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    /// Authoritative size; the file never changes after `put` returns.
    pub byte_size: u64,
    pub mtime: SystemTime,
    pub fsync_completed: bool,
}

impl Artifact {
    /// Age of the backing file.
    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.mtime)
            .unwrap_or(Duration::ZERO)
    }
}

struct Entry {
    artifact: Arc<Artifact>,
    /// None while the owning turn is live; set to a deadline once the turn
    /// reaches a terminal state.
    expires_at: Mutex<Option<Instant>>,
}

/// Byte stream returned by [`AssetStore::open_range`].
pub type RangeStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Filesystem-backed artifact store.
///
/// Writers always use fresh `{uuid}.{ext}` paths, so two writers never touch
/// the same file and published artifacts are immutable.
pub struct AssetStore {
    root: PathBuf,
    entries: RwLock<HashMap<ArtifactId, Entry>>,
    stable_poll: Duration,
    stable_budget: Duration,
}

impl AssetStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(
        root: impl AsRef<Path>,
        stable_poll: Duration,
        stable_budget: Duration,
    ) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            entries: RwLock::new(HashMap::new()),
            stable_poll,
            stable_budget,
        })
    }

    /// Write `bytes` as a new artifact.
    ///
    /// The data has been flushed and fsynced by the time this returns, so
    /// any later reader sees the complete file.
    pub async fn put(&self, bytes: &[u8], kind: ArtifactKind) -> Result<Arc<Artifact>, StoreError> {
        let id = ArtifactId::new();
        let path = self.root.join(format!("{}.{}", id, kind.extension()));

        let mut file = fs::File::create(&path)
            .await
            .map_err(StoreError::from_write_error)?;
        file.write_all(bytes)
            .await
            .map_err(StoreError::from_write_error)?;
        file.flush()
            .await
            .map_err(StoreError::from_write_error)?;
        file.sync_all()
            .await
            .map_err(StoreError::from_write_error)?;

        let meta = file.metadata().await?;
        let artifact = Arc::new(Artifact {
            id: id.clone(),
            kind,
            path,
            byte_size: meta.len(),
            mtime: meta.modified().unwrap_or_else(|_| SystemTime::now()),
            fsync_completed: true,
        });

        self.entries.write().insert(
            id.clone(),
            Entry {
                artifact: artifact.clone(),
                expires_at: Mutex::new(None),
            },
        );

        tracing::debug!(artifact = %id, kind = ?kind, bytes = meta.len(), "artifact published");
        Ok(artifact)
    }

    /// Look up a published artifact.
    pub fn get(&self, id: &ArtifactId) -> Option<Arc<Artifact>> {
        self.entries.read().get(id).map(|e| e.artifact.clone())
    }

    /// Confirm the artifact's file size is stable.
    ///
    /// Ok once two size samples taken >= one poll interval apart agree and
    /// the fsync at publish has completed. Artifacts written by this process
    /// pass on the first sample; the poll loop exists for readers racing a
    /// writer through a shared directory.
    pub async fn confirm_stable(&self, id: &ArtifactId, budget: Duration) -> Result<(), StoreError> {
        let artifact = self
            .get(id)
            .ok_or_else(|| StoreError::UnknownArtifact(id.clone()))?;

        let deadline = Instant::now() + budget;
        let mut previous: Option<u64> = None;

        loop {
            let size = fs::metadata(&artifact.path).await?.len();

            if artifact.fsync_completed && size == artifact.byte_size {
                return Ok(());
            }
            if artifact.fsync_completed && previous == Some(size) {
                return Ok(());
            }
            previous = Some(size);

            if Instant::now() >= deadline {
                return Err(StoreError::StabilityTimeout {
                    id: id.clone(),
                    budget_ms: budget.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.stable_poll).await;
        }
    }

    /// Confirm stability with the store's configured budget.
    pub async fn confirm_stable_default(&self, id: &ArtifactId) -> Result<(), StoreError> {
        self.confirm_stable(id, self.stable_budget).await
    }

    /// Open a read positioned for a `bytes=start-end` range response.
    ///
    /// Bounds are inclusive and validated against the at-publish size.
    pub async fn open_range(
        &self,
        id: &ArtifactId,
        start: u64,
        end: u64,
    ) -> Result<RangeStream, StoreError> {
        let artifact = self
            .get(id)
            .ok_or_else(|| StoreError::UnknownArtifact(id.clone()))?;

        if start > end || end >= artifact.byte_size {
            return Err(StoreError::RangeNotSatisfiable {
                start,
                end,
                len: artifact.byte_size,
            });
        }

        let mut file = fs::File::open(&artifact.path).await?;
        file.seek(SeekFrom::Start(start)).await?;
        let remaining = end - start + 1;

        let stream = futures::stream::try_unfold((file, remaining), |(mut file, remaining)| async move {
            if remaining == 0 {
                return Ok(None);
            }
            let want = remaining.min(READ_CHUNK_BYTES as u64) as usize;
            let mut buf = vec![0u8; want];
            let mut filled = 0;
            while filled < want {
                let n = file.read(&mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "artifact shorter than registered size",
                ));
            }
            buf.truncate(filled);
            Ok(Some((Bytes::from(buf), (file, remaining - filled as u64))))
        });

        Ok(Box::pin(stream))
    }

    /// Read an entire artifact (test and tooling convenience).
    pub async fn read_all(&self, id: &ArtifactId) -> Result<Vec<u8>, StoreError> {
        let artifact = self
            .get(id)
            .ok_or_else(|| StoreError::UnknownArtifact(id.clone()))?;
        Ok(fs::read(&artifact.path).await?)
    }

    /// Schedule an artifact for eviction `grace` from now.
    ///
    /// Called for every artifact of a turn once the turn reaches a terminal
    /// state; until then artifacts never expire.
    pub fn mark_expendable(&self, id: &ArtifactId, grace: Duration) {
        if let Some(entry) = self.entries.read().get(id) {
            let mut expires = entry.expires_at.lock();
            if expires.is_none() {
                *expires = Some(Instant::now() + grace);
            }
        }
    }

    /// Remove artifacts matching `predicate`. Returns how many were removed.
    pub async fn evict<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Artifact) -> bool,
    {
        let victims: Vec<Arc<Artifact>> = {
            let entries = self.entries.read();
            entries
                .values()
                .filter(|e| predicate(&e.artifact))
                .map(|e| e.artifact.clone())
                .collect()
        };

        let mut removed = 0;
        for artifact in victims {
            self.entries.write().remove(&artifact.id);
            match fs::remove_file(&artifact.path).await {
                Ok(()) => removed += 1,
                Err(err) => {
                    tracing::warn!(artifact = %artifact.id, %err, "failed to remove artifact file");
                }
            }
        }
        removed
    }

    /// Remove artifacts whose grace period has elapsed.
    pub async fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<ArtifactId> = {
            let entries = self.entries.read();
            entries
                .iter()
                .filter(|(_, e)| matches!(*e.expires_at.lock(), Some(deadline) if deadline <= now))
                .map(|(id, _)| id.clone())
                .collect()
        };

        let mut removed = 0;
        for id in expired {
            let entry = self.entries.write().remove(&id);
            if let Some(entry) = entry {
                if let Err(err) = fs::remove_file(&entry.artifact.path).await {
                    tracing::warn!(artifact = %id, %err, "failed to remove expired artifact");
                } else {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Number of live artifacts.
    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    /// Start a background task that periodically evicts expired artifacts.
    ///
    /// Returns a shutdown sender that stops the task.
    pub fn start_eviction_task(self: &Arc<Self>, interval: Duration) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let store = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.evict_expired().await;
                        if removed > 0 {
                            tracing::info!(removed, remaining = store.count(), "evicted expired artifacts");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("artifact eviction task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn test_store(dir: &tempfile::TempDir) -> AssetStore {
        AssetStore::open(
            dir.path(),
            Duration::from_millis(10),
            Duration::from_millis(500),
        )
        .await
        .unwrap()
    }

    async fn collect(stream: RangeStream) -> Vec<u8> {
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let artifact = store.put(b"mp4 bytes", ArtifactKind::Video).await.unwrap();
        assert_eq!(artifact.byte_size, 9);
        assert!(artifact.fsync_completed);
        assert!(artifact.path.extension().is_some_and(|e| e == "mp4"));

        let fetched = store.get(&artifact.id).unwrap();
        assert_eq!(fetched.byte_size, 9);
    }

    #[tokio::test]
    async fn test_unique_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let a = store.put(b"one", ArtifactKind::Audio).await.unwrap();
        let b = store.put(b"one", ArtifactKind::Audio).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.path, b.path);
    }

    #[tokio::test]
    async fn test_confirm_stable_after_put() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let artifact = store.put(b"stable", ArtifactKind::Video).await.unwrap();
        store
            .confirm_stable(&artifact.id, Duration::from_millis(100))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_confirm_stable_unknown_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let err = store
            .confirm_stable(&ArtifactId::new(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownArtifact(_)));
    }

    #[tokio::test]
    async fn test_open_range_full_and_partial() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let artifact = store
            .put(b"0123456789", ArtifactKind::Video)
            .await
            .unwrap();

        let full = collect(store.open_range(&artifact.id, 0, 9).await.unwrap()).await;
        assert_eq!(full, b"0123456789");

        let middle = collect(store.open_range(&artifact.id, 2, 5).await.unwrap()).await;
        assert_eq!(middle, b"2345");
    }

    #[tokio::test]
    async fn test_open_range_unsatisfiable() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let artifact = store.put(b"short", ArtifactKind::Video).await.unwrap();

        let err = match store.open_range(&artifact.id, 0, 5).await {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, StoreError::RangeNotSatisfiable { len: 5, .. }));

        let err = match store.open_range(&artifact.id, 3, 2).await {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, StoreError::RangeNotSatisfiable { .. }));
    }

    #[tokio::test]
    async fn test_repeated_reads_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let artifact = store.put(b"same bytes", ArtifactKind::Video).await.unwrap();
        let first = collect(store.open_range(&artifact.id, 0, 9).await.unwrap()).await;
        let second = collect(store.open_range(&artifact.id, 0, 9).await.unwrap()).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_eviction_respects_grace() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let live = store.put(b"live", ArtifactKind::Video).await.unwrap();
        let done = store.put(b"done", ArtifactKind::Video).await.unwrap();

        store.mark_expendable(&done.id, Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let removed = store.evict_expired().await;
        assert_eq!(removed, 1);
        assert!(store.get(&live.id).is_some());
        assert!(store.get(&done.id).is_none());
        assert!(!done.path.exists());
    }

    #[tokio::test]
    async fn test_evict_predicate() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        store.put(b"a", ArtifactKind::Audio).await.unwrap();
        store.put(b"v", ArtifactKind::Video).await.unwrap();

        let removed = store.evict(|a| a.kind == ArtifactKind::Audio).await;
        assert_eq!(removed, 1);
        assert_eq!(store.count(), 1);
    }
}
