//! The fetch coordinator: schedules and executes block downloads.
//!
//! Files are downloaded by a fixed pool of workers draining the
//! [`JobQueue`]. Workers sleep on a capacity-1 wakeup channel; any number of
//! enqueues collapse into one token, and the drain loop picks up whatever
//! accumulated. A popped job is processed to completion (or failure) before
//! the worker draws another.
//!
//! Per job, every block of the file goes through the cache-or-pull path. The
//! local index entry is published only when all blocks are confirmed present
//! in the cache; a partially fetched file is simply dropped and rediscovered
//! by the next scan.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use vfold_blobs_store::{BlockCache, StorageError};
use vfold_common::{
    BlockHash, BlockInfo, DeviceId, FileInfo, FolderEvent, IndexError, IndexProvider, PullOrder,
    Snapshot,
};

use crate::queue::JobQueue;

/// Fixed fan-out of download workers per folder.
const FETCH_WORKERS: usize = 4;

/// The replication capability: fetch one block's bytes from the network.
///
/// Implementations verify the payload against `block.hash` before returning;
/// the cache stores whatever it is handed without re-checking.
#[async_trait]
pub trait BlockPuller: Send + Sync {
    async fn pull_block(
        &self,
        snapshot: &dyn Snapshot,
        file: &FileInfo,
        block: &BlockInfo,
    ) -> anyhow::Result<Bytes>;
}

/// Narrow fetch capability handed to the FUSE adapter.
///
/// The adapter never holds the coordinator (or the folder service) directly;
/// this one-way handle is all it needs to resolve a read.
#[async_trait]
pub trait BlockFetcher: Send + Sync {
    /// Cache-through block fetch. `None` on terminal failure.
    async fn fetch_block(
        &self,
        snapshot: &dyn Snapshot,
        file: &FileInfo,
        block: &BlockInfo,
    ) -> Option<Bytes>;
}

/// Deduplicating download scheduler plus its worker pool.
pub struct FetchCoordinator {
    folder_id: String,
    order: PullOrder,
    cache: BlockCache,
    index: Arc<dyn IndexProvider>,
    puller: Arc<dyn BlockPuller>,
    events: flume::Sender<FolderEvent>,
    queue: JobQueue,
    wakeup_tx: flume::Sender<()>,
    wakeup_rx: flume::Receiver<()>,
}

impl FetchCoordinator {
    pub fn new(
        folder_id: String,
        order: PullOrder,
        cache: BlockCache,
        index: Arc<dyn IndexProvider>,
        puller: Arc<dyn BlockPuller>,
        events: flume::Sender<FolderEvent>,
    ) -> Self {
        let (wakeup_tx, wakeup_rx) = flume::bounded(1);
        Self {
            folder_id,
            order,
            cache,
            index,
            puller,
            events,
            queue: JobQueue::new(),
            wakeup_tx,
            wakeup_rx,
        }
    }

    /// Queue `name` for background download unless it is already pending or
    /// in progress. Idempotent for duplicates.
    pub fn request_background_download(&self, name: &str, size: u64, mod_time: SystemTime) {
        if !self.queue.push_if_new(name, size, mod_time) {
            return;
        }
        self.queue.sort(self.order);
        // capacity-1 channel: a full buffer already means "wake up"
        let _ = self.wakeup_tx.try_send(());
    }

    /// Cache-through block fetch: cache hit, or a single pull stored back
    /// into the cache. `None` on terminal failure — the caller decides
    /// whether that fails a read or drops a job.
    pub async fn block_from_cache_or_pull(
        &self,
        snapshot: &dyn Snapshot,
        file: &FileInfo,
        block: &BlockInfo,
    ) -> Option<Bytes> {
        match self.cache.get(&block.hash).await {
            Ok(Some(data)) => return Some(data),
            Ok(None) => {}
            Err(e) => {
                warn!(folder = %self.folder_id, hash = %block.hash, error = %e, "block cache read failed");
                return None;
            }
        }

        let data = match self.puller.pull_block(snapshot, file, block).await {
            Ok(data) => data,
            Err(e) => {
                debug!(folder = %self.folder_id, file = %file.name, hash = %block.hash, error = %e, "block pull failed");
                return None;
            }
        };

        // Concurrent pullers of the same block may race here; the writes
        // carry equal bytes, so the last one wins harmlessly.
        if let Err(e) = self.cache.put(&block.hash, data.clone()).await {
            warn!(folder = %self.folder_id, hash = %block.hash, error = %e, "block cache write failed");
            return None;
        }

        Some(data)
    }

    /// Direct cache lookup by hash. Never triggers a download.
    pub async fn cached_block(&self, hash: &BlockHash) -> Result<Option<Bytes>, StorageError> {
        self.cache.get(hash).await
    }

    /// Paginated job listing: `(pending, in progress, total pending)`.
    pub fn jobs(&self, page: usize, per_page: usize) -> (Vec<String>, Vec<String>, usize) {
        self.queue.jobs(page, per_page)
    }

    /// Move a pending job to the head of the queue.
    pub fn bring_to_front(&self, name: &str) {
        self.queue.bring_to_front(name);
    }

    /// Walk the index for entries the local device still needs. Directories
    /// carry no block data and are adopted on the spot; files are queued for
    /// background download.
    pub fn scan(&self, _subs: &[String]) -> Result<(), IndexError> {
        let snapshot = self.index.snapshot()?;
        snapshot.with_need(DeviceId::LOCAL, &mut |needed| {
            if needed.is_directory {
                if let Some(file) = snapshot.global(&needed.name) {
                    self.index.update_one(DeviceId::LOCAL, &file);
                }
            } else {
                self.request_background_download(&needed.name, needed.size, needed.mod_time);
            }
            true
        });
        Ok(())
    }

    /// Spawn the worker pool. Workers stop when `shutdown` fires or its
    /// sender is dropped; queued jobs are left in place for a later restart.
    pub fn spawn_workers(self: Arc<Self>, shutdown: &watch::Receiver<()>) -> Vec<JoinHandle<()>> {
        (0..FETCH_WORKERS)
            .map(|worker| {
                let coordinator = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(coordinator.worker_loop(worker, shutdown))
            })
            .collect()
    }

    async fn worker_loop(self: Arc<Self>, worker: usize, mut shutdown: watch::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    trace!(folder = %self.folder_id, worker, "fetch worker stopping");
                    return;
                }
                recv = self.wakeup_rx.recv_async() => {
                    if recv.is_err() {
                        return;
                    }
                }
            }

            while let Some(job) = self.queue.pop() {
                self.process_job(&job.name).await;
                self.queue.done(&job.name);
                if shutdown.has_changed().unwrap_or(true) {
                    return;
                }
            }
        }
    }

    async fn process_job(&self, name: &str) {
        let Ok(snapshot) = self.index.snapshot() else {
            return;
        };
        let Some(file) = snapshot.global(name) else {
            // gone from the global index since it was queued
            return;
        };

        let mut all_ok = true;
        for block in &file.blocks {
            all_ok &= self
                .block_from_cache_or_pull(snapshot.as_ref(), &file, block)
                .await
                .is_some();
        }

        if !all_ok {
            debug!(folder = %self.folder_id, file = %name, "dropping job after failed block fetch");
            return;
        }

        self.index.update_one(DeviceId::LOCAL, &file);
        let sequence = self.index.sequence(DeviceId::LOCAL);
        let _ = self.events.send(FolderEvent::LocalIndexUpdated {
            folder: self.folder_id.clone(),
            items: 1,
            filenames: vec![file.name.clone()],
            sequence,
            version: sequence,
        });
    }
}

#[async_trait]
impl BlockFetcher for FetchCoordinator {
    async fn fetch_block(
        &self,
        snapshot: &dyn Snapshot,
        file: &FileInfo,
        block: &BlockInfo,
    ) -> Option<Bytes> {
        self.block_from_cache_or_pull(snapshot, file, block).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use vfold_blobs_store::{Storage, StorageConfig};
    use vfold_common::MemIndex;

    use super::*;

    #[derive(Default)]
    struct FakePuller {
        blocks: HashMap<String, Bytes>,
        calls: AtomicUsize,
    }

    impl FakePuller {
        fn with_block(mut self, hash: &BlockHash, data: &'static [u8]) -> Self {
            self.blocks.insert(hash.to_hex(), Bytes::from_static(data));
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BlockPuller for FakePuller {
        async fn pull_block(
            &self,
            _snapshot: &dyn Snapshot,
            _file: &FileInfo,
            block: &BlockInfo,
        ) -> anyhow::Result<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.blocks
                .get(&block.hash.to_hex())
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no route to block"))
        }
    }

    async fn mem_cache() -> BlockCache {
        let storage = Storage::open(&StorageConfig::parse("mem://coordinator-tests").unwrap())
            .await
            .unwrap();
        BlockCache::new(storage)
    }

    fn coordinator(
        cache: BlockCache,
        index: MemIndex,
        puller: Arc<FakePuller>,
    ) -> FetchCoordinator {
        // send errors on a dropped receiver are ignored by the coordinator
        let (events, _) = flume::unbounded();
        FetchCoordinator::new(
            "default".into(),
            PullOrder::Alphabetic,
            cache,
            Arc::new(index),
            puller,
            events,
        )
    }

    fn block(offset: u64, size: u32, seed: u8) -> BlockInfo {
        BlockInfo {
            offset,
            size,
            hash: BlockHash::new(vec![seed; 32]),
        }
    }

    #[tokio::test]
    async fn wakeup_tokens_collapse() {
        let puller = Arc::new(FakePuller::default());
        let coordinator = coordinator(mem_cache().await, MemIndex::new(), puller);

        for name in ["a", "b", "c", "d"] {
            coordinator.request_background_download(name, 1, SystemTime::UNIX_EPOCH);
        }

        // four enqueues, at most one token buffered
        assert_eq!(coordinator.wakeup_rx.len(), 1);

        // duplicates do not enqueue and do not signal
        coordinator.wakeup_rx.try_recv().unwrap();
        coordinator.request_background_download("a", 1, SystemTime::UNIX_EPOCH);
        assert_eq!(coordinator.wakeup_rx.len(), 0);
    }

    #[tokio::test]
    async fn cached_block_never_pulls() {
        let puller = Arc::new(FakePuller::default());
        let coordinator = coordinator(mem_cache().await, MemIndex::new(), puller.clone());

        let hash = BlockHash::new(vec![0x55; 32]);
        let missing = coordinator.cached_block(&hash).await.unwrap();
        assert!(missing.is_none());
        assert_eq!(puller.calls(), 0);
    }

    #[tokio::test]
    async fn cache_hit_skips_the_network() {
        let info = block(0, 5, 0x01);
        let puller = Arc::new(FakePuller::default().with_block(&info.hash, b"bytes"));
        let cache = mem_cache().await;
        cache.put(&info.hash, Bytes::from_static(b"bytes")).await.unwrap();

        let index = MemIndex::new();
        let file = FileInfo::file("f", 5, SystemTime::UNIX_EPOCH, vec![info.clone()]);
        index.insert_global(file.clone());

        let coordinator = coordinator(cache, index.clone(), puller.clone());
        let snapshot = index.snapshot().unwrap();

        let data = coordinator
            .block_from_cache_or_pull(snapshot.as_ref(), &file, &info)
            .await
            .unwrap();
        assert_eq!(data.as_ref(), b"bytes");
        assert_eq!(puller.calls(), 0);
    }

    #[tokio::test]
    async fn cache_miss_pulls_once_and_stores() {
        let info = block(0, 5, 0x02);
        let puller = Arc::new(FakePuller::default().with_block(&info.hash, b"bytes"));
        let cache = mem_cache().await;

        let index = MemIndex::new();
        let file = FileInfo::file("f", 5, SystemTime::UNIX_EPOCH, vec![info.clone()]);
        index.insert_global(file.clone());

        let coordinator = coordinator(cache.clone(), index.clone(), puller.clone());
        let snapshot = index.snapshot().unwrap();

        let data = coordinator
            .block_from_cache_or_pull(snapshot.as_ref(), &file, &info)
            .await
            .unwrap();
        assert_eq!(data.as_ref(), b"bytes");
        assert_eq!(puller.calls(), 1);

        // stored: a second fetch is served from the cache
        let again = coordinator
            .block_from_cache_or_pull(snapshot.as_ref(), &file, &info)
            .await
            .unwrap();
        assert_eq!(again.as_ref(), b"bytes");
        assert_eq!(puller.calls(), 1);
        assert!(cache.get(&info.hash).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn pull_failure_is_terminal_not_retried() {
        let info = block(0, 5, 0x03);
        let puller = Arc::new(FakePuller::default()); // knows no blocks
        let index = MemIndex::new();
        let file = FileInfo::file("f", 5, SystemTime::UNIX_EPOCH, vec![info.clone()]);
        index.insert_global(file.clone());

        let coordinator = coordinator(mem_cache().await, index.clone(), puller.clone());
        let snapshot = index.snapshot().unwrap();

        let data = coordinator
            .block_from_cache_or_pull(snapshot.as_ref(), &file, &info)
            .await;
        assert!(data.is_none());
        assert_eq!(puller.calls(), 1);
    }

    #[tokio::test]
    async fn scan_adopts_directories_and_queues_files() {
        let index = MemIndex::new();
        index.insert_global(FileInfo::directory("photos", SystemTime::UNIX_EPOCH));
        index.insert_global(FileInfo::file(
            "photos/cat.jpg",
            4,
            SystemTime::UNIX_EPOCH,
            vec![block(0, 4, 0x04)],
        ));

        let puller = Arc::new(FakePuller::default());
        let coordinator = coordinator(mem_cache().await, index.clone(), puller);

        coordinator.scan(&[]).unwrap();

        // the directory is local already, no download needed
        assert!(index.have(DeviceId::LOCAL, "photos").is_some());
        let (pending, in_progress, total) = coordinator.jobs(1, 100);
        assert_eq!(pending, vec!["photos/cat.jpg".to_string()]);
        assert!(in_progress.is_empty());
        assert_eq!(total, 1);
    }
}
