//! Folder service lifecycle and control surface.
//!
//! [`FolderService::serve`] resolves the folder path into blob storage and a
//! mountpoint, builds the block cache and the fetch coordinator, mounts the
//! FUSE view, spawns the download workers, and parks until shutdown. The
//! control-surface methods delegate to the coordinator once it exists and
//! return empty results before that — a folder that never served reports no
//! jobs rather than failing.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

use vfold_blobs_store::{BlockCache, Storage};
use vfold_common::{
    BlockHash, FileError, FolderEvent, FolderStatistics, IndexError, IndexProvider,
};

use crate::config::{resolve_folder_path, FolderConfig};
use crate::coordinator::{BlockPuller, FetchCoordinator};
use crate::error::{BlockLookupError, ServeError};
use crate::fuse::{self, FolderFs, InodeTable};

/// One virtual folder: lifecycle glue around cache, coordinator and mount.
pub struct FolderService {
    config: FolderConfig,
    index: Arc<dyn IndexProvider>,
    puller: Arc<dyn BlockPuller>,
    events: flume::Sender<FolderEvent>,
    /// Wakeups from the folder supervisor's pull scheduler. Consumed and
    /// ignored; scans are what actually feed the queue.
    pull_scheduled: flume::Receiver<()>,
    running: Mutex<Option<Arc<FetchCoordinator>>>,
}

impl FolderService {
    pub fn new(
        config: FolderConfig,
        index: Arc<dyn IndexProvider>,
        puller: Arc<dyn BlockPuller>,
        events: flume::Sender<FolderEvent>,
        pull_scheduled: flume::Receiver<()>,
    ) -> Self {
        Self {
            config,
            index,
            puller,
            events,
            pull_scheduled,
            running: Mutex::new(None),
        }
    }

    /// Run the folder until `shutdown` fires (or its sender is dropped).
    ///
    /// Configuration and mount problems fail startup and surface here; the
    /// folder supervisor decides whether to retry.
    pub async fn serve(&self, mut shutdown: watch::Receiver<()>) -> Result<(), ServeError> {
        let resolved = resolve_folder_path(&self.config.path)?;
        let storage = Storage::open(&resolved.storage).await?;
        let cache = BlockCache::new(storage);

        let coordinator = Arc::new(FetchCoordinator::new(
            self.config.id.clone(),
            self.config.order,
            cache,
            self.index.clone(),
            self.puller.clone(),
            self.events.clone(),
        ));
        *self.running.lock() = Some(coordinator.clone());

        let inodes = Arc::new(InodeTable::new());
        let fs = FolderFs::new(
            self.config.id.clone(),
            self.index.clone(),
            coordinator.clone(),
            inodes,
            tokio::runtime::Handle::current(),
        );
        let mount = fuse::mount(fs, &resolved.mount_point, &self.config.id, &self.config.label)?;

        let workers = coordinator.clone().spawn_workers(&shutdown);
        info!(
            folder = %self.config.id,
            mount_point = %resolved.mount_point.display(),
            "virtual folder serving"
        );

        let mut pull_scheduled_open = true;
        loop {
            if pull_scheduled_open {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    recv = self.pull_scheduled.recv_async() => {
                        // scheduling is driven by scans; the token only wakes us
                        if recv.is_err() {
                            pull_scheduled_open = false;
                        }
                    }
                }
            } else {
                let _ = shutdown.changed().await;
                break;
            }
        }

        // unmount before the cache and its backend go away
        mount.unmount();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(folder = %self.config.id, error = %e, "fetch worker exited abnormally");
            }
        }

        info!(folder = %self.config.id, "virtual folder stopped");
        Ok(())
    }

    /// Walk the index and queue whatever the local device still needs.
    /// Directories are adopted immediately; files go to the download queue.
    pub fn scan(&self, subs: &[String]) -> Result<(), IndexError> {
        match &*self.running.lock() {
            Some(coordinator) => coordinator.scan(subs),
            None => Ok(()),
        }
    }

    /// Queue a full scan.
    pub fn schedule_scan(&self) {
        if let Err(e) = self.scan(&[]) {
            warn!(folder = %self.config.id, error = %e, "scheduled scan failed");
        }
    }

    /// Paginated job listing: `(pending, in progress, total pending)`.
    pub fn jobs(&self, page: usize, per_page: usize) -> (Vec<String>, Vec<String>, usize) {
        match &*self.running.lock() {
            Some(coordinator) => coordinator.jobs(page, per_page),
            None => (Vec::new(), Vec::new(), 0),
        }
    }

    /// Move a pending download to the head of the queue.
    pub fn bring_to_front(&self, name: &str) {
        if let Some(coordinator) = &*self.running.lock() {
            coordinator.bring_to_front(name);
        }
    }

    /// Copy the cached block for `hash` into `out`, returning the number of
    /// bytes copied. A cache miss is [`BlockLookupError::NoSuchBlock`]; this
    /// lookup never triggers a download.
    pub async fn hash_block_data(
        &self,
        hash: &BlockHash,
        out: &mut [u8],
    ) -> Result<usize, BlockLookupError> {
        let coordinator = self.running.lock().clone();
        let Some(coordinator) = coordinator else {
            return Err(BlockLookupError::NoSuchBlock);
        };
        match coordinator.cached_block(hash).await? {
            Some(data) => {
                let n = out.len().min(data.len());
                out[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            None => Err(BlockLookupError::NoSuchBlock),
        }
    }

    pub fn statistics(&self) -> FolderStatistics {
        FolderStatistics::default()
    }

    pub fn errors(&self) -> Vec<FileError> {
        Vec::new()
    }

    /// Filesystem watching does not apply to a virtual folder.
    pub fn watch_error(&self) -> Option<String> {
        None
    }

    /// Local overrides have no meaning for a read-through folder.
    pub fn override_changes(&self) {}

    /// See [`override_changes`](Self::override_changes).
    pub fn revert_changes(&self) {}

    /// Scan delays are not used; scans run when scheduled.
    pub fn delay_scan(&self, _duration: std::time::Duration) {}

    /// Forced rescans of single paths fold into the next full scan.
    pub fn schedule_force_rescan(&self, _path: &str) {}
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;

    use vfold_common::{BlockInfo, FileInfo, MemIndex, PullOrder, Snapshot};

    use super::*;

    struct NoPuller;

    #[async_trait]
    impl BlockPuller for NoPuller {
        async fn pull_block(
            &self,
            _snapshot: &dyn Snapshot,
            _file: &FileInfo,
            _block: &BlockInfo,
        ) -> anyhow::Result<Bytes> {
            anyhow::bail!("unreachable in these tests")
        }
    }

    fn service(path: &str) -> FolderService {
        let (events, _) = flume::unbounded();
        let (_pull_tx, pull_rx) = flume::unbounded();
        FolderService::new(
            FolderConfig {
                id: "default".into(),
                label: String::new(),
                path: path.into(),
                order: PullOrder::Alphabetic,
            },
            Arc::new(MemIndex::new()),
            Arc::new(NoPuller),
            events,
            pull_rx,
        )
    }

    #[tokio::test]
    async fn serve_rejects_malformed_virtual_path() {
        let service = service(":virtual:mem://x");
        let (_tx, rx) = watch::channel(());
        let err = service.serve(rx).await.unwrap_err();
        assert!(matches!(err, ServeError::Config(_)));
    }

    #[tokio::test]
    async fn control_surface_is_empty_before_serving() {
        let service = service("/tmp/never-served");

        let (pending, in_progress, total) = service.jobs(1, 10);
        assert!(pending.is_empty());
        assert!(in_progress.is_empty());
        assert_eq!(total, 0);

        service.bring_to_front("anything");
        service.scan(&[]).unwrap();
        assert!(service.errors().is_empty());
        assert!(service.watch_error().is_none());

        let mut buf = [0u8; 8];
        let err = service
            .hash_block_data(&BlockHash::new(vec![0u8; 32]), &mut buf)
            .await
            .unwrap_err();
        assert!(matches!(err, BlockLookupError::NoSuchBlock));
    }

    #[tokio::test]
    async fn statistics_are_trivially_empty() {
        let service = service("/tmp/x");
        let stats = service.statistics();
        assert!(stats.last_file.is_none());
        assert!(stats.last_scan.is_none());
    }
}
