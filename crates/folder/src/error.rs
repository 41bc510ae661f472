use std::path::PathBuf;

use vfold_blobs_store::StorageError;

/// Problems with the folder's configured path or blob URL. Fatal to folder
/// startup; the supervisor decides whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("virtual folder path is missing \":mount_at:\"")]
    MissingMountPoint,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Problems establishing the FUSE mount. Fatal to folder startup.
#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("failed to create mountpoint {}: {source}", path.display())]
    CreateMountpoint {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("fuse mount failed: {0}")]
    Mount(#[from] std::io::Error),
}

/// Errors surfacing from [`FolderService::serve`](crate::FolderService::serve).
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Mount(#[from] MountError),
}

/// Outcome of a direct block lookup through the control surface.
#[derive(Debug, thiserror::Error)]
pub enum BlockLookupError {
    /// The block is not in the cache. A lookup never triggers a download.
    #[error("no such block")]
    NoSuchBlock,
    #[error(transparent)]
    Storage(#[from] StorageError),
}
