//! Folder configuration and virtual-path resolution.

use std::path::PathBuf;

use vfold_blobs_store::StorageConfig;
use vfold_common::PullOrder;

use crate::error::ConfigError;

/// Static configuration for one virtual folder.
#[derive(Debug, Clone)]
pub struct FolderConfig {
    /// Folder identifier, shared with remote devices.
    pub id: String,
    /// Human-readable label, used for the mount name.
    pub label: String,
    /// Folder path: either a plain filesystem path, or a descriptor of the
    /// form `:virtual:<blob-url>:mount_at:<mountpoint>`.
    pub path: String,
    /// Order in which queued downloads are served.
    pub order: PullOrder,
}

/// Where a folder's blocks live and where its view is mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedPath {
    pub storage: StorageConfig,
    pub mount_point: PathBuf,
}

const VIRTUAL_PREFIX: &str = ":virtual:";
const MOUNT_AT: &str = ":mount_at:";

/// Resolve the folder path into a blob storage config and a mountpoint.
///
/// A `:virtual:` descriptor names both explicitly. A plain path defaults to
/// local blob storage next to it (`<path>_BlobStorage`) mounted at `<path>R`.
pub(crate) fn resolve_folder_path(path: &str) -> Result<ResolvedPath, ConfigError> {
    if let Some(descriptor) = path.strip_prefix(VIRTUAL_PREFIX) {
        let parts: Vec<&str> = descriptor.split(MOUNT_AT).collect();
        if parts.len() != 2 {
            return Err(ConfigError::MissingMountPoint);
        }
        Ok(ResolvedPath {
            storage: StorageConfig::parse(parts[0])?,
            mount_point: PathBuf::from(parts[1]),
        })
    } else {
        Ok(ResolvedPath {
            storage: StorageConfig::local(format!("{path}_BlobStorage")),
            mount_point: PathBuf::from(format!("{path}R")),
        })
    }
}
