//! Mount session management.

use std::path::{Path, PathBuf};

use fuser::MountOption;
use tracing::info;

use crate::error::MountError;
use crate::fuse::adapter::FolderFs;

/// A live FUSE mount. Dropping (or [`unmount`](Self::unmount)ing) tears the
/// session down; the folder service unmounts before it releases the backend.
pub(crate) struct FolderMount {
    session: Option<fuser::BackgroundSession>,
    mount_point: PathBuf,
}

/// Mount `fs` at `mount_point`, creating the directory if needed.
pub(crate) fn mount(
    fs: FolderFs,
    mount_point: &Path,
    folder_id: &str,
    label: &str,
) -> Result<FolderMount, MountError> {
    std::fs::create_dir_all(mount_point).map_err(|source| MountError::CreateMountpoint {
        path: mount_point.to_path_buf(),
        source,
    })?;

    let name = if label.is_empty() { folder_id } else { label };
    let options = [
        MountOption::RO,
        MountOption::FSName(format!("vfold:{name}")),
        MountOption::DefaultPermissions,
    ];
    let session = fuser::spawn_mount2(fs, mount_point, &options)?;

    info!(folder = %folder_id, mount_point = %mount_point.display(), "mounted virtual folder");
    Ok(FolderMount {
        session: Some(session),
        mount_point: mount_point.to_path_buf(),
    })
}

impl FolderMount {
    /// Tear the mount down and wait for the session thread to finish.
    pub(crate) fn unmount(mut self) {
        if let Some(session) = self.session.take() {
            info!(mount_point = %self.mount_point.display(), "unmounting virtual folder");
            session.join();
        }
    }
}

impl Drop for FolderMount {
    fn drop(&mut self) {
        // dropping the session unmounts without waiting for the thread
        self.session.take();
    }
}
