//! The read-only FUSE filesystem over index snapshots.
//!
//! Every operation that inspects the index takes a fresh snapshot on entry
//! and drops it before replying. Reads resolve to block lookups through the
//! injected [`BlockFetcher`]; a cache miss blocks the calling kernel thread
//! while the block is pulled, bridged into the async world via the stored
//! runtime handle.
//!
//! The mounted tree is strictly read-through: open refuses write access and
//! no mutating operation is implemented.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, Request,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use vfold_common::{FileInfo, IndexProvider, Snapshot};

use crate::coordinator::BlockFetcher;
use crate::fuse::inode_table::{file_name, join_path, parent_of, InodeTable, ROOT_INODE};

const TTL: Duration = Duration::from_secs(1);
const BLOCK_SIZE: u32 = 512;

/// One directory entry as handed to the kernel.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct DirEntry {
    pub inode: u64,
    pub is_directory: bool,
    pub name: String,
}

#[derive(Debug, Default)]
struct HandleTable {
    next_fh: u64,
    open: HashMap<u64, FileInfo>,
}

/// The `fuser::Filesystem` presenting one virtual folder.
pub struct FolderFs {
    folder_id: String,
    index: Arc<dyn IndexProvider>,
    fetcher: Arc<dyn BlockFetcher>,
    inodes: Arc<InodeTable>,
    handles: Mutex<HandleTable>,
    rt: tokio::runtime::Handle,
    uid: u32,
    gid: u32,
}

impl FolderFs {
    pub fn new(
        folder_id: String,
        index: Arc<dyn IndexProvider>,
        fetcher: Arc<dyn BlockFetcher>,
        inodes: Arc<InodeTable>,
        rt: tokio::runtime::Handle,
    ) -> Self {
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };
        Self {
            folder_id,
            index,
            fetcher,
            inodes,
            handles: Mutex::new(HandleTable::default()),
            rt,
            uid,
            gid,
        }
    }

    fn attr_for(&self, inode: u64, file: &FileInfo) -> FileAttr {
        let (kind, perm, nlink, size) = if file.is_directory {
            (FileType::Directory, 0o555, 2, 0)
        } else {
            (FileType::RegularFile, 0o444, 1, file.size)
        };
        FileAttr {
            ino: inode,
            size,
            blocks: size.div_ceil(u64::from(BLOCK_SIZE)),
            atime: file.mod_time,
            mtime: file.mod_time,
            ctime: file.mod_time,
            crtime: file.mod_time,
            kind,
            perm,
            nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    fn root_attr(&self) -> FileAttr {
        let root = FileInfo::directory("", SystemTime::UNIX_EPOCH);
        self.attr_for(ROOT_INODE, &root)
    }

    /// Resolve `parent/name` against a fresh snapshot.
    pub(crate) fn lookup_entry(&self, parent: u64, name: &str) -> Option<(u64, FileInfo)> {
        let parent_path = self.inodes.path_for(parent)?;
        let path = join_path(&parent_path, name);
        let snapshot = self.index.snapshot().ok()?;
        let file = snapshot.global(&path)?;
        Some((self.inodes.inode_for(&path), file))
    }

    /// Attributes for an inode, from a fresh snapshot.
    pub(crate) fn attr_entry(&self, inode: u64) -> Option<FileAttr> {
        if inode == ROOT_INODE {
            return Some(self.root_attr());
        }
        let path = self.inodes.path_for(inode)?;
        let snapshot = self.index.snapshot().ok()?;
        let file = snapshot.global(&path)?;
        Some(self.attr_for(inode, &file))
    }

    /// Directory listing for an inode, `.` and `..` included.
    pub(crate) fn dir_entries(&self, inode: u64) -> Option<Vec<DirEntry>> {
        let path = self.inodes.path_for(inode)?;
        let parent_inode = if inode == ROOT_INODE {
            ROOT_INODE
        } else {
            self.inodes.inode_for(parent_of(&path))
        };

        let mut entries = vec![
            DirEntry {
                inode,
                is_directory: true,
                name: ".".into(),
            },
            DirEntry {
                inode: parent_inode,
                is_directory: true,
                name: "..".into(),
            },
        ];

        let snapshot = self.index.snapshot().ok()?;
        snapshot.with_global(&mut |file| {
            if parent_of(&file.name) == path {
                entries.push(DirEntry {
                    inode: self.inodes.inode_for(&file.name),
                    is_directory: file.is_directory,
                    name: file_name(&file.name).to_string(),
                });
            }
            true
        });
        Some(entries)
    }

    /// Open an inode for reading, binding the handle to the `FileInfo`
    /// observed now. Returns the file handle or an errno.
    pub(crate) fn open_handle(&self, inode: u64, flags: i32) -> Result<u64, libc::c_int> {
        if flags & libc::O_ACCMODE != libc::O_RDONLY
            || flags & (libc::O_TRUNC | libc::O_APPEND) != 0
        {
            return Err(libc::EROFS);
        }

        let Some(path) = self.inodes.path_for(inode) else {
            return Err(libc::ENOENT);
        };
        let Ok(snapshot) = self.index.snapshot() else {
            return Err(libc::EIO);
        };
        let Some(file) = snapshot.global(&path) else {
            return Err(libc::ENOENT);
        };
        drop(snapshot);
        if file.is_directory {
            return Err(libc::EISDIR);
        }

        let mut handles = self.handles.lock();
        handles.next_fh += 1;
        let fh = handles.next_fh;
        handles.open.insert(fh, file);
        Ok(fh)
    }

    pub(crate) fn release_handle(&self, fh: u64) {
        self.handles.lock().open.remove(&fh);
    }

    /// Read `size` bytes at `offset`, pulling any missing blocks through the
    /// fetcher. All-or-nothing: one failed block fails the whole read.
    pub(crate) async fn read_bytes(
        &self,
        snapshot: &dyn Snapshot,
        file: &FileInfo,
        offset: u64,
        size: u32,
    ) -> Option<Vec<u8>> {
        if offset >= file.size {
            return Some(Vec::new());
        }
        let want = u64::from(size).min(file.size - offset);
        let end = offset + want;
        let mut out = vec![0u8; want as usize];

        for block in &file.blocks {
            let block_end = block.offset + u64::from(block.size);
            if block_end <= offset || block.offset >= end {
                continue;
            }

            let data = self.fetcher.fetch_block(snapshot, file, block).await?;
            if data.len() != block.size as usize {
                warn!(
                    folder = %self.folder_id,
                    file = %file.name,
                    hash = %block.hash,
                    expected = block.size,
                    got = data.len(),
                    "block length mismatch"
                );
                return None;
            }

            let copy_start = offset.max(block.offset);
            let copy_end = end.min(block_end);
            let src =
                &data[(copy_start - block.offset) as usize..(copy_end - block.offset) as usize];
            out[(copy_start - offset) as usize..(copy_end - offset) as usize]
                .copy_from_slice(src);
        }

        Some(out)
    }

    fn do_read(&self, fh: u64, offset: i64, size: u32) -> Result<Vec<u8>, libc::c_int> {
        let Some(file) = self.handles.lock().open.get(&fh).cloned() else {
            return Err(libc::EBADF);
        };
        let offset = u64::try_from(offset).map_err(|_| libc::EINVAL)?;

        let Ok(snapshot) = self.index.snapshot() else {
            return Err(libc::EIO);
        };
        let data = self
            .rt
            .block_on(self.read_bytes(snapshot.as_ref(), &file, offset, size));
        drop(snapshot);

        data.ok_or(libc::EIO)
    }
}

impl Filesystem for FolderFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.lookup_entry(parent, name) {
            Some((inode, file)) => reply.entry(&TTL, &self.attr_for(inode, &file), 0),
            None => reply.error(libc::ENOENT),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.attr_entry(ino) {
            Some(attr) => reply.attr(&TTL, &attr),
            None => reply.error(libc::ENOENT),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(entries) = self.dir_entries(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        for (i, entry) in entries.iter().enumerate().skip(offset as usize) {
            let kind = if entry.is_directory {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            if reply.add(entry.inode, (i + 1) as i64, kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.open_handle(ino, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.do_read(fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(errno) => {
                debug!(folder = %self.folder_id, ino, fh, offset, size, errno, "read failed");
                reply.error(errno);
            }
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.release_handle(fh);
        reply.ok();
    }
}
