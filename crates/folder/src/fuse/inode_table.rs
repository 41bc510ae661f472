//! Inode ↔ path binding for the mounted view.
//!
//! FUSE refers to files by 64-bit inode numbers. Paths here are index-style
//! relative paths (`photos/cat.jpg`); the root is the empty string and is
//! pinned to inode 1. Allocation is strictly monotonic and inodes are never
//! reassigned or reused for the lifetime of the table; inode 0 stays
//! reserved. One lock covers both maps and the counter.

use std::collections::HashMap;

use parking_lot::Mutex;

/// The root directory's inode. Fixed at 1, as FUSE expects.
pub const ROOT_INODE: u64 = 1;

#[derive(Debug)]
struct Tables {
    by_path: HashMap<String, u64>,
    by_inode: HashMap<u64, String>,
    next: u64,
}

/// Bidirectional inode table with stable, monotonic allocation.
#[derive(Debug)]
pub struct InodeTable {
    tables: Mutex<Tables>,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let mut by_path = HashMap::new();
        let mut by_inode = HashMap::new();
        by_path.insert(String::new(), ROOT_INODE);
        by_inode.insert(ROOT_INODE, String::new());
        Self {
            tables: Mutex::new(Tables {
                by_path,
                by_inode,
                next: ROOT_INODE + 1,
            }),
        }
    }

    /// The inode bound to `path`, allocating the next number on first sight.
    pub fn inode_for(&self, path: &str) -> u64 {
        let mut tables = self.tables.lock();
        if let Some(&inode) = tables.by_path.get(path) {
            return inode;
        }
        let inode = tables.next;
        tables.next += 1;
        tables.by_path.insert(path.to_string(), inode);
        tables.by_inode.insert(inode, path.to_string());
        inode
    }

    /// The path bound to `inode`, if the inode has been handed out.
    pub fn path_for(&self, inode: u64) -> Option<String> {
        self.tables.lock().by_inode.get(&inode).cloned()
    }
}

/// Join an index-style parent path and an entry name.
pub(crate) fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Parent of an index-style path; the empty string for top-level entries.
pub(crate) fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// Final component of an index-style path.
pub(crate) fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[pos + 1..],
        None => path,
    }
}
