//! Core data model: block hashes, block layout, and file records.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Content hash identifying a single block.
///
/// The hash bytes are opaque to this crate; the replication layer picks the
/// hash function and verifies block payloads against it before they reach
/// the cache. Storage backends encode the bytes as lowercase hex.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHash(Vec<u8>);

impl BlockHash {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex rendering, used as the storage key for every backend.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self.to_hex())
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<&[u8]> for BlockHash {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for BlockHash {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// One block of a file's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    /// Byte offset of this block within the file.
    pub offset: u64,
    /// Length of this block in bytes.
    pub size: u32,
    /// Content hash of the block's bytes.
    pub hash: BlockHash,
}

/// Immutable snapshot record for one file or directory in the index.
///
/// For non-directories, `blocks` are contiguous and cover `[0, size)` in
/// order. Directories carry no blocks and a zero size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Folder-relative path, `/`-separated, no leading slash.
    pub name: String,
    pub size: u64,
    pub mod_time: SystemTime,
    pub is_directory: bool,
    pub blocks: Vec<BlockInfo>,
}

impl FileInfo {
    /// A regular file covered by the given blocks.
    pub fn file(
        name: impl Into<String>,
        size: u64,
        mod_time: SystemTime,
        blocks: Vec<BlockInfo>,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            mod_time,
            is_directory: false,
            blocks,
        }
    }

    /// A directory entry.
    pub fn directory(name: impl Into<String>, mod_time: SystemTime) -> Self {
        Self {
            name: name.into(),
            size: 0,
            mod_time,
            is_directory: true,
            blocks: Vec::new(),
        }
    }
}

/// Identity of a device participating in a folder.
///
/// The service only distinguishes the local device from remote ones; hosts
/// may map their own identifiers onto the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(u64);

impl DeviceId {
    /// The local device.
    pub const LOCAL: DeviceId = DeviceId(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

/// Per-folder statistics reported through the control surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolderStatistics {
    pub last_file: Option<String>,
    pub last_scan: Option<SystemTime>,
}

/// A per-file error reported through the control surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileError {
    pub path: String,
    pub err: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_hex_is_lowercase() {
        let hash = BlockHash::new(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(hash.to_hex(), "deadbeef");
        assert_eq!(format!("{hash}"), "deadbeef");
    }

    #[test]
    fn directory_has_no_blocks() {
        let dir = FileInfo::directory("photos", SystemTime::UNIX_EPOCH);
        assert!(dir.is_directory);
        assert_eq!(dir.size, 0);
        assert!(dir.blocks.is_empty());
    }
}
