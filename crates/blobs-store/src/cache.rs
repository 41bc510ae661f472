//! The content-addressed block cache.
//!
//! A thin typed layer over [`Storage`]: blocks are keyed by their content
//! hash and the stored bytes are trusted to match it — the replication layer
//! verifies payloads before they get here, and the cache never re-hashes on
//! read.
//!
//! The cache adds no deduplication or locking of its own. Callers must not
//! assume atomicity across a get-then-put sequence; single-flighting of
//! downloads is the fetch coordinator's concern.

use bytes::Bytes;
use tracing::trace;

use vfold_common::BlockHash;

use crate::error::StorageError;
use crate::storage::Storage;

/// Hash-keyed block storage over a blob backend.
#[derive(Debug, Clone)]
pub struct BlockCache {
    storage: Storage,
}

impl BlockCache {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// The cached bytes for `hash`, or `None` on a miss.
    pub async fn get(&self, hash: &BlockHash) -> Result<Option<Bytes>, StorageError> {
        self.storage.get(hash.as_bytes()).await
    }

    /// Cache `data` under `hash`.
    pub async fn put(&self, hash: &BlockHash, data: Bytes) -> Result<(), StorageError> {
        trace!(hash = %hash, size = data.len(), "caching block");
        self.storage.put(hash.as_bytes(), data).await
    }

    /// Drop the cached bytes for `hash`, if present.
    pub async fn delete(&self, hash: &BlockHash) -> Result<(), StorageError> {
        self.storage.delete(hash.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageConfig;

    async fn mem_cache() -> BlockCache {
        let storage = Storage::open(&StorageConfig::parse("mem://cache-tests").unwrap())
            .await
            .unwrap();
        BlockCache::new(storage)
    }

    #[tokio::test]
    async fn round_trip_until_delete() {
        let cache = mem_cache().await;
        let hash = BlockHash::new(vec![0x11; 32]);
        let data = Bytes::from_static(b"some block bytes");

        assert!(cache.get(&hash).await.unwrap().is_none());

        cache.put(&hash, data.clone()).await.unwrap();
        assert_eq!(cache.get(&hash).await.unwrap().unwrap(), data);
        // still there on a second read
        assert_eq!(cache.get(&hash).await.unwrap().unwrap(), data);

        cache.delete(&hash).await.unwrap();
        assert!(cache.get(&hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn distinct_hashes_are_independent() {
        let cache = mem_cache().await;
        let first = BlockHash::new(vec![0x01; 32]);
        let second = BlockHash::new(vec![0x02; 32]);

        cache.put(&first, Bytes::from_static(b"one")).await.unwrap();
        cache.put(&second, Bytes::from_static(b"two")).await.unwrap();

        cache.delete(&first).await.unwrap();
        assert!(cache.get(&first).await.unwrap().is_none());
        assert_eq!(
            cache.get(&second).await.unwrap().unwrap().as_ref(),
            b"two"
        );
    }

    #[tokio::test]
    async fn re_put_same_key_is_idempotent() {
        let cache = mem_cache().await;
        let hash = BlockHash::new(vec![0x42; 32]);
        let data = Bytes::from_static(b"identical bytes");

        cache.put(&hash, data.clone()).await.unwrap();
        cache.put(&hash, data.clone()).await.unwrap();
        assert_eq!(cache.get(&hash).await.unwrap().unwrap(), data);
    }
}
