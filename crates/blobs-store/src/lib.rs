//! Blob storage for the vfold virtual folder service.
//!
//! This crate provides the two storage layers under a virtual folder:
//!
//! - [`Storage`]: a byte-blob store addressed by URL scheme
//!   (`mem://`, `file://`, `s3://`), with opaque binary keys
//! - [`BlockCache`]: the typed, hash-keyed wrapper the folder service
//!   reads and writes blocks through
//!
//! # Example
//!
//! ```rust,no_run
//! use vfold_blobs_store::{BlockCache, Storage, StorageConfig};
//! use vfold_common::BlockHash;
//!
//! # async fn example() -> Result<(), vfold_blobs_store::StorageError> {
//! let config = StorageConfig::parse("mem://scratch")?;
//! let cache = BlockCache::new(Storage::open(&config).await?);
//!
//! let hash = BlockHash::new(vec![0xab; 32]);
//! cache.put(&hash, bytes::Bytes::from_static(b"block data")).await?;
//! assert!(cache.get(&hash).await?.is_some());
//! # Ok(())
//! # }
//! ```

mod cache;
mod error;
mod storage;

pub use cache::BlockCache;
pub use error::StorageError;
pub use storage::{Storage, StorageConfig};
