//! URL-addressed byte-blob storage.
//!
//! A [`StorageConfig`] is parsed from a blob URL and opened into a
//! [`Storage`] handle. Three schemes are supported:
//!
//! - `mem://<namespace>` — in-process map, lost on drop
//! - `file://<dir>[?no_tmp_dir=yes]` — one regular file per blob directly
//!   under `<dir>`, filename = lowercase hex of the key, no sidecar metadata
//! - `s3://<bucket>[/<prefix>]` — object storage; credentials and region
//!   come from the environment
//!
//! Keys are opaque byte strings; the storage layer hex-encodes them for the
//! underlying medium. Not-found is a `None` result, never an error.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as StorePath;
use object_store::prefix::PrefixStore;
use object_store::ObjectStore;
use tracing::debug;
use url::Url;

use crate::error::StorageError;

/// Parsed blob storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// `mem://<namespace>`
    Memory { namespace: String },
    /// `file://<dir>`
    Local { path: PathBuf },
    /// `s3://<bucket>[/<prefix>]`
    S3 {
        bucket: String,
        prefix: Option<String>,
    },
}

impl StorageConfig {
    /// Parse a blob URL into a configuration.
    ///
    /// Unknown schemes are a configuration error; the folder fails startup
    /// rather than guessing at a backend.
    pub fn parse(blob_url: &str) -> Result<Self, StorageError> {
        let url = Url::parse(blob_url).map_err(|source| StorageError::InvalidUrl {
            url: blob_url.to_string(),
            source,
        })?;

        match url.scheme() {
            "mem" => {
                let mut namespace = url.host_str().unwrap_or("").to_string();
                namespace.push_str(url.path());
                Ok(StorageConfig::Memory { namespace })
            }
            "file" => {
                // `file://` URLs carry the directory in the path component;
                // the `no_tmp_dir` query flag is part of the folder-path
                // syntax and needs no translation here.
                let path = url
                    .to_file_path()
                    .map_err(|()| StorageError::InvalidLocalPath(blob_url.to_string()))?;
                Ok(StorageConfig::Local { path })
            }
            "s3" => {
                let bucket = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| StorageError::InvalidLocalPath(blob_url.to_string()))?
                    .to_string();
                let prefix = url.path().trim_matches('/');
                let prefix = (!prefix.is_empty()).then(|| prefix.to_string());
                Ok(StorageConfig::S3 { bucket, prefix })
            }
            other => Err(StorageError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Configuration for a local directory, bypassing URL syntax.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        StorageConfig::Local { path: path.into() }
    }
}

/// Handle to an opened blob store.
#[derive(Debug, Clone)]
pub struct Storage {
    store: Arc<dyn ObjectStore>,
}

impl Storage {
    /// Open the backend described by `config`.
    ///
    /// For `Local`, the directory is created if missing. For `S3`, the
    /// client is built from environment credentials; connectivity problems
    /// surface on first use, not here.
    pub async fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        let store: Arc<dyn ObjectStore> = match config {
            StorageConfig::Memory { namespace } => {
                debug!(namespace = %namespace, "opening in-memory blob storage");
                Arc::new(InMemory::new())
            }
            StorageConfig::Local { path } => {
                tokio::fs::create_dir_all(path)
                    .await
                    .map_err(|source| StorageError::CreateDir {
                        path: path.clone(),
                        source,
                    })?;
                debug!(path = %path.display(), "opening local blob storage");
                Arc::new(LocalFileSystem::new_with_prefix(path)?)
            }
            StorageConfig::S3 { bucket, prefix } => {
                debug!(bucket = %bucket, prefix = ?prefix, "opening s3 blob storage");
                let s3 = AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .build()?;
                match prefix {
                    Some(prefix) => Arc::new(PrefixStore::new(s3, prefix.as_str())),
                    None => Arc::new(s3),
                }
            }
        };
        Ok(Self { store })
    }

    /// Fetch the blob stored under `key`. `Ok(None)` when absent.
    pub async fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StorageError> {
        match self.store.get(&Self::location(key)).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store `data` under `key`. Re-putting the same key is a no-op in
    /// effect; the last write wins and all writers carry equal bytes for
    /// content-addressed keys.
    pub async fn put(&self, key: &[u8], data: Bytes) -> Result<(), StorageError> {
        self.store.put(&Self::location(key), data.into()).await?;
        Ok(())
    }

    /// Remove the blob stored under `key`. Deleting an absent key is not an
    /// error.
    pub async fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        match self.store.delete(&Self::location(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn location(key: &[u8]) -> StorePath {
        StorePath::from(hex::encode(key))
    }
}
