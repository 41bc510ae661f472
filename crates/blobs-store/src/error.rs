use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid blob url {url}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("unsupported blob url scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("blob url {0} does not name a usable local path")]
    InvalidLocalPath(String),
    #[error("failed to create storage directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("backend error: {0}")]
    Backend(#[from] object_store::Error),
}
