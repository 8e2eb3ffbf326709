pub mod backoff;
pub mod fs;
pub mod s3;
mod staging;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use backoff::RetryPolicy;
pub use fs::FsObjectStore;
pub use s3::S3ObjectStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("local file does not exist: {0}")]
    LocalFileMissing(PathBuf),
    #[error("{op} failed with http status {status}: {body}")]
    Http {
        op: &'static str,
        status: u16,
        body: String,
    },
    #[error("{0}")]
    Verification(String),
    #[error("request signing failed: {0}")]
    Signing(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Missing inputs on our side will not fix themselves on retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::LocalFileMissing(_) | Self::Signing(_))
    }
}

/// Durable blob storage for source documents and the published index.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Keys under `prefix`, directory placeholders excluded.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Writes the object to `local_path`; fails unless a non-empty file lands there.
    /// On failure any existing file at `local_path` is left as it was.
    async fn download(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError>;

    async fn upload(&self, local_path: &Path, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// Never raises: a bucket that can neither be found nor created yields `false`.
    async fn bucket_exists_or_create(&self, bucket: &str) -> bool;

    /// Short human-readable description, used by diagnostics.
    fn describe(&self) -> String;
}
