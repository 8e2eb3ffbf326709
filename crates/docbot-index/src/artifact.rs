use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use docbot_storage::ObjectStore;

/// File name of the published index, both in the store and in the cache.
pub const INDEX_FILE_NAME: &str = "index.sqlite3";

/// Location of the index file in the object store and in the local cache.
#[derive(Clone)]
pub struct IndexArtifact {
    store: Arc<dyn ObjectStore>,
    bucket: Option<String>,
    key_prefix: String,
    cache_dir: PathBuf,
}

impl IndexArtifact {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: Option<String>,
        key_prefix: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.filter(|b| !b.trim().is_empty()),
            key_prefix: key_prefix.into(),
            cache_dir: cache_dir.into(),
        }
    }

    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    pub fn object_key(&self) -> String {
        let prefix = self.key_prefix.trim_matches('/');
        if prefix.is_empty() {
            INDEX_FILE_NAME.to_string()
        } else {
            format!("{prefix}/{INDEX_FILE_NAME}")
        }
    }

    /// Where the index lives on local disk.
    pub fn local_path(&self) -> PathBuf {
        self.cache_dir.join("index").join(INDEX_FILE_NAME)
    }

    /// Uploads the local index file. Returns `false` when no bucket is configured.
    pub async fn publish(&self, local_path: &Path) -> Result<bool> {
        let Some(bucket) = self.bucket.as_deref() else {
            return Ok(false);
        };
        let key = self.object_key();
        self.store
            .upload(local_path, bucket, &key)
            .await
            .with_context(|| format!("failed to publish index to {bucket}/{key}"))?;
        tracing::info!(bucket, key = %key, "index published");
        Ok(true)
    }

    /// Returns a local copy of the index. With a bucket configured the store copy
    /// always wins; the cached file is only used when there is no bucket or the
    /// download fails.
    pub async fn fetch(&self) -> Result<PathBuf> {
        let local = self.local_path();
        let cached = tokio::fs::try_exists(&local).await.unwrap_or(false);

        let Some(bucket) = self.bucket.as_deref() else {
            anyhow::ensure!(cached, "no cached index and no index bucket configured");
            tracing::debug!(path = %local.display(), "using cached index");
            return Ok(local);
        };

        let key = self.object_key();
        match self.store.download(bucket, &key, &local).await {
            Ok(()) => {
                tracing::info!(bucket, key = %key, path = %local.display(), "index downloaded");
                Ok(local)
            }
            Err(e) if cached => {
                tracing::warn!(
                    bucket,
                    key = %key,
                    error = %e,
                    "index download failed, falling back to cached copy"
                );
                Ok(local)
            }
            Err(e) => Err(e).with_context(|| format!("failed to fetch index from {bucket}/{key}")),
        }
    }
}
