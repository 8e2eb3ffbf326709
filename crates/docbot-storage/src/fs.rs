use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::staging::persist_verified;
use crate::{ObjectStore, RetryPolicy, StoreError};

/// Object store rooted in a local directory: buckets are subdirectories,
/// keys are relative paths.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    retry: RetryPolicy,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        key.split('/')
            .filter(|segment| !segment.is_empty() && *segment != "..")
            .fold(self.root.join(bucket), |path, segment| path.join(segment))
    }

    async fn walk(&self, bucket_dir: &Path) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut pending = vec![bucket_dir.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(bucket_dir) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn copy_verified(&self, from: &Path, to: &Path) -> Result<(), StoreError> {
        let bytes = tokio::fs::read(from).await?;
        persist_verified(to, bytes).await
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let bucket_dir = self.root.join(bucket);
        if !tokio::fs::try_exists(&bucket_dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let keys = self.retry.run("list", || self.walk(&bucket_dir)).await?;
        Ok(keys.into_iter().filter(|k| k.starts_with(prefix)).collect())
    }

    async fn download(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let source = self.object_path(bucket, key);
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            return Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        self.retry
            .run("download", || self.copy_verified(&source, local_path))
            .await
    }

    async fn upload(&self, local_path: &Path, bucket: &str, key: &str) -> Result<(), StoreError> {
        if !tokio::fs::try_exists(local_path).await.unwrap_or(false) {
            return Err(StoreError::LocalFileMissing(local_path.to_path_buf()));
        }
        let target = self.object_path(bucket, key);
        self.retry
            .run("upload", || self.copy_verified(local_path, &target))
            .await?;
        tracing::info!(bucket, key, path = %target.display(), "stored object");
        Ok(())
    }

    async fn bucket_exists_or_create(&self, bucket: &str) -> bool {
        let dir = self.root.join(bucket);
        match tokio::fs::create_dir_all(&dir).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(bucket, error = %e, "failed to create bucket directory");
                false
            }
        }
    }

    fn describe(&self) -> String {
        format!("filesystem ({})", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_list_download_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().join("store"));
        assert!(store.bucket_exists_or_create("docs").await);

        let local = dir.path().join("a.txt");
        tokio::fs::write(&local, "hello").await.unwrap();
        store.upload(&local, "docs", "dataset/documents/a.txt").await.unwrap();
        store.upload(&local, "docs", "other/b.txt").await.unwrap();

        let keys = store.list("docs", "dataset/documents/").await.unwrap();
        assert_eq!(keys, vec!["dataset/documents/a.txt"]);

        let out = dir.path().join("cache/a.txt");
        store.download("docs", "dataset/documents/a.txt", &out).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&out).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn missing_bucket_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        assert!(store.list("nope", "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn download_missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let err = store
            .download("docs", "missing.pdf", &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn upload_missing_local_file_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let err = store
            .upload(&dir.path().join("nope"), "docs", "k")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LocalFileMissing(_)));
    }

    #[tokio::test]
    async fn empty_download_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().join("store"))
            .with_retry(RetryPolicy::with_base(std::time::Duration::from_millis(1)));
        let bucket_dir = dir.path().join("store/docs");
        tokio::fs::create_dir_all(&bucket_dir).await.unwrap();
        tokio::fs::write(bucket_dir.join("empty.pdf"), b"").await.unwrap();

        let out = dir.path().join("out.pdf");
        let err = store.download("docs", "empty.pdf", &out).await.unwrap_err();
        assert!(matches!(err, StoreError::Verification(_)));
        assert!(!out.exists());
    }
}
