use std::io::Write;
use std::path::{Path, PathBuf};

use crate::StoreError;

/// Writes `bytes` to a temp file beside `target`, checks it is non-empty and
/// only then renames it over `target`. A failed write leaves `target` untouched.
pub(crate) async fn persist_verified(target: &Path, bytes: Vec<u8>) -> Result<(), StoreError> {
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || persist_blocking(&target, &bytes))
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
}

fn persist_blocking(target: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if bytes.is_empty() {
        return Err(StoreError::Verification(format!(
            "downloaded file is empty: {}",
            target.display()
        )));
    }

    let parent = staging_dir(target);
    std::fs::create_dir_all(&parent)?;
    let mut staged = tempfile::NamedTempFile::new_in(&parent)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;

    let written = staged.as_file().metadata()?.len();
    if written != bytes.len() as u64 {
        return Err(StoreError::Verification(format!(
            "short write for {}: {written} of {} bytes",
            target.display(),
            bytes.len()
        )));
    }

    staged.persist(target).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

fn staging_dir(target: &Path) -> PathBuf {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
