//! Filesystem helpers for node-side rendering

use crate::error::ComponentError;
use std::path::Path;
use tracing::debug;

/// Write `contents` to `path` through a sibling temp file and a rename, so
/// readers never observe a partially written file. Parent directories are
/// created as needed. Dry runs only log.
pub async fn write_atomic(path: &Path, contents: &[u8], dry_run: bool) -> Result<(), ComponentError> {
    if dry_run {
        debug!("dry run: write {} ({} bytes)", path.display(), contents.len());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ComponentError::io(parent, e))?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| ComponentError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| ComponentError::io(path, e))?;
    Ok(())
}

/// Remove a directory tree; a missing directory is not an error
pub async fn remove_dir_all_if_exists(path: &Path) -> Result<(), ComponentError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ComponentError::io(path, e)),
    }
}

/// Remove a file; a missing file is not an error
pub async fn remove_file_if_exists(path: &Path) -> Result<(), ComponentError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ComponentError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_atomic_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc/containerd/config.toml");

        write_atomic(&path, b"version = 2\n", false).await.unwrap();
        write_atomic(&path, b"version = 3\n", false).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "version = 3\n");
        assert!(!path.with_file_name(".config.toml.tmp").exists());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write_atomic(&path, b"x", true).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_removing_missing_paths_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        remove_dir_all_if_exists(&dir.path().join("nope")).await.unwrap();
        remove_file_if_exists(&dir.path().join("nope.txt")).await.unwrap();
    }
}
