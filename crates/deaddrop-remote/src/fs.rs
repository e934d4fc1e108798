//! Local-filesystem adapter with WebDAV-shaped semantics.
//!
//! Useful for development, tests, and "shared folder" deployments (a synced
//! network mount behaves exactly like the dumb store the protocol assumes).

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{EntryInfo, RemoteError, RemoteStore};

/// Remote store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsRemoteStore {
    base_path: PathBuf,
}

impl FsRemoteStore {
    /// Create the adapter, creating the base directory if needed.
    pub async fn new(base_path: PathBuf) -> Result<Self, RemoteError> {
        fs::create_dir_all(&base_path)
            .await
            .map_err(|e| RemoteError::Io(format!("creating store root: {e}")))?;

        debug!(path = %base_path.display(), "filesystem remote store ready");

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a store key against the base directory.
    ///
    /// Keys are `/`-separated relative paths; any absolute, empty or
    /// parent-directory component is rejected to keep every resolved path
    /// inside the store root.
    fn resolve(&self, key: &str) -> Result<PathBuf, RemoteError> {
        if key.is_empty() {
            return Err(RemoteError::InvalidPath(key.to_string()));
        }
        let mut resolved = self.base_path.clone();
        for component in Path::new(key).components() {
            match component {
                Component::Normal(c) => resolved.push(c),
                _ => return Err(RemoteError::InvalidPath(key.to_string())),
            }
        }
        Ok(resolved)
    }
}

fn map_io(key: &str, e: std::io::Error) -> RemoteError {
    match e.kind() {
        std::io::ErrorKind::NotFound => RemoteError::NotFound(key.to_string()),
        std::io::ErrorKind::AlreadyExists => RemoteError::AlreadyExists(key.to_string()),
        _ => RemoteError::Io(format!("{key}: {e}")),
    }
}

#[async_trait::async_trait]
impl RemoteStore for FsRemoteStore {
    async fn ensure_directory(&self, path: &str) -> Result<(), RemoteError> {
        let target = self.resolve(path)?;
        if fs::metadata(&target).await.is_ok() {
            return Err(RemoteError::AlreadyExists(path.to_string()));
        }
        fs::create_dir_all(&target)
            .await
            .map_err(|e| map_io(path, e))?;
        debug!(path, "created remote directory");
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<EntryInfo>, RemoteError> {
        let target = self.resolve(path)?;
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&target).await.map_err(|e| map_io(path, e))?;

        while let Some(entry) = dir.next_entry().await.map_err(|e| map_io(path, e))? {
            let name = match entry.file_name().into_string() {
                Ok(n) => n,
                Err(_) => continue, // non-UTF-8 names cannot be store keys
            };
            let metadata = entry.metadata().await.map_err(|e| map_io(path, e))?;
            let last_modified = metadata
                .modified()
                .ok()
                .map(|t| DateTime::<Utc>::from(t));
            entries.push(EntryInfo {
                name,
                is_directory: metadata.is_dir(),
                last_modified,
            });
        }
        Ok(entries)
    }

    async fn read_blob(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        let target = self.resolve(path)?;
        fs::read(&target).await.map_err(|e| map_io(path, e))
    }

    async fn write_blob(
        &self,
        path: &str,
        data: &[u8],
        overwrite: bool,
    ) -> Result<(), RemoteError> {
        let target = self.resolve(path)?;

        if overwrite {
            fs::write(&target, data).await.map_err(|e| map_io(path, e))?;
        } else {
            // create_new is the atomic write-if-absent: a racing writer
            // surfaces as AlreadyExists instead of silently losing data.
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target)
                .await
                .map_err(|e| map_io(path, e))?;
            file.write_all(data).await.map_err(|e| map_io(path, e))?;
            file.flush().await.map_err(|e| map_io(path, e))?;
        }

        debug!(path, size = data.len(), "wrote remote blob");
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<EntryInfo, RemoteError> {
        let target = self.resolve(path)?;
        let metadata = fs::metadata(&target).await.map_err(|e| map_io(path, e))?;
        let name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path)
            .to_string();
        Ok(EntryInfo {
            name,
            is_directory: metadata.is_dir(),
            last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }
}
