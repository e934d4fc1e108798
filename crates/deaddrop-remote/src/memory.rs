//! In-memory adapter for tests.
//!
//! Cloning shares the underlying map, so two simulated clients handed clones
//! of the same store see each other's writes: the same visibility model as
//! a real shared store, minus the latency. Single-shot fault injection lets
//! failure paths be exercised deterministically.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::{EntryInfo, RemoteError, RemoteStore};

#[derive(Debug, Clone)]
struct Blob {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    blobs: BTreeMap<String, Blob>,
    dirs: HashSet<String>,
    fail_next_list: Option<RemoteError>,
    fail_next_read: Option<RemoteError>,
    fail_next_write: Option<RemoteError>,
}

/// Shared in-memory remote store.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemoteStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `list` call fail with the given error.
    pub fn fail_next_list(&self, err: RemoteError) {
        self.lock().fail_next_list = Some(err);
    }

    /// Make the next `read_blob` call fail with the given error.
    pub fn fail_next_read(&self, err: RemoteError) {
        self.lock().fail_next_read = Some(err);
    }

    /// Make the next `write_blob` call fail with the given error.
    pub fn fail_next_write(&self, err: RemoteError) {
        self.lock().fail_next_write = Some(err);
    }

    /// Number of blobs currently stored under a directory prefix.
    pub fn blob_count(&self, dir: &str) -> usize {
        let prefix = format!("{dir}/");
        self.lock()
            .blobs
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .count()
    }

    /// Overwrite a blob directly, bypassing write-if-absent. For tests that
    /// plant corrupt or colliding entries.
    pub fn put_raw(&self, path: &str, data: &[u8]) {
        self.lock().blobs.insert(
            path.to_string(),
            Blob {
                data: data.to_vec(),
                modified: Utc::now(),
            },
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // The map stays consistent even if a holder panicked mid-test.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn parent_dirs(path: &str) -> Vec<String> {
    let mut dirs = Vec::new();
    let mut acc = String::new();
    for part in path.split('/').filter(|p| !p.is_empty()) {
        if !acc.is_empty() {
            acc.push('/');
        }
        acc.push_str(part);
        dirs.push(acc.clone());
    }
    dirs
}

#[async_trait::async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn ensure_directory(&self, path: &str) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        if inner.dirs.contains(path) {
            return Err(RemoteError::AlreadyExists(path.to_string()));
        }
        for dir in parent_dirs(path) {
            inner.dirs.insert(dir);
        }
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<EntryInfo>, RemoteError> {
        let mut inner = self.lock();
        if let Some(err) = inner.fail_next_list.take() {
            return Err(err);
        }
        if !inner.dirs.contains(path) {
            return Err(RemoteError::NotFound(path.to_string()));
        }

        let prefix = format!("{path}/");
        let mut entries = Vec::new();

        for (key, blob) in &inner.blobs {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if !rest.contains('/') {
                    entries.push(EntryInfo {
                        name: rest.to_string(),
                        is_directory: false,
                        last_modified: Some(blob.modified),
                    });
                }
            }
        }
        for dir in &inner.dirs {
            if let Some(rest) = dir.strip_prefix(&prefix) {
                if !rest.is_empty() && !rest.contains('/') {
                    entries.push(EntryInfo {
                        name: rest.to_string(),
                        is_directory: true,
                        last_modified: None,
                    });
                }
            }
        }
        Ok(entries)
    }

    async fn read_blob(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        let mut inner = self.lock();
        if let Some(err) = inner.fail_next_read.take() {
            return Err(err);
        }
        inner
            .blobs
            .get(path)
            .map(|b| b.data.clone())
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))
    }

    async fn write_blob(
        &self,
        path: &str,
        data: &[u8],
        overwrite: bool,
    ) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        if let Some(err) = inner.fail_next_write.take() {
            return Err(err);
        }
        if !overwrite && inner.blobs.contains_key(path) {
            return Err(RemoteError::AlreadyExists(path.to_string()));
        }
        inner.blobs.insert(
            path.to_string(),
            Blob {
                data: data.to_vec(),
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<EntryInfo, RemoteError> {
        let inner = self.lock();
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        if let Some(blob) = inner.blobs.get(path) {
            return Ok(EntryInfo {
                name,
                is_directory: false,
                last_modified: Some(blob.modified),
            });
        }
        if inner.dirs.contains(path) {
            return Ok(EntryInfo {
                name,
                is_directory: true,
                last_modified: None,
            });
        }
        Err(RemoteError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clone_shares_contents() {
        let a = MemoryRemoteStore::new();
        let b = a.clone();

        a.ensure_directory("messages/x-y").await.unwrap();
        a.write_blob("messages/x-y/m1", b"hello", false)
            .await
            .unwrap();

        assert_eq!(b.read_blob("messages/x-y/m1").await.unwrap(), b"hello");
        assert_eq!(b.list("messages/x-y").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_write_if_absent() {
        let store = MemoryRemoteStore::new();
        store.ensure_directory("d").await.unwrap();
        store.write_blob("d/m", b"first", false).await.unwrap();

        assert!(matches!(
            store.write_blob("d/m", b"second", false).await.unwrap_err(),
            RemoteError::AlreadyExists(_)
        ));
        assert_eq!(store.read_blob("d/m").await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_ensure_directory_semantics() {
        let store = MemoryRemoteStore::new();
        store.ensure_directory("a/b/c").await.unwrap();
        // Parents were created implicitly.
        assert!(store.stat("a/b").await.unwrap().is_directory);
        assert!(matches!(
            store.ensure_directory("a/b/c").await.unwrap_err(),
            RemoteError::AlreadyExists(_)
        ));
    }

    #[tokio::test]
    async fn test_list_only_direct_children() {
        let store = MemoryRemoteStore::new();
        store.ensure_directory("messages/a-b").await.unwrap();
        store
            .write_blob("messages/a-b/m1", b"x", false)
            .await
            .unwrap();

        let top = store.list("messages").await.unwrap();
        assert_eq!(top.len(), 1);
        assert!(top[0].is_directory);

        let leaf = store.list("messages/a-b").await.unwrap();
        assert_eq!(leaf.len(), 1);
        assert_eq!(leaf[0].name, "m1");
    }

    #[tokio::test]
    async fn test_fault_injection_is_single_shot() {
        let store = MemoryRemoteStore::new();
        store.ensure_directory("d").await.unwrap();
        store.fail_next_list(RemoteError::Io("injected".to_string()));

        assert!(store.list("d").await.is_err());
        assert!(store.list("d").await.is_ok());
    }
}
