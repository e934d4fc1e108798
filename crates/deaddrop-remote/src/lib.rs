//! # deaddrop-remote
//!
//! The contract over the shared, dumb, eventually-consistent remote store
//! the clients exchange envelopes through, plus two concrete adapters: a
//! local-filesystem store with WebDAV-shaped semantics and an in-memory
//! store for tests.
//!
//! The store offers no push, no transactions and no ordering, only create,
//! read, list and stat, each possibly racing with other clients. All
//! consistency guarantees live above this crate, in the sync engine.

pub mod fs;
pub mod memory;

mod error;

use chrono::{DateTime, Utc};

pub use error::RemoteError;
pub use fs::FsRemoteStore;
pub use memory::MemoryRemoteStore;

/// One directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Base name within the listed directory.
    pub name: String,
    pub is_directory: bool,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Contract over the shared blob/directory service.
///
/// Paths are `/`-separated keys relative to the store root. Implementations
/// carry no business logic; in particular `write_blob` with
/// `overwrite = false` must fail with [`RemoteError::AlreadyExists`] rather
/// than clobber a racing writer's entry.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create a directory (and any missing parents).
    ///
    /// Fails with [`RemoteError::AlreadyExists`] when the directory is
    /// already present; callers performing idempotent bootstrap treat that
    /// as success.
    async fn ensure_directory(&self, path: &str) -> Result<(), RemoteError>;

    /// List the entries of a directory.
    async fn list(&self, path: &str) -> Result<Vec<EntryInfo>, RemoteError>;

    /// Read a blob in full.
    async fn read_blob(&self, path: &str) -> Result<Vec<u8>, RemoteError>;

    /// Write a blob. With `overwrite = false` this is write-if-absent.
    async fn write_blob(&self, path: &str, data: &[u8], overwrite: bool)
        -> Result<(), RemoteError>;

    /// Metadata for a single entry.
    async fn stat(&self, path: &str) -> Result<EntryInfo, RemoteError>;
}
