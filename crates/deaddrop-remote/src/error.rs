use thiserror::Error;

/// Errors surfaced by a [`crate::RemoteStore`] adapter.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The entry or directory does not exist.
    #[error("Remote entry not found: {0}")]
    NotFound(String),

    /// A write-if-absent target (or directory) already exists.
    #[error("Remote entry already exists: {0}")]
    AlreadyExists(String),

    /// Network or storage failure; worth retrying on the next cycle.
    #[error("Remote store I/O error: {0}")]
    Io(String),

    /// A bounded per-call timeout elapsed; treated like an I/O failure.
    #[error("Remote store call timed out after {0}ms")]
    Timeout(u64),

    /// The path escapes the store root or contains illegal components.
    #[error("Invalid remote path: {0}")]
    InvalidPath(String),
}

impl RemoteError {
    /// Whether the failure is transient: retried on the next poll cycle,
    /// never fatal to the process.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout(_))
    }
}
