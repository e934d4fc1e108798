use thiserror::Error;

use deaddrop_remote::RemoteError;
use deaddrop_shared::{CryptoError, EnvelopeError};
use deaddrop_store::StoreError;

/// Errors surfaced by the sync engine.
///
/// Per-entry failures inside a poll tick are isolated and never reach this
/// type; what does reach it are whole-tick failures (store unreachable),
/// send failures after retries, and local cache trouble.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Local cache error: {0}")]
    Cache(#[from] StoreError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// The local cache is unreachable (poisoned lock). Fatal to the current
    /// operation, not to the process.
    #[error("Local cache unavailable: {0}")]
    CacheUnavailable(String),

    /// A send exhausted its bounded retries.
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Invalid user id for remote paths: {0}")]
    InvalidUserId(String),

    #[error("Attachment exceeds maximum size ({size} > {max})")]
    AttachmentTooLarge { size: usize, max: usize },
}

impl SyncError {
    /// Whether the failure is worth retrying on the next poll cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Remote(e) if e.is_transient())
    }
}
