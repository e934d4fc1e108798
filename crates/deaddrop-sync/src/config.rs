//! Engine configuration.

use tracing::warn;

use deaddrop_shared::constants::{
    DEFAULT_CURSOR_SKEW_ALLOWANCE_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_STORE_TIMEOUT_MS,
};
use deaddrop_shared::CipherAlgorithm;

/// Tunables for one sync engine instance.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root prefix on the remote store under which `messages/` and `files/`
    /// live. Empty means the store root itself.
    pub remote_root: String,
    /// Pre-shared channel secret; the actual key is derived from it.
    pub encryption_secret: String,
    /// Salt mixed into key derivation. Both peers must agree on it.
    pub encryption_salt: String,
    /// Which AEAD the derived key drives.
    pub cipher_algorithm: CipherAlgorithm,
    /// Milliseconds between poll ticks.
    pub poll_interval_ms: u64,
    /// Per-operation deadline for remote store calls.
    pub store_timeout_ms: u64,
    /// How far behind the cursor an entry's name-embedded timestamp may lag
    /// before the entry is skipped without a read. Guards against producer
    /// clock skew dropping valid messages.
    pub cursor_skew_allowance_ms: i64,
    /// Extra write attempts after a transient send failure.
    pub send_retry_limit: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_root: String::new(),
            encryption_secret: String::new(),
            encryption_salt: String::new(),
            cipher_algorithm: CipherAlgorithm::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            cursor_skew_allowance_ms: DEFAULT_CURSOR_SKEW_ALLOWANCE_MS,
            send_retry_limit: 1,
        }
    }
}

impl SyncConfig {
    /// Build a config from `DEADDROP_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(root) = std::env::var("DEADDROP_REMOTE_ROOT") {
            config.remote_root = root;
        }
        if let Ok(secret) = std::env::var("DEADDROP_SECRET") {
            config.encryption_secret = secret;
        }
        if let Ok(salt) = std::env::var("DEADDROP_SALT") {
            config.encryption_salt = salt;
        }
        if let Ok(raw) = std::env::var("DEADDROP_CIPHER") {
            match CipherAlgorithm::parse(&raw) {
                Ok(alg) => config.cipher_algorithm = alg,
                Err(_) => warn!(value = %raw, "invalid DEADDROP_CIPHER, using default"),
            }
        }
        if let Ok(raw) = std::env::var("DEADDROP_POLL_INTERVAL_MS") {
            match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => config.poll_interval_ms = ms,
                _ => warn!(value = %raw, "invalid DEADDROP_POLL_INTERVAL_MS, using default"),
            }
        }
        if let Ok(raw) = std::env::var("DEADDROP_STORE_TIMEOUT_MS") {
            match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => config.store_timeout_ms = ms,
                _ => warn!(value = %raw, "invalid DEADDROP_STORE_TIMEOUT_MS, using default"),
            }
        }
        if let Ok(raw) = std::env::var("DEADDROP_CURSOR_SKEW_MS") {
            match raw.parse::<i64>() {
                Ok(ms) if ms >= 0 => config.cursor_skew_allowance_ms = ms,
                _ => warn!(value = %raw, "invalid DEADDROP_CURSOR_SKEW_MS, using default"),
            }
        }
        if let Ok(raw) = std::env::var("DEADDROP_SEND_RETRIES") {
            match raw.parse::<u32>() {
                Ok(n) => config.send_retry_limit = n,
                Err(_) => warn!(value = %raw, "invalid DEADDROP_SEND_RETRIES, using default"),
            }
        }

        config
    }
}
