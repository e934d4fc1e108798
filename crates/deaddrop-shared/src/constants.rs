/// Application name
pub const APP_NAME: &str = "deaddrop";

/// XChaCha20-Poly1305 nonce size in bytes
pub const XCHACHA_NONCE_SIZE: usize = 24;

/// AES-256-GCM nonce size in bytes
pub const AES_GCM_NONCE_SIZE: usize = 12;

/// Symmetric key size in bytes
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Maximum message payload size in bytes (256 KiB)
pub const MAX_MESSAGE_SIZE: usize = 262_144;

/// Maximum file attachment size in bytes (50 MiB)
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Key derivation context (BLAKE3 domain separation)
pub const KDF_CONTEXT_CHANNEL_KEY: &str = "deaddrop-channel-key-v1";

/// Remote directory holding message envelopes, one subdirectory per channel
pub const MESSAGES_DIR: &str = "messages";

/// Remote directory holding encrypted attachment blobs, one subdirectory per channel
pub const FILES_DIR: &str = "files";

/// Suffix of message envelope entries in a channel directory
pub const ENVELOPE_SUFFIX: &str = ".json";

/// Default poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;

/// Default per-call remote store timeout in milliseconds
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 10_000;

/// In-memory seen-set high watermark; trimming starts above this
pub const SEEN_SET_CAPACITY: usize = 1000;

/// Number of most-recent entries the seen-set keeps after a trim
pub const SEEN_SET_TRIM_TO: usize = 500;

/// Default clock-skew allowance for the cursor pre-filter (5 minutes)
pub const DEFAULT_CURSOR_SKEW_ALLOWANCE_MS: i64 = 300_000;
