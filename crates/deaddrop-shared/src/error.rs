use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Invalid nonce length: expected {expected}, got {got}")]
    InvalidNonceLength { expected: usize, got: usize },

    #[error("Unknown cipher algorithm: {0}")]
    UnknownAlgorithm(String),
}

#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// JSON-level failure, including bad base64 in binary fields (the serde
    /// adapter reports those as custom deserialization errors).
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Envelope payload exceeds maximum size ({size} > {max})")]
    TooLarge { size: usize, max: usize },
}
