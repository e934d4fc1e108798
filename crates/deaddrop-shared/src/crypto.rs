//! Symmetric encryption of message payloads and attachment blobs.
//!
//! The codec owns a single key derived once per process from the shared
//! secret and salt. Any client holding the same secret derives the same key
//! and can decrypt any other client's envelopes.

use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::constants::{AES_GCM_NONCE_SIZE, KDF_CONTEXT_CHANNEL_KEY, XCHACHA_NONCE_SIZE};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; 32];

/// Cipher selected by the `cipherAlgorithm` configuration identifier.
///
/// Both options are AEADs, so a tampered or wrong-key ciphertext always
/// surfaces as [`CryptoError::DecryptionFailed`], never as silent garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgorithm {
    /// XChaCha20-Poly1305 with a 24-byte random nonce (default).
    XChaCha20Poly1305,
    /// AES-256-GCM with a 12-byte random nonce.
    Aes256Gcm,
}

impl CipherAlgorithm {
    pub fn parse(s: &str) -> Result<Self, CryptoError> {
        match s {
            "xchacha20-poly1305" => Ok(Self::XChaCha20Poly1305),
            "aes-256-gcm" => Ok(Self::Aes256Gcm),
            other => Err(CryptoError::UnknownAlgorithm(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::XChaCha20Poly1305 => "xchacha20-poly1305",
            Self::Aes256Gcm => "aes-256-gcm",
        }
    }

    /// Nonce length in bytes for this cipher.
    pub fn nonce_len(&self) -> usize {
        match self {
            Self::XChaCha20Poly1305 => XCHACHA_NONCE_SIZE,
            Self::Aes256Gcm => AES_GCM_NONCE_SIZE,
        }
    }
}

impl Default for CipherAlgorithm {
    fn default() -> Self {
        Self::XChaCha20Poly1305
    }
}

impl std::fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encrypts and decrypts payloads under a key derived from the shared secret.
#[derive(Clone)]
pub struct CryptoCodec {
    key: SymmetricKey,
    algorithm: CipherAlgorithm,
}

impl CryptoCodec {
    /// Derive the channel key from the shared secret and salt.
    ///
    /// BLAKE3 KDF with domain separation; deterministic, so every client
    /// configured with the same secret and salt ends up with the same key.
    pub fn derive(secret: &str, salt: &str, algorithm: CipherAlgorithm) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_CHANNEL_KEY);
        hasher.update(salt.as_bytes());
        hasher.update(secret.as_bytes());
        let hash = hasher.finalize();
        let mut key = [0u8; 32];
        key.copy_from_slice(&hash.as_bytes()[..32]);
        Self { key, algorithm }
    }

    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    /// Encrypt a payload with a fresh random nonce.
    ///
    /// Returns `(iv, ciphertext)`. The nonce is generated from the OS RNG on
    /// every call and must never be reused under the same key; callers embed
    /// it in the envelope so any holder of the key can decrypt.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        let iv = self.generate_nonce();
        let ciphertext = self.encrypt_with_nonce(&iv, plaintext)?;
        Ok((iv, ciphertext))
    }

    /// Decrypt a payload produced by [`CryptoCodec::encrypt`].
    pub fn decrypt(&self, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let expected = self.algorithm.nonce_len();
        if iv.len() != expected {
            return Err(CryptoError::InvalidNonceLength {
                expected,
                got: iv.len(),
            });
        }

        match self.algorithm {
            CipherAlgorithm::XChaCha20Poly1305 => {
                let cipher = XChaCha20Poly1305::new((&self.key).into());
                cipher
                    .decrypt(XNonce::from_slice(iv), ciphertext)
                    .map_err(|_| CryptoError::DecryptionFailed)
            }
            CipherAlgorithm::Aes256Gcm => {
                let cipher = Aes256Gcm::new((&self.key).into());
                cipher
                    .decrypt(aes_gcm::Nonce::from_slice(iv), ciphertext)
                    .map_err(|_| CryptoError::DecryptionFailed)
            }
        }
    }

    /// Encrypt into the self-delimiting blob format: nonce || ciphertext.
    ///
    /// Used for out-of-line attachment blobs, which live in their own remote
    /// entries and therefore carry their own nonce.
    pub fn seal_blob(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let (iv, ciphertext) = self.encrypt(plaintext)?;
        let mut output = Vec::with_capacity(iv.len() + ciphertext.len());
        output.extend_from_slice(&iv);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    /// Decrypt a blob produced by [`CryptoCodec::seal_blob`].
    pub fn open_blob(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce_len = self.algorithm.nonce_len();
        if data.len() < nonce_len {
            return Err(CryptoError::DecryptionFailed);
        }
        let (iv, ciphertext) = data.split_at(nonce_len);
        self.decrypt(iv, ciphertext)
    }

    fn generate_nonce(&self) -> Vec<u8> {
        let mut nonce = vec![0u8; self.algorithm.nonce_len()];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        nonce
    }

    fn encrypt_with_nonce(&self, iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self.algorithm {
            CipherAlgorithm::XChaCha20Poly1305 => {
                let cipher = XChaCha20Poly1305::new((&self.key).into());
                cipher
                    .encrypt(XNonce::from_slice(iv), plaintext)
                    .map_err(|_| CryptoError::EncryptionFailed)
            }
            CipherAlgorithm::Aes256Gcm => {
                let cipher = Aes256Gcm::new((&self.key).into());
                cipher
                    .encrypt(aes_gcm::Nonce::from_slice(iv), plaintext)
                    .map_err(|_| CryptoError::EncryptionFailed)
            }
        }
    }
}

impl std::fmt::Debug for CryptoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("CryptoCodec")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(algorithm: CipherAlgorithm) -> CryptoCodec {
        CryptoCodec::derive("user-shared-secret", "deaddrop-salt", algorithm)
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        for alg in [CipherAlgorithm::XChaCha20Poly1305, CipherAlgorithm::Aes256Gcm] {
            let c = codec(alg);
            let plaintext = b"the pump house, midnight";

            let (iv, ciphertext) = c.encrypt(plaintext).unwrap();
            assert_eq!(iv.len(), alg.nonce_len());

            let decrypted = c.decrypt(&iv, &ciphertext).unwrap();
            assert_eq!(decrypted, plaintext);
        }
    }

    #[test]
    fn test_derivation_deterministic() {
        let a = codec(CipherAlgorithm::XChaCha20Poly1305);
        let b = codec(CipherAlgorithm::XChaCha20Poly1305);

        let (iv, ciphertext) = a.encrypt(b"hello").unwrap();
        assert_eq!(b.decrypt(&iv, &ciphertext).unwrap(), b"hello");
    }

    #[test]
    fn test_different_salt_different_key() {
        let a = CryptoCodec::derive("secret", "salt-1", CipherAlgorithm::default());
        let b = CryptoCodec::derive("secret", "salt-2", CipherAlgorithm::default());

        let (iv, ciphertext) = a.encrypt(b"hello").unwrap();
        assert!(b.decrypt(&iv, &ciphertext).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let a = CryptoCodec::derive("secret-a", "salt", CipherAlgorithm::default());
        let b = CryptoCodec::derive("secret-b", "salt", CipherAlgorithm::default());

        let (iv, ciphertext) = a.encrypt(b"secret message").unwrap();
        assert!(matches!(
            b.decrypt(&iv, &ciphertext),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let c = codec(CipherAlgorithm::default());
        let (iv, mut ciphertext) = c.encrypt(b"important data").unwrap();
        let len = ciphertext.len();
        ciphertext[len - 1] ^= 0xFF;

        assert!(c.decrypt(&iv, &ciphertext).is_err());
    }

    #[test]
    fn test_nonce_unique_per_call() {
        let c = codec(CipherAlgorithm::default());
        let (iv1, ct1) = c.encrypt(b"same data").unwrap();
        let (iv2, ct2) = c.encrypt(b"same data").unwrap();

        assert_ne!(iv1, iv2);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_wrong_nonce_length_rejected() {
        let c = codec(CipherAlgorithm::default());
        let (_, ciphertext) = c.encrypt(b"data").unwrap();
        assert!(matches!(
            c.decrypt(&[0u8; 5], &ciphertext),
            Err(CryptoError::InvalidNonceLength { .. })
        ));
    }

    #[test]
    fn test_blob_roundtrip() {
        let c = codec(CipherAlgorithm::Aes256Gcm);
        let sealed = c.seal_blob(b"attachment bytes").unwrap();
        assert_eq!(c.open_blob(&sealed).unwrap(), b"attachment bytes");
    }

    #[test]
    fn test_blob_too_short_fails() {
        let c = codec(CipherAlgorithm::default());
        assert!(c.open_blob(&[]).is_err());
        assert!(c.open_blob(&[0u8; 3]).is_err());
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!(
            CipherAlgorithm::parse("xchacha20-poly1305").unwrap(),
            CipherAlgorithm::XChaCha20Poly1305
        );
        assert_eq!(
            CipherAlgorithm::parse("aes-256-gcm").unwrap(),
            CipherAlgorithm::Aes256Gcm
        );
        assert!(matches!(
            CipherAlgorithm::parse("aes-256-cbc"),
            Err(CryptoError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_ciphers_not_interchangeable() {
        let a = codec(CipherAlgorithm::XChaCha20Poly1305);
        let b = codec(CipherAlgorithm::Aes256Gcm);

        let (iv, ciphertext) = a.encrypt(b"hello").unwrap();
        // The 24-byte nonce alone is rejected by the 12-byte-nonce cipher.
        assert!(b.decrypt(&iv, &ciphertext).is_err());
    }
}
