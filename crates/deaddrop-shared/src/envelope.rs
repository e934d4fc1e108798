//! The wire/storage format for a single message or file reference.
//!
//! Envelopes are stored as JSON documents in the remote channel directory,
//! one entry per message. The body is encrypted; sender/recipient identity,
//! the send timestamp and (for files) the attachment metadata travel in the
//! clear so any client can route and deduplicate without decrypting first.
//!
//! An envelope is immutable once created. Its identity for deduplication is
//! the triple `(sender_id, sent_at, iv)`: the remote store assigns no ids,
//! and the triple is derivable by every client from data it already holds,
//! with the random nonce making collisions negligible.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{ENVELOPE_SUFFIX, MAX_MESSAGE_SIZE};
use crate::error::EnvelopeError;
use crate::types::{MessageKind, UserId};

/// Cleartext metadata for an out-of-line file attachment.
///
/// Known weakness, inherited deliberately from the baseline design: the
/// original file name, size and MIME type are not encrypted. A remote-store
/// observer learns what files were exchanged even though it cannot read them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub original_name: String,
    pub byte_size: u64,
    pub mime_type: String,
    /// Name of the encrypted blob under `files/<channelKey>/`.
    pub attachment_id: Uuid,
}

/// One serialized, encrypted message or file-reference record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub sender_id: UserId,
    pub sender_handle: String,
    pub recipient_id: UserId,
    pub recipient_handle: String,
    /// Producer clock, epoch milliseconds. Not authoritative: ordering by
    /// `sent_at` reflects claimed send time, not store-arrival order.
    pub sent_at: i64,
    pub kind: MessageKind,
    /// Fresh random nonce, unique per envelope.
    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,
    /// Encrypted body. For `kind == File` this is the encrypted display
    /// caption; the attachment content itself is a separate blob referenced
    /// by `file_meta.attachment_id`.
    #[serde(with = "base64_bytes")]
    pub cipher_payload: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub file_meta: Option<FileMeta>,
}

impl MessageEnvelope {
    /// Serialize to the JSON wire format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        if self.cipher_payload.len() > MAX_MESSAGE_SIZE {
            return Err(EnvelopeError::TooLarge {
                size: self.cipher_payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse an envelope from remote entry bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Remote entry name for this envelope: `msg_<sentAt>_<hex(iv)>.json`.
    ///
    /// Derived from the dedup triple, so a retried send of the same envelope
    /// targets the same name and two distinct envelopes never collide in
    /// practice (the iv is cryptographically random).
    pub fn entry_name(&self) -> String {
        format!("msg_{}_{}{}", self.sent_at, hex::encode(&self.iv), ENVELOPE_SUFFIX)
    }
}

/// Recover the `(sent_at, iv)` identity embedded in an entry name, without
/// reading the blob.
///
/// Returns `None` for names that are not envelope entries. Used by the sync
/// cursor pre-filter; a `None` means the entry must be read to be classified.
pub fn parse_entry_name(name: &str) -> Option<(i64, Vec<u8>)> {
    let stem = name.strip_prefix("msg_")?.strip_suffix(ENVELOPE_SUFFIX)?;
    let (sent_at, iv_hex) = stem.split_once('_')?;
    if iv_hex.is_empty() {
        return None;
    }
    let iv = hex::decode(iv_hex).ok()?;
    Some((sent_at.parse::<i64>().ok()?, iv))
}

/// Serde adapter: `Vec<u8>` <-> standard base64 string.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
