//! Domain model structs persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` so it can be handed directly to a UI
//! layer; message bodies are stored decrypted because the local database
//! lives on the trusted device, unlike the remote store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use deaddrop_shared::{ChannelKey, FileMeta, MessageEnvelope, MessageKind, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Opaque stable identifier, primary key.
    pub id: UserId,
    /// Unique human-readable display name.
    pub handle: String,
    /// When this user registered locally.
    pub created_at: DateTime<Utc>,
    /// Last successful session start by the owning client, if any.
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(id: impl Into<UserId>, handle: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handle: handle.into(),
            created_at: Utc::now(),
            last_seen_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One decrypted chat message, derived from an ingested envelope.
///
/// The identity for deduplication is `(sender_id, sent_at, iv)`; the
/// database enforces it with a unique index, so re-applying the same
/// envelope is a silent no-op.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRecord {
    pub channel_key: ChannelKey,
    pub sender_id: UserId,
    pub sender_handle: String,
    pub recipient_id: UserId,
    pub recipient_handle: String,
    /// Producer clock, epoch milliseconds. Query ordering follows this
    /// claimed send time, not store-arrival order.
    pub sent_at: i64,
    pub kind: MessageKind,
    /// Envelope nonce, part of the dedup identity.
    pub iv: Vec<u8>,
    /// Decrypted body: the message text, or the display caption for files.
    pub body: String,
    /// Attachment metadata for `kind == File`.
    pub file_meta: Option<FileMeta>,
}

impl MessageRecord {
    /// Build the cache record for an envelope whose body has been decrypted.
    pub fn from_envelope(envelope: &MessageEnvelope, body: String) -> Self {
        Self {
            channel_key: ChannelKey::for_pair(&envelope.sender_id, &envelope.recipient_id),
            sender_id: envelope.sender_id.clone(),
            sender_handle: envelope.sender_handle.clone(),
            recipient_id: envelope.recipient_id.clone(),
            recipient_handle: envelope.recipient_handle.clone(),
            sent_at: envelope.sent_at,
            kind: envelope.kind,
            iv: envelope.iv.clone(),
            body,
            file_meta: envelope.file_meta.clone(),
        }
    }
}
