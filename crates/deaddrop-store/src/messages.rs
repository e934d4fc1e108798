//! CRUD operations for [`MessageRecord`] rows.
//!
//! `upsert_message` is the idempotency keystone of the whole system: the
//! remote store can list the same entry twice, two clients can race, and a
//! backfill can overlap a live poll, yet each envelope lands in the cache at
//! most once.

use rusqlite::params;
use uuid::Uuid;

use deaddrop_shared::{ChannelKey, FileMeta, MessageKind, UserId};

use crate::database::Database;
use crate::error::Result;
use crate::models::MessageRecord;

impl Database {
    /// Idempotent insert keyed by `(sender_id, sent_at, iv)`.
    ///
    /// Returns `true` when a genuinely new row was inserted, `false` when
    /// the identity was already present (a duplicate, silently absorbed).
    pub fn upsert_message(&self, record: &MessageRecord) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO messages
                 (channel_key, sender_id, sender_handle, recipient_id, recipient_handle,
                  sent_at, kind, iv, body, file_name, file_size, file_mime, attachment_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.channel_key.as_str(),
                record.sender_id.as_str(),
                record.sender_handle,
                record.recipient_id.as_str(),
                record.recipient_handle,
                record.sent_at,
                record.kind.as_str(),
                hex::encode(&record.iv),
                record.body,
                record.file_meta.as_ref().map(|m| m.original_name.clone()),
                record.file_meta.as_ref().map(|m| m.byte_size as i64),
                record.file_meta.as_ref().map(|m| m.mime_type.clone()),
                record.file_meta.as_ref().map(|m| m.attachment_id.to_string()),
            ],
        )?;
        Ok(affected > 0)
    }

    /// Messages exchanged between the two users, ordered by `sent_at`
    /// ascending. `since_exclusive` skips rows at or before the given
    /// producer timestamp.
    pub fn query_messages(
        &self,
        a: &UserId,
        b: &UserId,
        since_exclusive: Option<i64>,
    ) -> Result<Vec<MessageRecord>> {
        let channel_key = ChannelKey::for_pair(a, b);
        let mut stmt = self.conn().prepare(
            "SELECT channel_key, sender_id, sender_handle, recipient_id, recipient_handle,
                    sent_at, kind, iv, body, file_name, file_size, file_mime, attachment_id
             FROM messages
             WHERE channel_key = ?1 AND sent_at > ?2
             ORDER BY sent_at ASC, rowid ASC",
        )?;

        let floor = since_exclusive.unwrap_or(i64::MIN);
        let rows = stmt.query_map(params![channel_key.as_str(), floor], row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Whether an envelope with this identity is already cached.
    ///
    /// An indexed local lookup, used by the sync cursor pre-filter so an
    /// entry is only ever skipped once the cache confirms it.
    pub fn has_message(&self, channel: &ChannelKey, sent_at: i64, iv: &[u8]) -> Result<bool> {
        let present: bool = self.conn().query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM messages
                 WHERE channel_key = ?1 AND sent_at = ?2 AND iv = ?3)",
            params![channel.as_str(), sent_at, hex::encode(iv)],
            |row| row.get(0),
        )?;
        Ok(present)
    }

    /// Remove a message by its envelope identity. Returns whether a row
    /// existed. Used when an outbound send is re-keyed before publication.
    pub fn delete_message(&self, sender_id: &UserId, sent_at: i64, iv: &[u8]) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE sender_id = ?1 AND sent_at = ?2 AND iv = ?3",
            params![sender_id.as_str(), sent_at, hex::encode(iv)],
        )?;
        Ok(affected > 0)
    }

    /// Highest `sent_at` stored for the channel, if any.
    pub fn latest_sent_at(&self, a: &UserId, b: &UserId) -> Result<Option<i64>> {
        let channel_key = ChannelKey::for_pair(a, b);
        let max: Option<i64> = self.conn().query_row(
            "SELECT MAX(sent_at) FROM messages WHERE channel_key = ?1",
            params![channel_key.as_str()],
            |row| row.get(0),
        )?;
        Ok(max)
    }
}

/// Map a `rusqlite::Row` to a [`MessageRecord`].
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    let sender_id: String = row.get(1)?;
    let sender_handle: String = row.get(2)?;
    let recipient_id: String = row.get(3)?;
    let recipient_handle: String = row.get(4)?;
    let sent_at: i64 = row.get(5)?;
    let kind_str: String = row.get(6)?;
    let iv_hex: String = row.get(7)?;
    let body: String = row.get(8)?;
    let file_name: Option<String> = row.get(9)?;
    let file_size: Option<i64> = row.get(10)?;
    let file_mime: Option<String> = row.get(11)?;
    let attachment_id_str: Option<String> = row.get(12)?;

    let kind = MessageKind::from_str(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("unknown message kind: {kind_str}").into(),
        )
    })?;

    let iv = hex::decode(&iv_hex).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let file_meta = match (file_name, file_size, file_mime, attachment_id_str) {
        (Some(original_name), Some(byte_size), Some(mime_type), Some(id_str)) => {
            let attachment_id = Uuid::parse_str(&id_str).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    12,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            Some(FileMeta {
                original_name,
                byte_size: byte_size as u64,
                mime_type,
                attachment_id,
            })
        }
        _ => None,
    };

    let sender_id = UserId::new(sender_id);
    let recipient_id = UserId::new(recipient_id);

    Ok(MessageRecord {
        channel_key: ChannelKey::for_pair(&sender_id, &recipient_id),
        sender_id,
        sender_handle,
        recipient_id,
        recipient_handle,
        sent_at,
        kind,
        iv,
        body,
        file_meta,
    })
}
