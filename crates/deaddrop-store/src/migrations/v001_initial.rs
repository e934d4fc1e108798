//! v001 -- Initial schema creation.
//!
//! Creates the two core tables: `users` and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id           TEXT PRIMARY KEY NOT NULL,   -- opaque stable identifier
    handle       TEXT NOT NULL UNIQUE,        -- display name, globally unique
    created_at   TEXT NOT NULL,               -- ISO-8601 / RFC-3339
    last_seen_at TEXT                         -- nullable, touched on session start
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
-- The unique index over (sender_id, sent_at, iv) is the idempotency
-- ledger: re-ingesting an envelope the remote store listed twice, or
-- that a backfill overlapped with a live poll, changes nothing.
CREATE TABLE IF NOT EXISTS messages (
    rowid            INTEGER PRIMARY KEY,
    channel_key      TEXT NOT NULL,           -- sorted user-id pair
    sender_id        TEXT NOT NULL,
    sender_handle    TEXT NOT NULL,
    recipient_id     TEXT NOT NULL,
    recipient_handle TEXT NOT NULL,
    sent_at          INTEGER NOT NULL,        -- producer clock, epoch ms
    kind             TEXT NOT NULL,           -- 'text' | 'file'
    iv               TEXT NOT NULL,           -- hex-encoded envelope nonce
    body             TEXT NOT NULL,           -- decrypted text / file caption
    file_name        TEXT,                    -- attachment meta (clear)
    file_size        INTEGER,
    file_mime        TEXT,
    attachment_id    TEXT,                    -- UUID of the remote blob

    UNIQUE (sender_id, sent_at, iv)
);

CREATE INDEX IF NOT EXISTS idx_messages_channel_ts
    ON messages(channel_key, sent_at ASC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
