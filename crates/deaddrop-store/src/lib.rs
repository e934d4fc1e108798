//! # deaddrop-store
//!
//! Durable local cache for the deaddrop client, backed by SQLite.
//!
//! The cache is the source of truth for the UI and the authoritative
//! deduplication ledger for the sync engine: inserting the same envelope
//! identity `(sender_id, sent_at, iv)` twice is a no-op. The crate exposes a
//! synchronous [`Database`] handle wrapping a `rusqlite::Connection` with
//! typed CRUD helpers for users and messages.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
