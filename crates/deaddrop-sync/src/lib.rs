//! # deaddrop-sync
//!
//! The message synchronization engine: polls the shared remote store,
//! decrypts and classifies new envelopes, deduplicates them against the
//! local cache, and publishes outbound messages, all over a store that
//! offers no push, no transactions and no ordering.
//!
//! Guarantees:
//! - at-least-once delivery within one poll interval plus one tick,
//! - idempotent ingestion (the cache's unique envelope identity absorbs
//!   duplicate listings, racing clients and overlapping backfills),
//! - per-entry failure isolation (one corrupt envelope never blocks a tick).
//!
//! The engine owns the per-channel sync cursor and bounded seen-set; the
//! local cache owns persisted users and messages; the crypto codec owns the
//! derived key. UI collaborators subscribe to [`SyncEvent`]s over an mpsc
//! channel and drive the engine through [`SyncCommand`]s; the core never
//! reaches into presentation state.

pub mod config;
pub mod engine;
pub mod events;
pub mod seen;
pub mod task;

mod error;

pub use config::SyncConfig;
pub use engine::{ChannelState, SyncEngine, TickSummary};
pub use error::SyncError;
pub use events::SyncEvent;
pub use task::{spawn, SyncCommand};
