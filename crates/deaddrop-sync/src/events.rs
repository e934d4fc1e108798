//! Notifications the engine pushes to its subscriber.

use tokio::sync::mpsc;
use tracing::warn;

use deaddrop_shared::ChannelKey;
use deaddrop_store::MessageRecord;

/// Events emitted by the sync engine toward the UI layer.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A message from the peer was ingested into the local cache.
    InboundMessage {
        channel: ChannelKey,
        record: MessageRecord,
    },
    /// An outbound message could not be published after retries. The local
    /// copy stays cached so the user can re-send.
    SendFailed { channel: ChannelKey, reason: String },
    /// The local cache rejected an operation; the remote store is unaffected.
    CacheError { channel: ChannelKey, context: String },
}

/// Best-effort event delivery; a full or closed subscriber never stalls the
/// sync loop.
pub(crate) fn emit(tx: &mpsc::Sender<SyncEvent>, event: SyncEvent) {
    if let Err(e) = tx.try_send(event) {
        warn!(error = %e, "dropping sync event, subscriber not keeping up");
    }
}
