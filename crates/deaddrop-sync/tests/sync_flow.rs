//! End-to-end synchronization over a shared in-memory store: two clients,
//! one channel, no cooperation beyond the blob directory.

use std::sync::{Arc, Mutex};

use deaddrop_remote::{MemoryRemoteStore, RemoteError, RemoteStore};
use deaddrop_shared::{CipherAlgorithm, CryptoCodec, MessageEnvelope, MessageKind};
use deaddrop_store::{Database, User};
use deaddrop_sync::{ChannelState, SyncConfig, SyncEngine, SyncError, SyncEvent};
use tokio::sync::mpsc;

const SECRET: &str = "pairwise-shared-secret";
const SALT: &str = "test-salt";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(secret: &str) -> SyncConfig {
    SyncConfig {
        encryption_secret: secret.to_string(),
        encryption_salt: SALT.to_string(),
        ..SyncConfig::default()
    }
}

fn client(
    store: &MemoryRemoteStore,
    id: &str,
    handle: &str,
    peer_id: &str,
    peer_handle: &str,
    secret: &str,
) -> (
    SyncEngine<MemoryRemoteStore>,
    mpsc::Receiver<SyncEvent>,
    Arc<Mutex<Database>>,
) {
    init_tracing();
    let cache = Arc::new(Mutex::new(Database::in_memory().unwrap()));
    let (engine, events) = SyncEngine::new(
        config(secret),
        store.clone(),
        cache.clone(),
        User::new(id, handle),
        User::new(peer_id, peer_handle),
    )
    .unwrap();
    (engine, events, cache)
}

fn message_count(cache: &Arc<Mutex<Database>>) -> usize {
    let db = cache.lock().unwrap();
    db.query_messages(&"alice".into(), &"bob".into(), None)
        .unwrap()
        .len()
}

#[tokio::test]
async fn test_text_message_reaches_peer() {
    let store = MemoryRemoteStore::new();
    let (mut alice, _alice_events, alice_cache) =
        client(&store, "alice", "Alice", "bob", "Bob", SECRET);
    let (mut bob, mut bob_events, bob_cache) =
        client(&store, "bob", "Bob", "alice", "Alice", SECRET);

    assert_eq!(bob.state(), ChannelState::Uninitialized);
    assert_eq!(bob.channel().as_str(), "alice-bob");

    let sent = alice.send_text("meet at the pump house").await.unwrap();
    assert_eq!(sent.body, "meet at the pump house");
    // Sender echo: cached locally before any polling happens.
    assert_eq!(message_count(&alice_cache), 1);

    let summary = bob.poll_tick().await.unwrap();
    assert_eq!(summary.ingested, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(bob.state(), ChannelState::Polling);
    assert_eq!(bob.cursor(), Some(sent.sent_at));

    let messages = {
        let db = bob_cache.lock().unwrap();
        db.query_messages(&"alice".into(), &"bob".into(), None)
            .unwrap()
    };
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body, "meet at the pump house");
    assert_eq!(messages[0].sender_handle, "Alice");
    assert_eq!(messages[0].kind, MessageKind::Text);

    match bob_events.try_recv().unwrap() {
        SyncEvent::InboundMessage { record, .. } => {
            assert_eq!(record.body, "meet at the pump house");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_stored_entries_never_leak_plaintext() {
    let store = MemoryRemoteStore::new();
    let (mut alice, _events, _cache) = client(&store, "alice", "Alice", "bob", "Bob", SECRET);

    alice.send_text("the safehouse is compromised").await.unwrap();

    let entry = store
        .list("messages/alice-bob")
        .await
        .unwrap()
        .remove(0);
    let bytes = store
        .read_blob(&format!("messages/alice-bob/{}", entry.name))
        .await
        .unwrap();

    // Routing metadata is readable by any client without the key...
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["senderId"], "alice");
    assert_eq!(json["recipientId"], "bob");
    assert_eq!(json["kind"], "text");

    // ...but the body only travels encrypted.
    let raw = String::from_utf8_lossy(&bytes);
    assert!(!raw.contains("safehouse"));
}

#[tokio::test]
async fn test_repeated_ticks_are_idempotent() {
    let store = MemoryRemoteStore::new();
    let (mut alice, _e1, _c1) = client(&store, "alice", "Alice", "bob", "Bob", SECRET);
    let (mut bob, _e2, bob_cache) = client(&store, "bob", "Bob", "alice", "Alice", SECRET);

    alice.send_text("one").await.unwrap();
    alice.send_text("two").await.unwrap();

    assert_eq!(bob.poll_tick().await.unwrap().ingested, 2);

    // Seen-set short-circuits the re-listing.
    let second = bob.poll_tick().await.unwrap();
    assert_eq!(second.ingested, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(message_count(&bob_cache), 2);

    // A fresh engine over the same cache (restart: cursor and seen-set gone)
    // re-reads everything; the cache's envelope identity absorbs the replay.
    let (mut bob2, _e3) = SyncEngine::new(
        config(SECRET),
        store.clone(),
        bob_cache.clone(),
        User::new("bob", "Bob"),
        User::new("alice", "Alice"),
    )
    .unwrap();
    let replay = bob2.poll_tick().await.unwrap();
    assert_eq!(replay.ingested, 0);
    assert_eq!(replay.duplicates, 2);
    assert_eq!(message_count(&bob_cache), 2);
}

#[tokio::test]
async fn test_skewed_producer_clock_cannot_lose_a_message() {
    let store = MemoryRemoteStore::new();
    let (mut alice, _e1, _c1) = client(&store, "alice", "Alice", "bob", "Bob", SECRET);
    let (mut bob, _e2, bob_cache) = client(&store, "bob", "Bob", "alice", "Alice", SECRET);

    alice.send_text("fresh").await.unwrap();
    assert_eq!(bob.poll_tick().await.unwrap().ingested, 1);
    let cursor = bob.cursor().unwrap();

    // A client whose clock runs far behind publishes a valid envelope dated
    // well below the watermark allowance (default 5 minutes).
    let codec = CryptoCodec::derive(SECRET, SALT, CipherAlgorithm::default());
    let (iv, cipher_payload) = codec.encrypt(b"from the past").unwrap();
    let envelope = MessageEnvelope {
        sender_id: "alice".into(),
        sender_handle: "Alice".to_string(),
        recipient_id: "bob".into(),
        recipient_handle: "Bob".to_string(),
        sent_at: cursor - 600_000,
        kind: MessageKind::Text,
        iv,
        cipher_payload,
        file_meta: None,
    };
    store.put_raw(
        &format!("messages/alice-bob/{}", envelope.entry_name()),
        &envelope.to_bytes().unwrap(),
    );

    // The watermark never drops it: the next tick picks it up.
    assert_eq!(bob.poll_tick().await.unwrap().ingested, 1);

    let bodies = {
        let db = bob_cache.lock().unwrap();
        db.query_messages(&"alice".into(), &"bob".into(), None)
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect::<Vec<_>>()
    };
    assert_eq!(bodies, vec!["from the past", "fresh"]);

    // Once cached, it is skipped without another remote read, even by a
    // fresh engine whose cursor is rebuilt past it.
    let (mut bob2, _e3) = SyncEngine::new(
        config(SECRET),
        store.clone(),
        bob_cache.clone(),
        User::new("bob", "Bob"),
        User::new("alice", "Alice"),
    )
    .unwrap();
    assert_eq!(bob2.poll_tick().await.unwrap().duplicates, 2);
    let steady = bob2.poll_tick().await.unwrap();
    assert_eq!(steady.ingested, 0);
    assert_eq!(steady.skipped, 2);
}

#[tokio::test]
async fn test_occupied_entry_name_regenerates_without_duplicate_echo() {
    let store = MemoryRemoteStore::new();
    let (mut alice, _e1, alice_cache) = client(&store, "alice", "Alice", "bob", "Bob", SECRET);
    let (mut bob, _e2, _c2) = client(&store, "bob", "Bob", "alice", "Alice", SECRET);

    // The first write collides; the read-back finds a non-identical (here:
    // absent) occupant, forcing regeneration under a fresh nonce.
    store.fail_next_write(RemoteError::AlreadyExists(
        "messages/alice-bob/occupied".to_string(),
    ));
    let sent = alice.send_text("hello once").await.unwrap();
    assert_eq!(sent.body, "hello once");

    // Exactly one published blob and exactly one echo row: the stale echo
    // cached under the superseded identity was replaced.
    assert_eq!(store.blob_count("messages/alice-bob"), 1);
    let bodies = {
        let db = alice_cache.lock().unwrap();
        db.query_messages(&"alice".into(), &"bob".into(), None)
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect::<Vec<_>>()
    };
    assert_eq!(bodies, vec!["hello once"]);

    // The peer sees the message exactly once too.
    assert_eq!(bob.poll_tick().await.unwrap().ingested, 1);
}

#[tokio::test]
async fn test_corrupt_entry_does_not_block_the_tick() {
    let store = MemoryRemoteStore::new();
    let (mut alice, _e1, _c1) = client(&store, "alice", "Alice", "bob", "Bob", SECRET);
    let (mut bob, _e2, bob_cache) = client(&store, "bob", "Bob", "alice", "Alice", SECRET);

    alice.send_text("healthy").await.unwrap();
    store.put_raw("messages/alice-bob/msg_123_abcd.json", b"{ not json");

    let summary = bob.poll_tick().await.unwrap();
    assert_eq!(summary.ingested, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(message_count(&bob_cache), 1);

    // The corrupt entry is quarantined, not retried forever.
    let next = bob.poll_tick().await.unwrap();
    assert_eq!(next.failed, 0);
    assert_eq!(next.skipped, 2);
}

#[tokio::test]
async fn test_wrong_secret_is_quarantined() {
    let store = MemoryRemoteStore::new();
    let (mut mallory, _e1, _c1) =
        client(&store, "alice", "Alice", "bob", "Bob", "not-the-secret");
    let (mut bob, mut bob_events, bob_cache) =
        client(&store, "bob", "Bob", "alice", "Alice", SECRET);

    mallory.send_text("forged").await.unwrap();

    let summary = bob.poll_tick().await.unwrap();
    assert_eq!(summary.ingested, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(message_count(&bob_cache), 0);
    assert!(bob_events.try_recv().is_err());
}

#[tokio::test]
async fn test_file_attachment_round_trip() {
    let store = MemoryRemoteStore::new();
    let (mut alice, _e1, _c1) = client(&store, "alice", "Alice", "bob", "Bob", SECRET);
    let (mut bob, _e2, bob_cache) = client(&store, "bob", "Bob", "alice", "Alice", SECRET);

    let content = b"PNG-ish bytes, definitely a photo".to_vec();
    let sent = alice
        .send_file("photo.png", "image/png", &content)
        .await
        .unwrap();
    assert_eq!(sent.kind, MessageKind::File);

    // One envelope plus one out-of-line blob, and the blob is not plaintext.
    assert_eq!(store.blob_count("messages/alice-bob"), 1);
    assert_eq!(store.blob_count("files/alice-bob"), 1);

    assert_eq!(bob.poll_tick().await.unwrap().ingested, 1);
    let record = {
        let db = bob_cache.lock().unwrap();
        db.query_messages(&"alice".into(), &"bob".into(), None)
            .unwrap()
            .remove(0)
    };
    assert_eq!(record.kind, MessageKind::File);
    assert_eq!(record.body, "photo.png");

    let meta = record.file_meta.expect("file message carries meta");
    assert_eq!(meta.original_name, "photo.png");
    assert_eq!(meta.byte_size, content.len() as u64);

    let downloaded = bob.fetch_attachment(&meta).await.unwrap();
    assert_eq!(downloaded, content);
}

#[tokio::test]
async fn test_transient_write_failure_is_retried() {
    let store = MemoryRemoteStore::new();
    let (mut alice, mut events, _cache) =
        client(&store, "alice", "Alice", "bob", "Bob", SECRET);

    store.fail_next_write(RemoteError::Io("flaky store".to_string()));
    alice.send_text("persistent").await.unwrap();

    assert_eq!(store.blob_count("messages/alice-bob"), 1);
    assert!(events.try_recv().is_err(), "no failure event on success");
}

#[tokio::test]
async fn test_exhausted_retries_emit_send_failed() {
    init_tracing();
    let store = MemoryRemoteStore::new();
    let cache = Arc::new(Mutex::new(Database::in_memory().unwrap()));
    let mut cfg = config(SECRET);
    cfg.send_retry_limit = 0;
    let (mut alice, mut events) = SyncEngine::new(
        cfg,
        store.clone(),
        cache.clone(),
        User::new("alice", "Alice"),
        User::new("bob", "Bob"),
    )
    .unwrap();

    store.fail_next_write(RemoteError::Io("down".to_string()));
    let err = alice.send_text("lost for now").await.unwrap_err();
    assert!(matches!(err, SyncError::SendFailed(_)));

    assert!(matches!(
        events.try_recv().unwrap(),
        SyncEvent::SendFailed { .. }
    ));
    // The local echo stays cached so the user can re-send.
    assert_eq!(message_count(&cache), 1);
    assert_eq!(store.blob_count("messages/alice-bob"), 0);
}

#[tokio::test]
async fn test_transient_listing_failure_propagates_and_recovers() {
    let store = MemoryRemoteStore::new();
    let (mut alice, _e1, _c1) = client(&store, "alice", "Alice", "bob", "Bob", SECRET);
    let (mut bob, _e2, _c2) = client(&store, "bob", "Bob", "alice", "Alice", SECRET);

    alice.send_text("eventually").await.unwrap();

    store.fail_next_list(RemoteError::Io("blip".to_string()));
    let err = bob.poll_tick().await.unwrap_err();
    assert!(err.is_transient());

    assert_eq!(bob.poll_tick().await.unwrap().ingested, 1);
}

#[tokio::test]
async fn test_engine_registers_users_in_cache() {
    let store = MemoryRemoteStore::new();
    let (_alice, _events, cache) = client(&store, "alice", "Alice", "bob", "Bob", SECRET);

    let db = cache.lock().unwrap();
    let me = db.get_user(&"alice".into()).unwrap();
    assert!(me.last_seen_at.is_some(), "session start recorded");
    let peer = db.get_user(&"bob".into()).unwrap();
    assert!(peer.last_seen_at.is_none());
}

#[tokio::test]
async fn test_invalid_user_id_rejected() {
    init_tracing();
    let store = MemoryRemoteStore::new();
    let cache = Arc::new(Mutex::new(Database::in_memory().unwrap()));
    let result = SyncEngine::new(
        config(SECRET),
        store,
        cache,
        User::new("../escape", "Evil"),
        User::new("bob", "Bob"),
    );
    assert!(matches!(result, Err(SyncError::InvalidUserId(_))));
}

#[tokio::test]
async fn test_both_directions_share_one_channel_directory() {
    let store = MemoryRemoteStore::new();
    let (mut alice, _e1, alice_cache) = client(&store, "alice", "Alice", "bob", "Bob", SECRET);
    let (mut bob, _e2, bob_cache) = client(&store, "bob", "Bob", "alice", "Alice", SECRET);

    alice.send_text("ping").await.unwrap();
    bob.poll_tick().await.unwrap();
    bob.send_text("pong").await.unwrap();
    alice.poll_tick().await.unwrap();

    // Identical ordered transcripts on both sides.
    let read = |cache: &Arc<Mutex<Database>>| {
        let db = cache.lock().unwrap();
        db.query_messages(&"alice".into(), &"bob".into(), None)
            .unwrap()
            .into_iter()
            .map(|m| m.body)
            .collect::<Vec<_>>()
    };
    assert_eq!(read(&alice_cache), vec!["ping", "pong"]);
    assert_eq!(read(&bob_cache), vec!["ping", "pong"]);

    // Everything lives under the single sorted-pair directory.
    assert_eq!(store.blob_count("messages/alice-bob"), 2);
}
