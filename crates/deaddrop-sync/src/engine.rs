//! The per-channel synchronization engine.
//!
//! One engine instance serves one local user talking to one peer over one
//! remote store. It owns no persistent state of its own: everything durable
//! lives in the local cache, and everything shared lives on the remote
//! store. The cursor and seen-set are in-memory accelerators that can be
//! lost at any time without losing messages.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use deaddrop_remote::{RemoteError, RemoteStore};
use deaddrop_shared::constants::MAX_FILE_SIZE;
use deaddrop_shared::envelope::parse_entry_name;
use deaddrop_shared::{
    ChannelKey, ChannelResolver, CryptoCodec, FileMeta, MessageEnvelope, MessageKind,
};
use deaddrop_store::{Database, MessageRecord, StoreError, User};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::events::{self, SyncEvent};
use crate::seen::SeenSet;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle of the channel's remote layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Remote directories not yet verified.
    Uninitialized,
    /// `messages/<key>` and `files/<key>` exist on the remote store.
    DirectoryEnsured,
    /// At least one poll tick has completed.
    Polling,
}

/// Counters for one completed poll tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Entries returned by the remote listing.
    pub listed: usize,
    /// New messages inserted into the local cache.
    pub ingested: usize,
    /// Valid envelopes the cache already held.
    pub duplicates: usize,
    /// Entries skipped without a read: directories, seen names, below-cursor.
    pub skipped: usize,
    /// Entries that could not be ingested. Corrupt entries are quarantined;
    /// transiently unreadable ones are retried next tick.
    pub failed: usize,
}

/// Polling synchronizer for a single pairwise channel.
pub struct SyncEngine<S: RemoteStore> {
    config: SyncConfig,
    codec: CryptoCodec,
    resolver: ChannelResolver,
    remote: S,
    cache: Arc<Mutex<Database>>,
    local: User,
    peer: User,
    channel: ChannelKey,
    state: ChannelState,
    /// Highest `sent_at` observed in completed ticks. In-memory only; a
    /// restart re-lists everything and lets the cache absorb the replay.
    cursor: Option<i64>,
    seen: SeenSet,
    events: mpsc::Sender<SyncEvent>,
}

impl<S: RemoteStore> SyncEngine<S> {
    /// Build an engine for the `local` <-> `peer` channel.
    ///
    /// Registers both users in the local cache (idempotent) and records a
    /// session start for the local user. Returns the engine together with
    /// the receiving end of its event stream.
    pub fn new(
        config: SyncConfig,
        remote: S,
        cache: Arc<Mutex<Database>>,
        local: User,
        peer: User,
    ) -> Result<(Self, mpsc::Receiver<SyncEvent>), SyncError> {
        for user in [&local, &peer] {
            if !user.id.is_valid() {
                return Err(SyncError::InvalidUserId(user.id.to_string()));
            }
        }

        let codec = CryptoCodec::derive(
            &config.encryption_secret,
            &config.encryption_salt,
            config.cipher_algorithm,
        );
        let resolver = ChannelResolver::new(config.remote_root.clone());
        let channel = ChannelKey::for_pair(&local.id, &peer.id);

        {
            let db = lock_cache(&cache)?;
            db.upsert_user(&local)?;
            db.mark_seen(&local.id, Utc::now())?;
            // Ensure the peer row exists without touching its session state.
            match db.get_user(&peer.id) {
                Ok(_) => {}
                Err(StoreError::NotFound) => db.upsert_user(&peer)?,
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            channel = %channel,
            local = %local.id,
            peer = %peer.id,
            cipher = %config.cipher_algorithm,
            "sync engine ready"
        );

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let engine = Self {
            config,
            codec,
            resolver,
            remote,
            cache,
            local,
            peer,
            channel,
            state: ChannelState::Uninitialized,
            cursor: None,
            seen: SeenSet::new(),
            events: event_tx,
        };
        Ok((engine, event_rx))
    }

    pub fn channel(&self) -> &ChannelKey {
        &self.channel
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn cursor(&self) -> Option<i64> {
        self.cursor
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Create the channel's remote directories if this is the first client
    /// to touch the channel. Safe against concurrent bootstrap: a peer
    /// winning the race surfaces as `AlreadyExists`, which is success here.
    pub async fn ensure_directories(&mut self) -> Result<(), SyncError> {
        if self.state != ChannelState::Uninitialized {
            return Ok(());
        }

        let dirs = [
            self.resolver.messages_dir(&self.channel),
            self.resolver.files_dir(&self.channel),
        ];
        for dir in dirs {
            match self.remote_op(self.remote.ensure_directory(&dir)).await {
                Ok(()) => info!(dir = %dir, "created channel directory"),
                Err(RemoteError::AlreadyExists(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.state = ChannelState::DirectoryEnsured;
        Ok(())
    }

    /// One synchronization pass: list the channel directory, ingest every
    /// entry not yet processed, advance the cursor.
    ///
    /// Per-entry failures are isolated: a corrupt envelope is quarantined
    /// and never retried, a transient read failure leaves the entry eligible
    /// for the next tick. Only whole-tick failures (listing, cache lock)
    /// propagate as errors.
    pub async fn poll_tick(&mut self) -> Result<TickSummary, SyncError> {
        self.ensure_directories().await?;

        let dir = self.resolver.messages_dir(&self.channel);
        let entries = self.remote_op(self.remote.list(&dir)).await?;

        let mut summary = TickSummary {
            listed: entries.len(),
            ..TickSummary::default()
        };
        let mut max_observed: Option<i64> = None;

        for entry in entries {
            if entry.is_directory || self.seen.contains(&entry.name) {
                summary.skipped += 1;
                continue;
            }

            // Watermark pre-filter: entries whose name-embedded identity lies
            // well below the cursor have usually been ingested already, so
            // an indexed local lookup replaces the remote read. The watermark
            // alone never decides: without a cache hit the entry is read and
            // ingested, so arbitrary producer clock skew cannot lose a
            // message. Unparsable names are always read.
            if let (Some((hint, iv)), Some(cursor)) = (parse_entry_name(&entry.name), self.cursor)
            {
                if hint < cursor.saturating_sub(self.config.cursor_skew_allowance_ms)
                    && self.is_cached(hint, &iv)
                {
                    self.seen.insert(&entry.name);
                    summary.skipped += 1;
                    continue;
                }
            }

            match self.ingest_entry(&entry.name).await {
                EntryOutcome::Inserted(sent_at) => {
                    summary.ingested += 1;
                    max_observed = Some(max_observed.map_or(sent_at, |m| m.max(sent_at)));
                }
                EntryOutcome::Duplicate(sent_at) => {
                    summary.duplicates += 1;
                    max_observed = Some(max_observed.map_or(sent_at, |m| m.max(sent_at)));
                }
                EntryOutcome::Vanished => summary.skipped += 1,
                EntryOutcome::Failed => summary.failed += 1,
            }
        }

        if let Some(m) = max_observed {
            self.cursor = Some(self.cursor.map_or(m, |c| c.max(m)));
        }
        self.seen.trim();
        if self.state == ChannelState::DirectoryEnsured {
            self.state = ChannelState::Polling;
        }

        debug!(
            listed = summary.listed,
            ingested = summary.ingested,
            duplicates = summary.duplicates,
            skipped = summary.skipped,
            failed = summary.failed,
            cursor = ?self.cursor,
            "poll tick complete"
        );
        Ok(summary)
    }

    /// Encrypt and publish a text message, echoing it into the local cache
    /// before the remote write so the sender sees it immediately.
    pub async fn send_text(&mut self, body: &str) -> Result<MessageRecord, SyncError> {
        self.ensure_directories().await?;
        let envelope = self.build_envelope(MessageKind::Text, body, None)?;
        self.publish(envelope, body).await
    }

    /// Encrypt and publish a file: the content goes to `files/<key>/` as a
    /// self-delimiting sealed blob, the envelope carries only the reference
    /// plus the encrypted display caption.
    pub async fn send_file(
        &mut self,
        original_name: &str,
        mime_type: &str,
        content: &[u8],
    ) -> Result<MessageRecord, SyncError> {
        if content.len() > MAX_FILE_SIZE {
            return Err(SyncError::AttachmentTooLarge {
                size: content.len(),
                max: MAX_FILE_SIZE,
            });
        }
        self.ensure_directories().await?;

        let sealed = self.codec.seal_blob(content)?;
        let attachment_id = self.upload_attachment(&sealed).await?;

        let meta = FileMeta {
            original_name: original_name.to_string(),
            byte_size: content.len() as u64,
            mime_type: mime_type.to_string(),
            attachment_id,
        };
        let envelope = self.build_envelope(MessageKind::File, original_name, Some(meta))?;
        self.publish(envelope, original_name).await
    }

    /// Download and decrypt the attachment referenced by a file message.
    pub async fn fetch_attachment(&self, meta: &FileMeta) -> Result<Vec<u8>, SyncError> {
        let path = self
            .resolver
            .attachment_path(&self.channel, &meta.attachment_id);
        let sealed = self.remote_op(self.remote.read_blob(&path)).await?;
        Ok(self.codec.open_blob(&sealed)?)
    }

    // -- internals ----------------------------------------------------------

    /// Read, decrypt and cache one remote entry.
    async fn ingest_entry(&mut self, name: &str) -> EntryOutcome {
        let path = self.resolver.message_path(&self.channel, name);

        let bytes = match self.remote_op(self.remote.read_blob(&path)).await {
            Ok(bytes) => bytes,
            // Listed but gone by the time we read it: another client's
            // cleanup, or an eventually-consistent listing. Not an error.
            Err(RemoteError::NotFound(_)) => return EntryOutcome::Vanished,
            Err(e) => {
                warn!(entry = name, error = %e, "entry unreadable, retrying next tick");
                return EntryOutcome::Failed;
            }
        };

        let envelope = match MessageEnvelope::from_bytes(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(entry = name, error = %e, "malformed envelope, quarantined");
                self.seen.insert(name);
                return EntryOutcome::Failed;
            }
        };

        // A foreign envelope in our directory is a misbehaving client, not
        // a message for this channel.
        if ChannelKey::for_pair(&envelope.sender_id, &envelope.recipient_id) != self.channel {
            warn!(entry = name, sender = %envelope.sender_id, "envelope from outside the channel, quarantined");
            self.seen.insert(name);
            return EntryOutcome::Failed;
        }

        let body = match self
            .codec
            .decrypt(&envelope.iv, &envelope.cipher_payload)
            .map(String::from_utf8)
        {
            Ok(Ok(body)) => body,
            Ok(Err(_)) | Err(_) => {
                warn!(entry = name, "envelope failed decryption, quarantined");
                self.seen.insert(name);
                return EntryOutcome::Failed;
            }
        };

        let record = MessageRecord::from_envelope(&envelope, body);
        let inserted = {
            let db = match lock_cache(&self.cache) {
                Ok(db) => db,
                Err(e) => {
                    error!(entry = name, error = %e, "local cache unavailable");
                    return EntryOutcome::Failed;
                }
            };
            db.upsert_message(&record)
        };

        match inserted {
            Ok(true) => {
                self.seen.insert(name);
                if record.sender_id != self.local.id {
                    events::emit(
                        &self.events,
                        SyncEvent::InboundMessage {
                            channel: self.channel.clone(),
                            record,
                        },
                    );
                }
                EntryOutcome::Inserted(envelope.sent_at)
            }
            Ok(false) => {
                self.seen.insert(name);
                EntryOutcome::Duplicate(envelope.sent_at)
            }
            Err(e) => {
                // Cache write failed; leave the entry unseen so the next
                // tick retries it.
                warn!(entry = name, error = %e, "cache rejected message");
                events::emit(
                    &self.events,
                    SyncEvent::CacheError {
                        channel: self.channel.clone(),
                        context: e.to_string(),
                    },
                );
                EntryOutcome::Failed
            }
        }
    }

    fn build_envelope(
        &self,
        kind: MessageKind,
        body: &str,
        file_meta: Option<FileMeta>,
    ) -> Result<MessageEnvelope, SyncError> {
        let (iv, cipher_payload) = self.codec.encrypt(body.as_bytes())?;
        Ok(MessageEnvelope {
            sender_id: self.local.id.clone(),
            sender_handle: self.local.handle.clone(),
            recipient_id: self.peer.id.clone(),
            recipient_handle: self.peer.handle.clone(),
            sent_at: Utc::now().timestamp_millis(),
            kind,
            iv,
            cipher_payload,
            file_meta,
        })
    }

    /// Cache the outbound record, then write the envelope with write-if-absent.
    ///
    /// An `AlreadyExists` collision is disambiguated by reading the occupant
    /// back: byte-identical means our own earlier write landed (retried send,
    /// success); anything else gets one regeneration with a fresh nonce.
    async fn publish(
        &mut self,
        envelope: MessageEnvelope,
        body: &str,
    ) -> Result<MessageRecord, SyncError> {
        let record = self.cache_outbound(&envelope, body)?;
        let entry_name = envelope.entry_name();
        let bytes = envelope.to_bytes()?;
        let path = self.resolver.message_path(&self.channel, &entry_name);

        match self.write_with_retry(&path, &bytes).await {
            Ok(()) => {
                self.seen.insert(&entry_name);
                debug!(entry = %entry_name, "published message");
                Ok(record)
            }
            Err(RemoteError::AlreadyExists(_)) => {
                let occupant = self.remote_op(self.remote.read_blob(&path)).await;
                if matches!(&occupant, Ok(data) if data == &bytes) {
                    self.seen.insert(&entry_name);
                    debug!(entry = %entry_name, "entry already published, treating as success");
                    return Ok(record);
                }

                info!(entry = %entry_name, "entry name occupied by a different envelope, regenerating");
                let retry = self.build_envelope(envelope.kind, body, envelope.file_meta.clone())?;
                // Re-keying the send: the echo cached under the superseded
                // identity is replaced, so the transcript keeps exactly one
                // row for this message.
                let record = {
                    let db = lock_cache(&self.cache)?;
                    db.delete_message(&envelope.sender_id, envelope.sent_at, &envelope.iv)?;
                    let record = MessageRecord::from_envelope(&retry, body.to_string());
                    db.upsert_message(&record)?;
                    record
                };
                let entry_name = retry.entry_name();
                let bytes = retry.to_bytes()?;
                let path = self.resolver.message_path(&self.channel, &entry_name);

                match self.write_with_retry(&path, &bytes).await {
                    Ok(()) => {
                        self.seen.insert(&entry_name);
                        Ok(record)
                    }
                    Err(e) => self.fail_send(e),
                }
            }
            Err(e) => self.fail_send(e),
        }
    }

    /// Indexed local lookup backing the watermark pre-filter. A cache
    /// hiccup counts as "not cached" and only costs a redundant read.
    fn is_cached(&self, sent_at: i64, iv: &[u8]) -> bool {
        match lock_cache(&self.cache) {
            Ok(db) => db.has_message(&self.channel, sent_at, iv).unwrap_or(false),
            Err(_) => false,
        }
    }

    fn cache_outbound(
        &self,
        envelope: &MessageEnvelope,
        body: &str,
    ) -> Result<MessageRecord, SyncError> {
        let record = MessageRecord::from_envelope(envelope, body.to_string());
        let db = lock_cache(&self.cache)?;
        db.upsert_message(&record)?;
        Ok(record)
    }

    async fn upload_attachment(&self, sealed: &[u8]) -> Result<Uuid, SyncError> {
        // A v4 collision is negligible, but the write-if-absent contract
        // makes handling it free: one fresh id, then give up.
        for _ in 0..2 {
            let id = Uuid::new_v4();
            let path = self.resolver.attachment_path(&self.channel, &id);
            match self.write_with_retry(&path, sealed).await {
                Ok(()) => return Ok(id),
                Err(RemoteError::AlreadyExists(_)) => continue,
                Err(e) => return self.fail_send(e),
            }
        }
        Err(SyncError::SendFailed(
            "attachment id collision persisted".to_string(),
        ))
    }

    /// Write-if-absent with a bounded number of retries on transient errors.
    async fn write_with_retry(&self, path: &str, bytes: &[u8]) -> Result<(), RemoteError> {
        let mut attempt = 0;
        loop {
            match self
                .remote_op(self.remote.write_blob(path, bytes, false))
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.config.send_retry_limit => {
                    attempt += 1;
                    warn!(path, attempt, error = %e, "transient write failure, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn fail_send<T>(&self, e: RemoteError) -> Result<T, SyncError> {
        error!(channel = %self.channel, error = %e, "outbound publish failed");
        events::emit(
            &self.events,
            SyncEvent::SendFailed {
                channel: self.channel.clone(),
                reason: e.to_string(),
            },
        );
        Err(SyncError::SendFailed(e.to_string()))
    }

    /// Run a remote store call under the configured deadline.
    async fn remote_op<T>(
        &self,
        op: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        match timeout(Duration::from_millis(self.config.store_timeout_ms), op).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(self.config.store_timeout_ms)),
        }
    }
}

enum EntryOutcome {
    Inserted(i64),
    Duplicate(i64),
    /// Listed, but gone before we could read it.
    Vanished,
    Failed,
}

fn lock_cache(cache: &Arc<Mutex<Database>>) -> Result<MutexGuard<'_, Database>, SyncError> {
    cache
        .lock()
        .map_err(|_| SyncError::CacheUnavailable("cache lock poisoned".to_string()))
}
