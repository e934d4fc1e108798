//! Deterministic mapping from a pair of users to remote-store paths.
//!
//! A channel is derived, never stored: the same two users always resolve to
//! the same channel key regardless of argument order. The resolver performs
//! no I/O; the sync engine is responsible for creating the directories it
//! points at.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{FILES_DIR, MESSAGES_DIR};
use crate::types::UserId;

/// Order-independent pairing key for exactly two users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChannelKey(String);

impl ChannelKey {
    /// Derive the key for a pair of users. Commutative:
    /// `for_pair(a, b) == for_pair(b, a)`.
    pub fn for_pair(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{lo}-{hi}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves channel keys to remote-store paths under a configured root.
#[derive(Debug, Clone)]
pub struct ChannelResolver {
    remote_root: String,
}

impl ChannelResolver {
    /// `remote_root` is an optional path prefix on the remote store; empty
    /// means the store root itself.
    pub fn new(remote_root: impl Into<String>) -> Self {
        let mut root: String = remote_root.into();
        while root.ends_with('/') {
            root.pop();
        }
        Self { remote_root: root }
    }

    /// Directory holding the message envelopes of a channel.
    pub fn messages_dir(&self, key: &ChannelKey) -> String {
        self.join(MESSAGES_DIR, key)
    }

    /// Directory holding the encrypted attachment blobs of a channel.
    pub fn files_dir(&self, key: &ChannelKey) -> String {
        self.join(FILES_DIR, key)
    }

    /// Full path of a message entry inside a channel.
    pub fn message_path(&self, key: &ChannelKey, entry_name: &str) -> String {
        format!("{}/{}", self.messages_dir(key), entry_name)
    }

    /// Full path of an attachment blob inside a channel.
    pub fn attachment_path(&self, key: &ChannelKey, attachment_id: &Uuid) -> String {
        format!("{}/{}", self.files_dir(key), attachment_id)
    }

    fn join(&self, purpose: &str, key: &ChannelKey) -> String {
        if self.remote_root.is_empty() {
            format!("{purpose}/{key}")
        } else {
            format!("{}/{purpose}/{key}", self.remote_root)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_key_commutative() {
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        assert_eq!(
            ChannelKey::for_pair(&alice, &bob),
            ChannelKey::for_pair(&bob, &alice)
        );
        assert_eq!(ChannelKey::for_pair(&alice, &bob).as_str(), "alice-bob");
    }

    #[test]
    fn test_channel_key_deterministic() {
        let a = UserId::from("user1");
        let b = UserId::from("user2");
        assert_eq!(
            ChannelKey::for_pair(&a, &b),
            ChannelKey::for_pair(&a, &b)
        );
    }

    #[test]
    fn test_paths() {
        let resolver = ChannelResolver::new("chat");
        let key = ChannelKey::for_pair(&UserId::from("bob"), &UserId::from("alice"));

        assert_eq!(resolver.messages_dir(&key), "chat/messages/alice-bob");
        assert_eq!(resolver.files_dir(&key), "chat/files/alice-bob");
        assert_eq!(
            resolver.message_path(&key, "msg_1_ab.json"),
            "chat/messages/alice-bob/msg_1_ab.json"
        );
    }

    #[test]
    fn test_empty_root_and_trailing_slash() {
        let key = ChannelKey::for_pair(&UserId::from("a"), &UserId::from("b"));

        let bare = ChannelResolver::new("");
        assert_eq!(bare.messages_dir(&key), "messages/a-b");

        let slashed = ChannelResolver::new("chat/");
        assert_eq!(slashed.messages_dir(&key), "chat/messages/a-b");
    }
}
