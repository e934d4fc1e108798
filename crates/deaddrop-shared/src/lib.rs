//! # deaddrop-shared
//!
//! Core domain types shared by every deaddrop crate: the symmetric
//! encryption codec, the message envelope wire format, and the channel
//! resolver that maps a pair of users to deterministic remote-store paths.
//!
//! Nothing in this crate performs I/O.

pub mod channel;
pub mod constants;
pub mod crypto;
pub mod envelope;
pub mod types;

mod error;

pub use channel::{ChannelKey, ChannelResolver};
pub use crypto::{CipherAlgorithm, CryptoCodec};
pub use envelope::{FileMeta, MessageEnvelope};
pub use error::{CryptoError, EnvelopeError};
pub use types::{MessageKind, UserId};
