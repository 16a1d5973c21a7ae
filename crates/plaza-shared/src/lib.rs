//! # plaza-shared
//!
//! Types shared by every Plaza crate: identifiers, the tagged wire schema
//! spoken over the relay and the remote message log, and the cryptographic
//! primitives for end-to-end encrypted direct messages.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod types;
pub mod wire;

pub use crypto::{decrypt, encrypt, EncryptedPayload, KeyPair, PublicKey, SharedSecret};
pub use error::{CryptoError, KeyError, WireError};
pub use types::{epoch_ms_now, ChatId, MessageId, UserId};
pub use wire::{ClientEvent, ServerEvent, WireMessage};
