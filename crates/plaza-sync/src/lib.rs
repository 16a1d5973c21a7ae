//! # plaza-sync
//!
//! The synchronization and delivery engine for the Plaza client.
//!
//! Plaza messages live in three places: the peer's device, the remote
//! message log (the durable source of truth) and the relay socket (fast,
//! at-most-once push). This crate reconciles all three against the local
//! SQLite store so the app works offline and converges when connectivity
//! returns:
//!
//! - direct messages are sealed end-to-end with per-chat derived keys
//!   before anything leaves the device,
//! - outbound sends retry with backoff and park across reconnects,
//! - inbound frames and catch-up pages merge idempotently, so live push
//!   and log replay can race freely,
//! - deletions queue durably and replay after restarts,
//! - delivered/seen receipts propagate in both directions.
//!
//! Embedders open a [`SyncSession`] and render the [`SessionEvent`] stream;
//! everything else happens in background tasks.

pub mod config;
pub mod delivery;
pub mod engine;
pub mod events;
pub mod keys;
pub mod session;
pub mod store;

mod codec;
mod error;

#[cfg(test)]
mod testing;

pub use config::SyncConfig;
pub use delivery::{DeliveryState, DeliveryTracker};
pub use engine::SyncEngine;
pub use error::{Result, SyncError};
pub use events::SessionEvent;
pub use keys::{DeviceKeyStore, KeyManager};
pub use session::SyncSession;
pub use store::SharedStore;

// The identifier and row types appearing in this crate's public API.
pub use plaza_shared::{ChatId, MessageId, UserId};
pub use plaza_store::{Chat, ChatKind, Message, UnreadState};
