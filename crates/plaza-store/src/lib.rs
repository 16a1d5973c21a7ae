//! # plaza-store
//!
//! Local SQLite storage for the Plaza client.
//!
//! The store holds messages in decrypted form so the client works fully
//! offline; wire-level crypto material (ciphertext, nonces, sender keys)
//! never persists here. The crate exposes a synchronous [`Database`] handle
//! that wraps a `rusqlite::Connection` and provides typed helpers for every
//! domain model. All mutation goes through these helpers, which keeps the
//! merge rules (idempotent upserts, monotonic delivered/seen flags) in one
//! place.

pub mod chats;
pub mod cursors;
pub mod database;
pub mod deletions;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod unread;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
