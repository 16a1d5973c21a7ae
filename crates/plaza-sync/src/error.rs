use plaza_shared::{CryptoError, KeyError, MessageId, WireError};
use thiserror::Error;

/// Errors surfaced by the sync engine and session facade.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    #[error("Storage error: {0}")]
    Storage(#[from] plaza_store::StoreError),

    #[error("Network error: {0}")]
    Network(#[from] plaza_net::NetError),

    #[error("Blocking task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// A referenced message is in neither the local store nor the
    /// back-fill window of the remote log.
    #[error("Referenced message {id} could not be found")]
    ReferenceNotFound { id: MessageId },
}

pub type Result<T> = std::result::Result<T, SyncError>;
