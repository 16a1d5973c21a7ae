//! Networking layer for the Plaza client: the realtime relay connection and
//! the remote message log REST client.

pub mod backoff;
pub mod remote;
pub mod transport;

mod error;

pub use backoff::ReconnectPolicy;
pub use error::NetError;
pub use remote::{HttpRemoteLog, RemoteConfig, RemoteLog};
pub use transport::{Transport, TransportCommand, TransportConfig, TransportNotification};
