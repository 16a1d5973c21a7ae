use thiserror::Error;

/// Errors produced by the networking layer.
#[derive(Error, Debug)]
pub enum NetError {
    /// Connection could not be established.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// A request exceeded its deadline.
    #[error("Request timed out")]
    Timeout,

    /// The remote log answered with a non-success status.
    #[error("Remote log returned HTTP {0}")]
    Status(u16),

    /// Underlying HTTP error.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// Websocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Frame (de)serialization error.
    #[error("Wire error: {0}")]
    Wire(#[from] plaza_shared::WireError),

    /// JSON body error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The transport task is gone; the session is closing.
    #[error("Transport channel closed")]
    ChannelClosed,
}

impl From<reqwest::Error> for NetError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            NetError::Timeout
        } else if e.is_connect() {
            NetError::Connect(e.to_string())
        } else {
            NetError::Http(e)
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NetError>;
