//! Realtime relay connection with tokio mpsc command/notification pattern.
//!
//! The relay event loop runs in a dedicated tokio task that owns the
//! websocket. External code communicates with it through typed command and
//! notification channels, keeping the networking layer fully asynchronous
//! and decoupled. The task reconnects on its own with bounded exponential
//! backoff; delivery over the socket is at-most-once, and closing any gap is
//! the sync engine's job, driven by the `Connected` notification.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use plaza_shared::{ClientEvent, ServerEvent, UserId};

use crate::backoff::ReconnectPolicy;
use crate::error::{NetError, Result};

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the relay task.
#[derive(Debug)]
pub enum TransportCommand {
    /// Emit one frame to the relay.
    Send(ClientEvent),
    /// Gracefully close the connection and stop the task.
    Shutdown,
}

/// Notifications sent *from* the relay task to the application.
#[derive(Debug, Clone)]
pub enum TransportNotification {
    /// The socket is up and presence has been announced.  `reconnect` is
    /// false only for the first connection of this transport's lifetime.
    Connected { reconnect: bool },
    /// The socket dropped; the task is already scheduling a reconnect.
    Disconnected,
    /// A validated frame arrived from the relay.
    Event(ServerEvent),
}

/// Configuration for opening the relay connection.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Relay websocket URL (`wss://...`).
    pub url: String,
    /// Local user, announced as online on every (re)connect.
    pub user: UserId,
    /// Region shard used for the presence announcement.
    pub region: String,
    pub reconnect: ReconnectPolicy,
}

// ---------------------------------------------------------------------------
// Transport handle
// ---------------------------------------------------------------------------

/// Owned handle to the relay task.  Dropping it (or calling [`close`]) stops
/// the task; there is no global connection state.
///
/// [`close`]: Transport::close
pub struct Transport {
    commands: mpsc::Sender<TransportCommand>,
}

impl Transport {
    /// Spawn the relay task and return the handle plus the notification
    /// stream.
    pub fn open(config: TransportConfig) -> (Self, mpsc::Receiver<TransportNotification>) {
        let (cmd_tx, cmd_rx) = mpsc::channel::<TransportCommand>(256);
        let (notif_tx, notif_rx) = mpsc::channel::<TransportNotification>(256);

        tokio::spawn(run_transport(config, cmd_rx, notif_tx));

        (Self { commands: cmd_tx }, notif_rx)
    }

    /// Queue one frame for the relay.  Fails only once the task is gone.
    pub async fn send(&self, event: ClientEvent) -> Result<()> {
        self.commands
            .send(TransportCommand::Send(event))
            .await
            .map_err(|_| NetError::ChannelClosed)
    }

    /// Clone of the command sender, for components that outlive this handle.
    pub fn sender(&self) -> mpsc::Sender<TransportCommand> {
        self.commands.clone()
    }

    /// Ask the task to close the socket and exit.
    pub async fn close(&self) {
        let _ = self.commands.send(TransportCommand::Shutdown).await;
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

async fn run_transport(
    config: TransportConfig,
    mut cmd_rx: mpsc::Receiver<TransportCommand>,
    notif_tx: mpsc::Sender<TransportNotification>,
) {
    let mut attempt: u32 = 0;
    let mut connected_before = false;

    'outer: loop {
        let stream = match connect_async(&config.url).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                let delay = config.reconnect.delay_for(attempt);
                attempt = attempt.saturating_add(1);
                warn!(
                    url = %config.url,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Relay connect failed"
                );

                // Stay responsive to shutdown while waiting out the backoff.
                // Sends have nowhere to go and are dropped; durability lives
                // in the remote log, not here.
                let sleep = tokio::time::sleep(delay);
                tokio::pin!(sleep);
                loop {
                    tokio::select! {
                        _ = &mut sleep => break,
                        cmd = cmd_rx.recv() => match cmd {
                            Some(TransportCommand::Send(_)) => {
                                debug!("Dropping frame while disconnected");
                            }
                            Some(TransportCommand::Shutdown) | None => break 'outer,
                        }
                    }
                }
                continue;
            }
        };

        attempt = 0;
        let (mut write, mut read) = stream.split();

        // Presence first, before any other traffic on the fresh socket.
        let announce = ClientEvent::UserOnline {
            user: config.user.to_string(),
            region: config.region.clone(),
        };
        match announce.to_json() {
            Ok(json) => {
                if let Err(e) = write.send(Message::Text(json)).await {
                    warn!(error = %e, "Presence announce failed, reconnecting");
                    continue;
                }
            }
            Err(e) => {
                error!(error = %e, "Presence frame failed to encode");
                break;
            }
        }

        info!(url = %config.url, reconnect = connected_before, "Relay connected");
        let _ = notif_tx
            .send(TransportNotification::Connected {
                reconnect: connected_before,
            })
            .await;
        connected_before = true;

        loop {
            tokio::select! {
                // --- Outgoing commands ---
                cmd = cmd_rx.recv() => match cmd {
                    Some(TransportCommand::Send(event)) => {
                        let json = match event.to_json() {
                            Ok(json) => json,
                            Err(e) => {
                                error!(error = %e, "Frame failed to encode, dropping");
                                continue;
                            }
                        };
                        if let Err(e) = write.send(Message::Text(json)).await {
                            warn!(error = %e, "Relay send failed, reconnecting");
                            break;
                        }
                    }
                    Some(TransportCommand::Shutdown) => {
                        info!("Transport shutdown requested");
                        let _ = write.send(Message::Close(None)).await;
                        break 'outer;
                    }
                    None => {
                        // All senders dropped
                        info!("Command channel closed, shutting down transport");
                        let _ = write.send(Message::Close(None)).await;
                        break 'outer;
                    }
                },

                // --- Incoming frames ---
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(raw))) => {
                        match ServerEvent::from_json(&raw) {
                            Ok(event) => {
                                let _ = notif_tx
                                    .send(TransportNotification::Event(event))
                                    .await;
                            }
                            Err(e) => {
                                warn!(error = %e, len = raw.len(), "Dropping malformed relay frame");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = write.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Relay closed connection");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary and pong frames carry nothing for us.
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Relay read error");
                        break;
                    }
                }
            }
        }

        let _ = notif_tx.send(TransportNotification::Disconnected).await;
    }

    info!("Transport event loop terminated");
}
