//! Session lifecycle: one signed-in user's wiring of store, keys, relay
//! and engine.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use plaza_net::{
    HttpRemoteLog, RemoteConfig, RemoteLog, Transport, TransportConfig, TransportNotification,
};
use plaza_shared::{ChatId, MessageId, UserId};
use plaza_store::{database, Chat, Database, Message, UnreadState};

use crate::config::SyncConfig;
use crate::engine::SyncEngine;
use crate::error::Result;
use crate::events::SessionEvent;
use crate::keys::{DeviceKeyStore, KeyManager};
use crate::store::SharedStore;

/// Handle to a running sync session.
///
/// [`open`] owns the whole setup: local database, device keypair, HTTP
/// remote log and relay websocket. The embedding UI calls the methods here
/// and renders the [`SessionEvent`] stream from the returned receiver;
/// everything else (reconnects, catch-up, retries, receipt propagation)
/// happens in background tasks.
///
/// [`open`]: SyncSession::open
pub struct SyncSession {
    engine: Arc<SyncEngine>,
    transport: Transport,
    bridge: JoinHandle<()>,
}

impl SyncSession {
    /// Open the local database, load or create the device keypair, connect
    /// to the relay and start syncing.
    ///
    /// First run on a device needs the key directory reachable; afterwards
    /// the session starts fine fully offline and reconciles on reconnect.
    pub async fn open(
        config: SyncConfig,
        user: UserId,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>)> {
        let data_dir = match &config.data_dir {
            Some(dir) => dir.clone(),
            None => database::default_data_dir()?,
        };

        let db_dir = data_dir.clone();
        let db = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&db_dir)?;
            Database::open_at(&db_dir.join(database::DB_FILE))
        })
        .await??;
        let store = SharedStore::new(db);

        let remote: Arc<dyn RemoteLog> = Arc::new(HttpRemoteLog::new(RemoteConfig {
            base_url: config.api_url.clone(),
            auth_token: config.auth_token.clone(),
            timeout: config.request_timeout,
        })?);

        let keys = Arc::new(KeyManager::new(
            user.clone(),
            DeviceKeyStore::in_dir(&data_dir),
            Arc::clone(&remote),
        ));
        keys.ensure_device_keys().await?;

        let (transport, notifications) = Transport::open(TransportConfig {
            url: config.relay_url.clone(),
            user: user.clone(),
            region: config.region.clone(),
            reconnect: config.reconnect.clone(),
        });

        let (event_tx, event_rx) = mpsc::channel(256);
        let engine = Arc::new(SyncEngine::new(
            user,
            config,
            store,
            keys,
            remote,
            transport.sender(),
            event_tx,
        ));

        let bridge = tokio::spawn(notification_loop(Arc::clone(&engine), notifications));

        Ok((
            Self {
                engine,
                transport,
                bridge,
            },
            event_rx,
        ))
    }

    /// The signed-in user.
    pub fn user(&self) -> &UserId {
        self.engine.user()
    }

    // ------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------

    /// Send an end-to-end encrypted direct message. Returns the local row
    /// immediately; delivery progress arrives as [`SessionEvent`]s.
    pub async fn send_message(
        &self,
        receiver: &UserId,
        text: String,
        media_url: Option<String>,
        reply_to: Option<&Message>,
    ) -> Result<Message> {
        self.engine
            .send_direct(receiver, text, media_url, reply_to)
            .await
    }

    /// Send a plaintext message to a group chat.
    pub async fn send_group_message(
        &self,
        group: &ChatId,
        text: String,
        media_url: Option<String>,
        reply_to: Option<&Message>,
    ) -> Result<Message> {
        self.engine.send_group(group, text, media_url, reply_to).await
    }

    /// Delete a message locally and everywhere else. The remote teardown is
    /// queued durably, so it survives restarts and connectivity loss.
    pub async fn delete_message(&self, id: &MessageId) -> Result<()> {
        self.engine.delete_message(id).await
    }

    // ------------------------------------------------------------------
    // Chat focus and sync
    // ------------------------------------------------------------------

    /// Bring a chat on screen: clears its unread state, publishes a seen
    /// receipt and schedules a catch-up pass. Returns the newest page of
    /// messages, newest first.
    pub async fn open_chat(&self, chat: &ChatId) -> Result<Vec<Message>> {
        self.engine.open_chat(chat).await
    }

    /// The previously opened chat is off screen again.
    pub async fn close_chat(&self) {
        self.engine.close_chat().await
    }

    /// Run one explicit catch-up pass (pull-to-refresh). Returns how many
    /// messages the remote log returned, duplicates included.
    pub async fn sync_chat(&self, chat: &ChatId) -> Result<usize> {
        self.engine.catch_up_chat(chat).await
    }

    /// Resolve a reply reference, back-filling a window around `anchor_ts`
    /// from the remote log when the target is not stored locally. Returns a
    /// display page ending at the target, newest first.
    pub async fn jump_to_reference(
        &self,
        chat: &ChatId,
        target: &MessageId,
        anchor_ts: i64,
    ) -> Result<Vec<Message>> {
        self.engine.backfill_reference(chat, target, anchor_ts).await
    }

    pub async fn set_typing(&self, chat: &ChatId, typing: bool) {
        self.engine.set_typing(chat, typing).await
    }

    /// Ask the relay for a user's presence; the answer arrives as a
    /// [`SessionEvent::PeerPresence`].
    pub async fn query_status(&self, user: &UserId) {
        self.engine.query_status(user).await
    }

    // ------------------------------------------------------------------
    // Local reads
    // ------------------------------------------------------------------

    /// A page of stored messages, newest first.
    pub async fn messages(&self, chat: &ChatId, limit: u32, offset: u32) -> Result<Vec<Message>> {
        let chat = chat.clone();
        self.engine
            .store()
            .with(move |db| db.get_messages(&chat, limit, offset))
            .await
    }

    /// Scroll-back page strictly older than `before_ts`, newest first.
    pub async fn messages_before(
        &self,
        chat: &ChatId,
        before_ts: i64,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let chat = chat.clone();
        self.engine
            .store()
            .with(move |db| db.get_messages_before(&chat, before_ts, limit))
            .await
    }

    /// Messages inside a closed timestamp window, newest first. Pairs with
    /// [`jump_to_reference`] to render the neighborhood of an old message.
    ///
    /// [`jump_to_reference`]: SyncSession::jump_to_reference
    pub async fn messages_in_range(
        &self,
        chat: &ChatId,
        low_ts: i64,
        high_ts: i64,
    ) -> Result<Vec<Message>> {
        let chat = chat.clone();
        self.engine
            .store()
            .with(move |db| db.get_messages_in_range(&chat, low_ts, high_ts))
            .await
    }

    /// All chats, most recently active first.
    pub async fn chats(&self) -> Result<Vec<Chat>> {
        self.engine.store().with(|db| db.list_chats()).await
    }

    /// Unread counter and divider position for one chat.
    pub async fn unread(&self, chat: &ChatId) -> Result<UnreadState> {
        let chat = chat.clone();
        self.engine
            .store()
            .with(move |db| db.get_unread(&chat))
            .await
    }

    /// Create or update chat metadata (group titles, photos, participants).
    /// Message ingest only ever creates skeleton rows; names come from here.
    pub async fn upsert_chat(&self, chat: &Chat) -> Result<()> {
        let chat = chat.clone();
        self.engine
            .store()
            .with(move |db| db.upsert_chat(&chat))
            .await
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Close the relay socket and stop the background tasks. Queued
    /// deletions are durable and drain on the next session's reconnect.
    pub async fn close(self) {
        self.transport.close().await;
        let _ = self.bridge.await;
        info!("Session closed");
    }
}

/// Forward transport notifications into the engine until the transport
/// task ends.
async fn notification_loop(
    engine: Arc<SyncEngine>,
    mut notifications: mpsc::Receiver<TransportNotification>,
) {
    info!("Relay notification bridge started");
    while let Some(notification) = notifications.recv().await {
        match notification {
            TransportNotification::Connected { reconnect } => engine.on_connected(reconnect).await,
            TransportNotification::Disconnected => engine.on_disconnected().await,
            TransportNotification::Event(event) => engine.handle_transport_event(event).await,
        }
    }
    info!("Relay notification bridge stopped");
}
