//! The reconciliation engine.
//!
//! One engine drives one session: it seals and sends outbound messages,
//! ingests live frames and catch-up pages into the store, propagates
//! delivery progress both ways, replays queued deletions, and back-fills
//! missing reply targets. Convergence rests on idempotent upserts with
//! monotonic flag merges, so live delivery and catch-up can race freely.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use plaza_net::{RemoteLog, TransportCommand};
use plaza_shared::{
    epoch_ms_now, ChatId, ClientEvent, MessageId, ServerEvent, UserId, WireError, WireMessage,
};
use plaza_store::{Chat, ChatKind, Message, PendingDeletion, StoreError};

use crate::codec;
use crate::config::SyncConfig;
use crate::delivery::{DeliveryState, DeliveryTracker, RetryDecision};
use crate::error::{Result, SyncError};
use crate::events::SessionEvent;
use crate::keys::KeyManager;
use crate::store::SharedStore;

#[derive(Default)]
struct CatchupFlags {
    running: bool,
    rerun: bool,
}

pub struct SyncEngine {
    user: UserId,
    config: SyncConfig,
    store: SharedStore,
    keys: Arc<KeyManager>,
    remote: Arc<dyn RemoteLog>,
    relay_tx: mpsc::Sender<TransportCommand>,
    events: mpsc::Sender<SessionEvent>,
    delivery: Mutex<DeliveryTracker>,
    active_chat: RwLock<Option<ChatId>>,
    catchups: Mutex<HashMap<ChatId, CatchupFlags>>,
    connected: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        user: UserId,
        config: SyncConfig,
        store: SharedStore,
        keys: Arc<KeyManager>,
        remote: Arc<dyn RemoteLog>,
        relay_tx: mpsc::Sender<TransportCommand>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let delivery = DeliveryTracker::new(config.send_retry.clone(), config.max_send_attempts);
        Self {
            user,
            config,
            store,
            keys,
            remote,
            relay_tx,
            events,
            delivery: Mutex::new(delivery),
            active_chat: RwLock::new(None),
            catchups: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(false),
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    // ------------------------------------------------------------------
    // Outbound messages
    // ------------------------------------------------------------------

    /// Compose, store, seal and send one direct message.
    ///
    /// The local row is written before anything touches the network, so the
    /// UI can render immediately; the remote append runs in the background
    /// with retries.
    pub async fn send_direct(
        self: &Arc<Self>,
        receiver: &UserId,
        text: String,
        media_url: Option<String>,
        reply_to: Option<&Message>,
    ) -> Result<Message> {
        let timestamp = epoch_ms_now();
        let chat_id = ChatId::direct(&self.user, receiver);
        let message = Message {
            id: MessageId::generate(&chat_id, timestamp),
            chat_id: chat_id.clone(),
            sender: self.user.clone(),
            receiver: Some(receiver.clone()),
            text,
            media_url,
            reply_to_id: reply_to.map(|m| m.id.clone()),
            reply_to_text: reply_to.map(|m| m.text.clone()),
            timestamp,
            delivered: false,
            seen: false,
        };

        let chat = self.chat_skeleton(&chat_id, &message);
        let stored = message.clone();
        self.store
            .with(move |db| {
                db.ensure_chat(&chat)?;
                db.upsert_message(&stored)
            })
            .await?;

        let keys = self.keys.device_keys().await?;
        let counterpart = self.keys.peer_key(receiver).await?;
        let to_seal = message.clone();
        let wire =
            tokio::task::spawn_blocking(move || codec::seal_direct(&keys, &counterpart, &to_seal))
                .await??;

        self.delivery.lock().await.track(&wire);
        self.relay(ClientEvent::SendDm { message: wire }).await;
        self.spawn_persist(message.id.clone());

        Ok(message)
    }

    /// Compose, store and send one plaintext group message.
    pub async fn send_group(
        self: &Arc<Self>,
        group: &ChatId,
        text: String,
        media_url: Option<String>,
        reply_to: Option<&Message>,
    ) -> Result<Message> {
        let timestamp = epoch_ms_now();
        let message = Message {
            id: MessageId::generate(group, timestamp),
            chat_id: group.clone(),
            sender: self.user.clone(),
            receiver: None,
            text,
            media_url,
            reply_to_id: reply_to.map(|m| m.id.clone()),
            reply_to_text: reply_to.map(|m| m.text.clone()),
            timestamp,
            delivered: false,
            seen: false,
        };

        let chat = self.chat_skeleton(group, &message);
        let stored = message.clone();
        self.store
            .with(move |db| {
                db.ensure_chat(&chat)?;
                db.upsert_message(&stored)
            })
            .await?;

        let wire = codec::group_wire(&message);
        self.delivery.lock().await.track(&wire);
        self.relay(ClientEvent::GroupMessage { message: wire }).await;
        self.spawn_persist(message.id.clone());

        Ok(message)
    }

    fn spawn_persist(self: &Arc<Self>, id: MessageId) {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.persist_with_retry(id).await });
    }

    /// Drive one message's remote append until it sticks, backing off
    /// between attempts. Exhausted attempts park the message; the next
    /// reconnect re-drives it.
    async fn persist_with_retry(&self, id: MessageId) {
        let Some(wire) = self.delivery.lock().await.begin_attempt(&id) else {
            return;
        };
        let is_group = wire.group_id.is_some();
        let chat_id = ChatId(wire.chat_id.clone());

        loop {
            match self.remote.append(&wire).await {
                Ok(()) => {
                    let mut delivery = self.delivery.lock().await;
                    delivery.mark_persisted(&id);
                    if is_group {
                        // Group tracking ends at Persisted; no per-peer acks.
                        delivery.remove(&id);
                    }
                    drop(delivery);
                    debug!(message = %id, "Message persisted to remote log");
                    self.emit(SessionEvent::MessageUpdated {
                        chat_id,
                        message_id: id,
                    })
                    .await;
                    return;
                }
                Err(e) => {
                    // Bind the decision before matching: a guard temporary in
                    // the scrutinee would live until the end of the match and
                    // self-deadlock on the re-lock in the Park arm.
                    let decision = self.delivery.lock().await.record_failure(&id);
                    match decision {
                        RetryDecision::RetryAfter(delay) => {
                            warn!(message = %id, error = %e, "Append failed; retrying");
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::Park => {
                            if self.delivery.lock().await.state(&id).is_some() {
                                warn!(message = %id, error = %e, "Append attempts exhausted; parked until reconnect");
                                self.emit(SessionEvent::SendFailed {
                                    chat_id,
                                    message_id: id,
                                })
                                .await;
                            }
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Re-drive every parked send with a fresh attempt budget.
    async fn redrive_pending(self: &Arc<Self>) {
        let pending = self.delivery.lock().await.take_pending();
        if pending.is_empty() {
            return;
        }
        info!(count = pending.len(), "Re-driving parked sends");
        for id in pending {
            self.spawn_persist(id);
        }
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Validate, decrypt and store one wire message, then propagate the
    /// side effects. `live` marks relay-pushed frames; catch-up and
    /// back-fill pages pass false and skip the per-message acks.
    pub(crate) async fn ingest_remote(self: &Arc<Self>, wire: WireMessage, live: bool) -> Result<()> {
        if let Err(e) = wire.validate() {
            warn!(error = %e, "Dropping invalid message frame");
            return Ok(());
        }

        let local = match self.open_wire(&wire).await {
            Ok(local) => local,
            Err(SyncError::Crypto(e)) => {
                warn!(message = %wire.id, error = %e, "Dropping undecryptable message");
                return Ok(());
            }
            Err(SyncError::Wire(e)) => {
                warn!(message = %wire.id, error = %e, "Dropping malformed message");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let chat_id = local.chat_id.clone();
        let message_id = local.id.clone();
        let sender = local.sender.clone();
        let inbound = sender != self.user;
        let open = self.active_chat.read().await.as_ref() == Some(&chat_id);

        let mut row = local;
        if inbound {
            row.delivered = true;
            if open {
                row.seen = true;
            }
        }

        let chat = self.chat_skeleton(&chat_id, &row);
        let stored = row.clone();
        let (fresh, unread) = self
            .store
            .with(move |db| {
                let fresh = !db.message_exists(&stored.id)?;
                db.ensure_chat(&chat)?;
                db.upsert_message(&stored)?;
                if fresh && inbound && !open {
                    db.increment_unread(&stored.chat_id, stored.timestamp)?;
                }
                let unread = if inbound && !open {
                    Some(db.get_unread(&stored.chat_id)?)
                } else {
                    None
                };
                Ok((fresh, unread))
            })
            .await?;

        if fresh {
            self.emit(SessionEvent::MessageArrived {
                message: row.clone(),
            })
            .await;
        } else {
            self.emit(SessionEvent::MessageUpdated {
                chat_id: chat_id.clone(),
                message_id: message_id.clone(),
            })
            .await;
        }
        if let Some(unread) = unread {
            self.emit(SessionEvent::UnreadChanged {
                chat_id: chat_id.clone(),
                count: unread.count,
                unread_timestamp: unread.unread_timestamp,
            })
            .await;
        }

        if inbound && live {
            let is_group = codec::group_id_of(&chat_id).is_some();
            if !is_group {
                self.relay(ClientEvent::MessageDelivered {
                    message_id: message_id.as_str().to_string(),
                    chat_id: chat_id.as_str().to_string(),
                    receiver: sender.as_str().to_string(),
                })
                .await;
                if let Err(e) = self.remote.mark_delivered(&chat_id, &message_id).await {
                    warn!(message = %message_id, error = %e, "Failed to record delivered mark");
                }
            }
            if open {
                self.publish_seen(&chat_id, row.timestamp).await;
            }
        }

        if live {
            // The cursor only moves on catch-up, so a live message ahead of
            // it may hide a gap; a coalesced pass closes it and advances
            // the cursor past this message.
            let c = chat_id.clone();
            let cursor = self.store.with(move |db| db.cursor(&c)).await?;
            if cursor.map_or(true, |c| row.timestamp > c) {
                self.schedule_catch_up(chat_id).await;
            }
        }

        Ok(())
    }

    /// Wire form to local row, decrypting sealed direct messages.
    async fn open_wire(&self, wire: &WireMessage) -> Result<Message> {
        if !wire.is_sealed() {
            return codec::group_to_local(wire);
        }

        let keys = self.keys.device_keys().await?;
        let counterpart = if wire.sender == self.user.as_str() {
            // Echo of our own message: pair with the receiver's key.
            let receiver = UserId(
                wire.receiver
                    .clone()
                    .ok_or(WireError::InvalidField("receiver"))?,
            );
            self.keys.peer_key(&receiver).await?
        } else {
            let key = codec::wire_sender_key(wire)?;
            self.keys
                .cache_peer_key(&UserId(wire.sender.clone()), key)
                .await;
            key
        };

        let wire = wire.clone();
        tokio::task::spawn_blocking(move || codec::open_direct(&keys, &counterpart, &wire)).await?
    }

    // ------------------------------------------------------------------
    // Catch-up
    // ------------------------------------------------------------------

    /// Run a catch-up pass for `chat`, coalescing concurrent requests: one
    /// pass per chat at a time, and any request landing during a running
    /// pass queues exactly one rerun.
    ///
    /// Returns a boxed future rather than using `async fn`: the spawned
    /// pass awaits `ingest_remote`, which awaits this function, and the
    /// compiler cannot Send-check that cycle of opaque future types.
    pub(crate) fn schedule_catch_up<'a>(
        self: &'a Arc<Self>,
        chat: ChatId,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            {
                let mut catchups = self.catchups.lock().await;
                let flags = catchups.entry(chat.clone()).or_default();
                if flags.running {
                    flags.rerun = true;
                    return;
                }
                flags.running = true;
            }

            let engine = Arc::clone(self);
            tokio::spawn(async move {
                loop {
                    if let Err(e) = engine.catch_up_chat(&chat).await {
                        warn!(chat = %chat, error = %e, "Catch-up failed");
                        let mut catchups = engine.catchups.lock().await;
                        if let Some(flags) = catchups.get_mut(&chat) {
                            flags.running = false;
                            flags.rerun = false;
                        }
                        return;
                    }
                    let mut catchups = engine.catchups.lock().await;
                    let flags = catchups.entry(chat.clone()).or_default();
                    if flags.rerun {
                        flags.rerun = false;
                    } else {
                        flags.running = false;
                        return;
                    }
                }
            });
        })
    }

    /// One catch-up pass: page forward from the cursor, ingest, advance.
    pub(crate) async fn catch_up_chat(self: &Arc<Self>, chat: &ChatId) -> Result<usize> {
        let c = chat.clone();
        let mut cursor = self.store.with(move |db| db.cursor(&c)).await?;
        let mut fetched = 0usize;

        loop {
            let page = self
                .remote
                .fetch_since(chat, cursor, None, self.config.sync_page_size)
                .await?;
            if page.is_empty() {
                break;
            }

            let full = page.len() == self.config.sync_page_size as usize;
            let min_ts = page.first().map(|m| m.timestamp).unwrap_or(0);
            let max_ts = page.last().map(|m| m.timestamp).unwrap_or(0);
            fetched += page.len();

            for wire in page {
                self.ingest_remote(wire, false).await?;
            }

            // A full page may split messages sharing its newest timestamp
            // across the boundary; stepping the cursor back one tick
            // re-fetches the ties, which the idempotent upsert absorbs.
            let next_cursor = if full && min_ts < max_ts {
                max_ts - 1
            } else {
                max_ts
            };
            let c = chat.clone();
            self.store
                .with(move |db| db.advance_cursor(&c, next_cursor))
                .await?;
            cursor = Some(next_cursor);

            if !full {
                break;
            }
        }

        if fetched > 0 {
            info!(chat = %chat, fetched, "Catch-up complete");
        }
        self.emit(SessionEvent::ChatSynced {
            chat_id: chat.clone(),
            fetched,
        })
        .await;
        Ok(fetched)
    }

    /// Make sure a reply target is present locally, fetching a bounded
    /// window around `anchor_ts` from the remote log if needed. Returns a
    /// display page ending at the anchor.
    pub(crate) async fn backfill_reference(
        self: &Arc<Self>,
        chat: &ChatId,
        target: &MessageId,
        anchor_ts: i64,
    ) -> Result<Vec<Message>> {
        let probe = target.clone();
        let present = self.store.with(move |db| db.message_exists(&probe)).await?;

        if !present {
            let window = self.config.backfill_window_ms;
            debug!(chat = %chat, target = %target, "Back-filling reference window");
            let page = self
                .remote
                .fetch_since(
                    chat,
                    Some(anchor_ts.saturating_sub(window)),
                    Some(anchor_ts.saturating_add(window)),
                    self.config.sync_page_size,
                )
                .await?;
            for wire in page {
                self.ingest_remote(wire, false).await?;
            }

            let probe = target.clone();
            if !self.store.with(move |db| db.message_exists(&probe)).await? {
                return Err(SyncError::ReferenceNotFound { id: target.clone() });
            }
        }

        let c = chat.clone();
        let limit = self.config.sync_page_size;
        Ok(self
            .store
            .with(move |db| db.get_messages_before(&c, anchor_ts + 1, limit))
            .await?)
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Delete a message locally and queue the remote-side teardown.
    ///
    /// The local row disappears immediately; the relay event, the log
    /// delete and the media delete ride a durable tombstone that drains
    /// now if connected, or on the next reconnect.
    pub async fn delete_message(self: &Arc<Self>, id: &MessageId) -> Result<()> {
        let lookup = id.clone();
        let message = match self.store.with(move |db| db.get_message(&lookup)).await {
            Ok(message) => message,
            Err(SyncError::Storage(StoreError::NotFound)) => return Ok(()),
            Err(e) => return Err(e),
        };

        let is_group = codec::group_id_of(&message.chat_id).is_some();
        let target = if is_group {
            None
        } else if message.sender == self.user {
            message.receiver.clone()
        } else {
            Some(message.sender.clone())
        };

        let deletion = PendingDeletion {
            message_id: id.clone(),
            chat_id: message.chat_id.clone(),
            target,
            is_group,
            media_url: message.media_url.clone(),
            queued_at: epoch_ms_now(),
        };

        let unseen_inbound = !message.seen && message.sender != self.user;
        let entry = deletion.clone();
        let removal = id.clone();
        let unread = self
            .store
            .with(move |db| {
                db.delete_message(&removal)?;
                db.enqueue_pending_deletion(&entry)?;
                if unseen_inbound {
                    db.decrement_unread(&entry.chat_id)?;
                    return db.get_unread(&entry.chat_id).map(Some);
                }
                Ok(None)
            })
            .await?;

        self.delivery.lock().await.remove(id);
        self.emit(SessionEvent::MessageDeleted {
            chat_id: message.chat_id.clone(),
            message_id: id.clone(),
        })
        .await;
        if let Some(unread) = unread {
            self.emit(SessionEvent::UnreadChanged {
                chat_id: message.chat_id.clone(),
                count: unread.count,
                unread_timestamp: unread.unread_timestamp,
            })
            .await;
        }

        if self.connected.load(Ordering::SeqCst) {
            if let Err(e) = self.replay_deletions().await {
                debug!(error = %e, "Deletion replay deferred to reconnect");
            }
        }
        Ok(())
    }

    /// Drain the tombstone queue in enqueue order. Each entry pushes the
    /// relay event, deletes the log entry, deletes its media, then clears
    /// the tombstone. Every step is idempotent; a failure stops the drain
    /// and the next reconnect retries from the failed entry.
    pub(crate) async fn replay_deletions(&self) -> Result<()> {
        let queue = self.store.with(|db| db.list_pending_deletions()).await?;

        for entry in queue {
            if entry.is_group {
                if let Some(group_id) = codec::group_id_of(&entry.chat_id) {
                    self.relay(ClientEvent::GroupMessageDeleted {
                        message_id: entry.message_id.as_str().to_string(),
                        group_id,
                    })
                    .await;
                }
            } else if let Some(receiver) = &entry.target {
                self.relay(ClientEvent::MessageDeleted {
                    message_id: entry.message_id.as_str().to_string(),
                    chat_id: entry.chat_id.as_str().to_string(),
                    receiver: receiver.as_str().to_string(),
                })
                .await;
            }

            self.remote
                .delete_message(&entry.chat_id, &entry.message_id)
                .await?;
            if let Some(media) = &entry.media_url {
                self.remote.delete_media(media, &entry.message_id).await?;
            }

            let id = entry.message_id.clone();
            self.store
                .with(move |db| db.clear_pending_deletion(&id))
                .await?;
            debug!(message = %entry.message_id, "Deletion replayed");
        }
        Ok(())
    }

    /// A peer deleted a message; mirror it locally. Idempotent.
    async fn apply_peer_deletion(&self, chat: ChatId, id: MessageId) {
        let lookup = id.clone();
        let me = self.user.clone();
        let result = self
            .store
            .with(move |db| {
                let message = match db.get_message(&lookup) {
                    Ok(message) => message,
                    Err(StoreError::NotFound) => return Ok(None),
                    Err(e) => return Err(e),
                };
                db.delete_message(&lookup)?;
                if !message.seen && message.sender != me {
                    db.decrement_unread(&message.chat_id)?;
                    let unread = db.get_unread(&message.chat_id)?;
                    return Ok(Some(Some(unread)));
                }
                Ok(Some(None))
            })
            .await;

        match result {
            Ok(Some(unread)) => {
                self.delivery.lock().await.remove(&id);
                self.emit(SessionEvent::MessageDeleted {
                    chat_id: chat.clone(),
                    message_id: id,
                })
                .await;
                if let Some(unread) = unread {
                    self.emit(SessionEvent::UnreadChanged {
                        chat_id: chat,
                        count: unread.count,
                        unread_timestamp: unread.unread_timestamp,
                    })
                    .await;
                }
            }
            Ok(None) => debug!(message = %id, "Peer deletion for unknown message"),
            Err(e) => warn!(message = %id, error = %e, "Failed to apply peer deletion"),
        }
    }

    // ------------------------------------------------------------------
    // Receipts and presence
    // ------------------------------------------------------------------

    async fn apply_delivered_receipt(&self, chat: ChatId, id: MessageId) {
        let flip = id.clone();
        match self.store.with(move |db| db.mark_delivered(&flip)).await {
            Ok(changed) => {
                self.delivery
                    .lock()
                    .await
                    .advance(&id, DeliveryState::Delivered);
                if changed {
                    self.emit(SessionEvent::MessageUpdated {
                        chat_id: chat,
                        message_id: id,
                    })
                    .await;
                }
            }
            Err(e) => warn!(message = %id, error = %e, "Failed to apply delivered receipt"),
        }
    }

    async fn apply_seen_receipt(&self, chat: ChatId, reader: UserId, seen_up_to: i64) {
        let c = chat.clone();
        let r = reader.clone();
        match self
            .store
            .with(move |db| db.mark_seen_up_to(&c, seen_up_to, &r))
            .await
        {
            Ok(flipped) => {
                self.delivery.lock().await.seen_up_to(&chat, seen_up_to);
                if flipped > 0 {
                    self.emit(SessionEvent::MessagesSeen {
                        chat_id: chat,
                        user: reader,
                        seen_up_to,
                    })
                    .await;
                }
            }
            Err(e) => warn!(chat = %chat, error = %e, "Failed to apply seen receipt"),
        }
    }

    /// Publish a seen receipt for everything up to `seen_up_to`.
    async fn publish_seen(&self, chat: &ChatId, seen_up_to: i64) {
        self.relay(ClientEvent::SeenMessages {
            chat_id: chat.as_str().to_string(),
            user: self.user.as_str().to_string(),
            seen_up_to,
        })
        .await;
        if let Err(e) = self.remote.mark_seen(chat, &self.user, seen_up_to).await {
            warn!(chat = %chat, error = %e, "Failed to record seen mark");
        }
    }

    // ------------------------------------------------------------------
    // Chat focus
    // ------------------------------------------------------------------

    /// Mark `chat` as on screen: flips its unseen inbound rows, resets the
    /// unread counter, publishes a seen receipt and schedules a catch-up
    /// pass. Returns the most recent page for display.
    pub(crate) async fn open_chat(self: &Arc<Self>, chat: &ChatId) -> Result<Vec<Message>> {
        *self.active_chat.write().await = Some(chat.clone());

        let me = self.user.clone();
        let c = chat.clone();
        let limit = self.config.sync_page_size;
        let (flipped, rows) = self
            .store
            .with(move |db| {
                let unread = db.get_unread(&c)?;
                let boundary = unread.unread_timestamp.unwrap_or(0);
                let flipped = db.mark_seen_since(&c, boundary, &me)?;
                db.reset_unread(&c)?;
                let rows = db.get_messages(&c, limit, 0)?;
                Ok((flipped, rows))
            })
            .await?;

        if flipped > 0 {
            debug!(chat = %chat, flipped, "Marked backlog seen");
        }
        self.emit(SessionEvent::UnreadChanged {
            chat_id: chat.clone(),
            count: 0,
            unread_timestamp: None,
        })
        .await;
        self.publish_seen(chat, epoch_ms_now()).await;
        self.schedule_catch_up(chat.clone()).await;

        Ok(rows)
    }

    pub(crate) async fn close_chat(&self) {
        *self.active_chat.write().await = None;
    }

    pub(crate) async fn set_typing(&self, chat: &ChatId, typing: bool) {
        let event = if typing {
            ClientEvent::Typing {
                chat_id: chat.as_str().to_string(),
                user: self.user.as_str().to_string(),
            }
        } else {
            ClientEvent::StoppedTyping {
                chat_id: chat.as_str().to_string(),
                user: self.user.as_str().to_string(),
            }
        };
        self.relay(event).await;
    }

    pub(crate) async fn query_status(&self, user: &UserId) {
        self.relay(ClientEvent::GetStatus {
            user: user.as_str().to_string(),
        })
        .await;
    }

    // ------------------------------------------------------------------
    // Transport notifications
    // ------------------------------------------------------------------

    pub(crate) async fn on_connected(self: &Arc<Self>, reconnect: bool) {
        self.connected.store(true, Ordering::SeqCst);
        info!(reconnect, "Relay session established");
        self.emit(SessionEvent::Connected { reconnect }).await;

        if let Err(e) = self.replay_deletions().await {
            warn!(error = %e, "Deletion replay interrupted; will retry on reconnect");
        }
        self.redrive_pending().await;

        match self.store.with(|db| db.list_chats()).await {
            Ok(chats) => {
                for chat in chats {
                    self.schedule_catch_up(chat.id).await;
                }
            }
            Err(e) => warn!(error = %e, "Could not list chats for catch-up"),
        }
    }

    pub(crate) async fn on_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.emit(SessionEvent::Disconnected).await;
    }

    pub(crate) async fn handle_transport_event(self: &Arc<Self>, event: ServerEvent) {
        match event {
            ServerEvent::ReceiveDm { message } | ServerEvent::GroupMessage { message } => {
                if let Err(e) = self.ingest_remote(message, true).await {
                    warn!(error = %e, "Failed to ingest live message");
                }
            }
            ServerEvent::MessageDeleted {
                message_id,
                chat_id,
            } => {
                self.apply_peer_deletion(ChatId(chat_id), MessageId(message_id))
                    .await;
            }
            ServerEvent::GroupMessageDeleted {
                message_id,
                group_id,
            } => {
                self.apply_peer_deletion(ChatId::group(group_id), MessageId(message_id))
                    .await;
            }
            ServerEvent::MessageDelivered {
                message_id,
                chat_id,
            } => {
                self.apply_delivered_receipt(ChatId(chat_id), MessageId(message_id))
                    .await;
            }
            ServerEvent::SeenMessages {
                chat_id,
                user,
                seen_up_to,
            } => {
                self.apply_seen_receipt(ChatId(chat_id), UserId(user), seen_up_to)
                    .await;
            }
            ServerEvent::Typing { chat_id, user } => {
                self.emit(SessionEvent::Typing {
                    chat_id: ChatId(chat_id),
                    user: UserId(user),
                    typing: true,
                })
                .await;
            }
            ServerEvent::StoppedTyping { chat_id, user } => {
                self.emit(SessionEvent::Typing {
                    chat_id: ChatId(chat_id),
                    user: UserId(user),
                    typing: false,
                })
                .await;
            }
            ServerEvent::StatusResponse {
                user,
                online,
                last_seen,
            } => {
                self.emit(SessionEvent::PeerPresence {
                    user: UserId(user),
                    online,
                    last_seen,
                })
                .await;
            }
            ServerEvent::UserOnline { user } => {
                self.emit(SessionEvent::PeerPresence {
                    user: UserId(user),
                    online: true,
                    last_seen: None,
                })
                .await;
            }
            ServerEvent::UserOffline { user } => {
                self.emit(SessionEvent::PeerPresence {
                    user: UserId(user),
                    online: false,
                    last_seen: Some(epoch_ms_now()),
                })
                .await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    async fn emit(&self, event: SessionEvent) {
        if self.events.send(event).await.is_err() {
            debug!("Event receiver dropped");
        }
    }

    async fn relay(&self, event: ClientEvent) {
        if self
            .relay_tx
            .send(TransportCommand::Send(event))
            .await
            .is_err()
        {
            warn!("Relay channel closed; frame dropped");
        }
    }

    /// Minimal chat row derived from a message, for chats the store has
    /// never seen. Group metadata arrives later through `upsert_chat`.
    fn chat_skeleton(&self, chat_id: &ChatId, message: &Message) -> Chat {
        let kind = if codec::group_id_of(chat_id).is_some() {
            ChatKind::Group
        } else {
            ChatKind::Direct
        };
        let participants = match kind {
            ChatKind::Direct => {
                let mut participants = vec![message.sender.clone()];
                if let Some(receiver) = &message.receiver {
                    participants.push(receiver.clone());
                }
                participants.sort();
                participants.dedup();
                participants
            }
            ChatKind::Group => Vec::new(),
        };
        Chat {
            id: chat_id.clone(),
            kind,
            participants,
            display_name: None,
            photo_url: None,
            created_at: message.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use plaza_net::ReconnectPolicy;
    use plaza_shared::KeyPair;
    use plaza_store::Database;

    use crate::keys::DeviceKeyStore;
    use crate::testing::MemoryRemoteLog;

    struct Harness {
        engine: Arc<SyncEngine>,
        store: SharedStore,
        keys: Arc<KeyManager>,
        events: mpsc::Receiver<SessionEvent>,
        relay: mpsc::Receiver<TransportCommand>,
        _key_dir: tempfile::TempDir,
    }

    async fn harness(user: &str, remote: Arc<MemoryRemoteLog>) -> Harness {
        let key_dir = tempfile::tempdir().unwrap();
        let store = SharedStore::new(Database::open_in_memory().unwrap());
        let keys = Arc::new(KeyManager::new(
            UserId::new(user),
            DeviceKeyStore::in_dir(key_dir.path()),
            remote.clone(),
        ));
        keys.ensure_device_keys().await.unwrap();

        let (relay_tx, relay_rx) = mpsc::channel(256);
        // Tests drain events only after the engine call returns, so the
        // buffer must hold a full catch-up page's worth (two per message).
        let (event_tx, event_rx) = mpsc::channel(1024);

        let config = SyncConfig {
            send_retry: ReconnectPolicy {
                initial: Duration::from_millis(1),
                multiplier: 1.0,
                max: Duration::from_millis(2),
            },
            max_send_attempts: 2,
            ..SyncConfig::default()
        };

        let engine = Arc::new(SyncEngine::new(
            UserId::new(user),
            config,
            store.clone(),
            keys.clone(),
            remote as Arc<dyn RemoteLog>,
            relay_tx,
            event_tx,
        ));

        Harness {
            engine,
            store,
            keys,
            events: event_rx,
            relay: relay_rx,
            _key_dir: key_dir,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    async fn wait_for_event(
        rx: &mut mpsc::Receiver<SessionEvent>,
        matches: impl Fn(&SessionEvent) -> bool,
    ) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = rx.recv().await.expect("event channel closed");
                if matches(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event not observed in time")
    }

    fn drain_relay(rx: &mut mpsc::Receiver<TransportCommand>) -> Vec<ClientEvent> {
        let mut frames = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            if let TransportCommand::Send(event) = cmd {
                frames.push(event);
            }
        }
        frames
    }

    fn dm_chat() -> ChatId {
        ChatId::direct(&UserId::new("amir"), &UserId::new("ursula"))
    }

    async fn rows_of(store: &SharedStore, chat: &ChatId) -> Vec<Message> {
        let c = chat.clone();
        store
            .with(move |db| db.get_messages(&c, 500, 0))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn send_direct_stores_seals_and_persists() {
        let remote = Arc::new(MemoryRemoteLog::new());
        let mut amir = harness("amir", remote.clone()).await;
        let _ursula = harness("ursula", remote.clone()).await;

        let sent = amir
            .engine
            .send_direct(&UserId::new("ursula"), "meet at noon".into(), None, None)
            .await
            .unwrap();

        // Local row is immediate and plaintext.
        let rows = rows_of(&amir.store, &dm_chat()).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "meet at noon");
        assert!(!rows[0].delivered);

        // The background append lands sealed.
        wait_until(|| remote.stored_ids().contains(&sent.id.as_str().to_string())).await;
        let stored = remote
            .fetch_since(&dm_chat(), None, None, 10)
            .await
            .unwrap();
        assert!(stored[0].is_sealed());
        assert!(stored[0].text.is_none());

        // And the relay saw the outbound frame.
        let frames = drain_relay(&mut amir.relay);
        assert!(frames
            .iter()
            .any(|f| matches!(f, ClientEvent::SendDm { message } if message.id == sent.id.as_str())));
    }

    #[tokio::test]
    async fn offline_receiver_catches_up_decrypted_and_delivered() {
        let remote = Arc::new(MemoryRemoteLog::new());
        let amir = harness("amir", remote.clone()).await;
        let ursula = harness("ursula", remote.clone()).await;

        let sent = amir
            .engine
            .send_direct(&UserId::new("ursula"), "you around?".into(), None, None)
            .await
            .unwrap();
        wait_until(|| remote.stored_ids().contains(&sent.id.as_str().to_string())).await;

        // Ursula was offline for the live push; the log closes the gap.
        let fetched = ursula.engine.catch_up_chat(&dm_chat()).await.unwrap();
        assert_eq!(fetched, 1);

        let rows = rows_of(&ursula.store, &dm_chat()).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "you around?");
        assert!(rows[0].delivered, "catch-up ingest marks inbound delivered");

        // Cursor advanced: a second pass fetches nothing.
        assert_eq!(ursula.engine.catch_up_chat(&dm_chat()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn disjoint_offline_writes_converge_after_catch_up() {
        let remote = Arc::new(MemoryRemoteLog::new());
        let amir = harness("amir", remote.clone()).await;
        let ursula = harness("ursula", remote.clone()).await;

        amir.engine
            .send_direct(&UserId::new("ursula"), "first".into(), None, None)
            .await
            .unwrap();
        ursula
            .engine
            .send_direct(&UserId::new("amir"), "second".into(), None, None)
            .await
            .unwrap();
        wait_until(|| remote.stored_ids().len() == 2).await;

        amir.engine.catch_up_chat(&dm_chat()).await.unwrap();
        ursula.engine.catch_up_chat(&dm_chat()).await.unwrap();

        let amir_view: Vec<(String, String)> = rows_of(&amir.store, &dm_chat())
            .await
            .into_iter()
            .map(|m| (m.id.as_str().to_string(), m.text))
            .collect();
        let ursula_view: Vec<(String, String)> = rows_of(&ursula.store, &dm_chat())
            .await
            .into_iter()
            .map(|m| (m.id.as_str().to_string(), m.text))
            .collect();

        assert_eq!(amir_view.len(), 2);
        assert_eq!(amir_view, ursula_view, "stores must converge in content and order");
    }

    #[tokio::test]
    async fn live_ingest_with_chat_open_marks_seen_and_acks() {
        let remote = Arc::new(MemoryRemoteLog::new());
        let amir = harness("amir", remote.clone()).await;
        let mut ursula = harness("ursula", remote.clone()).await;

        let sent = amir
            .engine
            .send_direct(&UserId::new("ursula"), "ping".into(), None, None)
            .await
            .unwrap();
        wait_until(|| remote.stored_ids().contains(&sent.id.as_str().to_string())).await;
        let wire = remote
            .fetch_since(&dm_chat(), None, None, 10)
            .await
            .unwrap()
            .remove(0);

        ursula.engine.open_chat(&dm_chat()).await.unwrap();
        drain_relay(&mut ursula.relay);

        ursula
            .engine
            .handle_transport_event(ServerEvent::ReceiveDm { message: wire })
            .await;

        let rows = rows_of(&ursula.store, &dm_chat()).await;
        assert!(rows[0].seen, "open chat means instantly seen");

        let c = dm_chat();
        let unread = ursula
            .store
            .with(move |db| db.get_unread(&c))
            .await
            .unwrap();
        assert_eq!(unread.count, 0);

        let frames = drain_relay(&mut ursula.relay);
        assert!(frames
            .iter()
            .any(|f| matches!(f, ClientEvent::MessageDelivered { message_id, .. } if *message_id == sent.id.as_str())));
        assert!(frames
            .iter()
            .any(|f| matches!(f, ClientEvent::SeenMessages { .. })));
        assert_eq!(remote.delivered_ids(), vec![sent.id.as_str().to_string()]);

        wait_for_event(&mut ursula.events, |e| {
            matches!(e, SessionEvent::MessageArrived { message } if message.text == "ping")
        })
        .await;
    }

    #[tokio::test]
    async fn live_ingest_with_chat_closed_counts_unread_once() {
        let remote = Arc::new(MemoryRemoteLog::new());
        let amir = harness("amir", remote.clone()).await;
        let mut ursula = harness("ursula", remote.clone()).await;

        let sent = amir
            .engine
            .send_direct(&UserId::new("ursula"), "knock".into(), None, None)
            .await
            .unwrap();
        wait_until(|| remote.stored_ids().contains(&sent.id.as_str().to_string())).await;
        let wire = remote
            .fetch_since(&dm_chat(), None, None, 10)
            .await
            .unwrap()
            .remove(0);

        ursula
            .engine
            .handle_transport_event(ServerEvent::ReceiveDm {
                message: wire.clone(),
            })
            .await;
        // Duplicate push (relay redelivery or catch-up race).
        ursula
            .engine
            .handle_transport_event(ServerEvent::ReceiveDm { message: wire })
            .await;

        let c = dm_chat();
        let unread = ursula
            .store
            .with(move |db| db.get_unread(&c))
            .await
            .unwrap();
        assert_eq!(unread.count, 1, "duplicates must not inflate unread");
        assert_eq!(unread.unread_timestamp, Some(sent.timestamp));

        wait_for_event(&mut ursula.events, |e| {
            matches!(e, SessionEvent::UnreadChanged { count: 1, .. })
        })
        .await;
    }

    #[tokio::test]
    async fn offline_deletion_drains_on_reconnect() {
        let remote = Arc::new(MemoryRemoteLog::new());
        let mut amir = harness("amir", remote.clone()).await;
        let _ursula = harness("ursula", remote.clone()).await;

        let sent = amir
            .engine
            .send_direct(
                &UserId::new("ursula"),
                "regret this".into(),
                Some("https://cdn.plaza.app/m/9.jpg".into()),
                None,
            )
            .await
            .unwrap();
        wait_until(|| remote.stored_ids().contains(&sent.id.as_str().to_string())).await;

        // Offline: the local row goes away, the teardown waits in the queue.
        remote.set_offline(true);
        amir.engine.delete_message(&sent.id).await.unwrap();

        assert!(rows_of(&amir.store, &dm_chat()).await.is_empty());
        let queued = amir
            .store
            .with(|db| db.list_pending_deletions())
            .await
            .unwrap();
        assert_eq!(queued.len(), 1);
        assert!(remote.deleted_message_ids().is_empty());

        // Reconnect drains the queue in order.
        remote.set_offline(false);
        amir.engine.on_connected(true).await;
        wait_until(|| !remote.deleted_message_ids().is_empty()).await;

        assert_eq!(
            remote.deleted_message_ids(),
            vec![sent.id.as_str().to_string()]
        );
        assert_eq!(
            remote.deleted_media_urls(),
            vec!["https://cdn.plaza.app/m/9.jpg".to_string()]
        );
        assert!(remote.stored_ids().is_empty());
        let queued = amir
            .store
            .with(|db| db.list_pending_deletions())
            .await
            .unwrap();
        assert!(queued.is_empty());

        let frames = drain_relay(&mut amir.relay);
        assert!(frames.iter().any(|f| matches!(
            f,
            ClientEvent::MessageDeleted { message_id, receiver, .. }
                if *message_id == sent.id.as_str() && receiver == "ursula"
        )));
    }

    #[tokio::test]
    async fn parked_send_redrives_on_reconnect() {
        let remote = Arc::new(MemoryRemoteLog::new());
        let mut amir = harness("amir", remote.clone()).await;
        let _ursula = harness("ursula", remote.clone()).await;

        // Warm the peer key cache, then cut the network.
        amir.keys.peer_key(&UserId::new("ursula")).await.unwrap();
        remote.set_offline(true);

        let sent = amir
            .engine
            .send_direct(&UserId::new("ursula"), "into the void".into(), None, None)
            .await
            .unwrap();

        wait_for_event(&mut amir.events, |e| {
            matches!(e, SessionEvent::SendFailed { message_id, .. } if *message_id == sent.id)
        })
        .await;
        assert!(remote.stored_ids().is_empty());

        remote.set_offline(false);
        amir.engine.on_connected(true).await;
        wait_until(|| remote.stored_ids().contains(&sent.id.as_str().to_string())).await;
        assert_eq!(remote.append_count(), 1, "failed attempts never reach the log");
    }

    #[tokio::test]
    async fn full_pages_never_skip_boundary_rows() {
        let remote = Arc::new(MemoryRemoteLog::new());
        let ursula = harness("ursula", remote.clone()).await;
        let group = ChatId::group("plaza-regulars");

        // One more message than a page holds, with strictly increasing
        // timestamps, so the first page ends exactly on a row boundary.
        let base = 1_700_000_000_000i64;
        let total = SyncConfig::default().sync_page_size as i64 + 1;
        for i in 0..total {
            let message = Message {
                id: MessageId::generate(&group, base + i),
                chat_id: group.clone(),
                sender: UserId::new("amir"),
                receiver: None,
                text: format!("update {i}"),
                media_url: None,
                reply_to_id: None,
                reply_to_text: None,
                timestamp: base + i,
                delivered: false,
                seen: false,
            };
            remote.seed(codec::group_wire(&message));
        }

        ursula.engine.catch_up_chat(&group).await.unwrap();

        let rows = rows_of(&ursula.store, &group).await;
        assert_eq!(rows.len(), total as usize, "boundary row must not be lost");

        let g = group.clone();
        let cursor = ursula.store.with(move |db| db.cursor(&g)).await.unwrap();
        assert_eq!(cursor, Some(base + total - 1));
        assert_eq!(ursula.engine.catch_up_chat(&group).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn seen_receipt_flips_sender_rows_in_one_sweep() {
        let remote = Arc::new(MemoryRemoteLog::new());
        let mut amir = harness("amir", remote.clone()).await;
        let _ursula = harness("ursula", remote.clone()).await;

        let first = amir
            .engine
            .send_direct(&UserId::new("ursula"), "one".into(), None, None)
            .await
            .unwrap();
        let second = amir
            .engine
            .send_direct(&UserId::new("ursula"), "two".into(), None, None)
            .await
            .unwrap();
        wait_until(|| remote.stored_ids().len() == 2).await;

        amir.engine
            .handle_transport_event(ServerEvent::SeenMessages {
                chat_id: dm_chat().as_str().to_string(),
                user: "ursula".to_string(),
                seen_up_to: second.timestamp,
            })
            .await;

        let rows = rows_of(&amir.store, &dm_chat()).await;
        assert!(rows.iter().all(|m| m.seen && m.delivered));

        wait_for_event(&mut amir.events, |e| {
            matches!(e, SessionEvent::MessagesSeen { seen_up_to, .. } if *seen_up_to == second.timestamp)
        })
        .await;
        let _ = first;
    }

    #[tokio::test]
    async fn backfill_recovers_a_pruned_reply_target() {
        let remote = Arc::new(MemoryRemoteLog::new());
        let amir = harness("amir", remote.clone()).await;
        let ursula = harness("ursula", remote.clone()).await;

        let old = amir
            .engine
            .send_direct(&UserId::new("ursula"), "the original".into(), None, None)
            .await
            .unwrap();
        wait_until(|| remote.stored_ids().contains(&old.id.as_str().to_string())).await;

        // Ursula's cursor is already past the target, so a plain catch-up
        // would never fetch it.
        let c = dm_chat();
        let past = old.timestamp + 1_000;
        ursula
            .store
            .with(move |db| db.advance_cursor(&c, past))
            .await
            .unwrap();
        assert_eq!(ursula.engine.catch_up_chat(&dm_chat()).await.unwrap(), 0);

        let page = ursula
            .engine
            .backfill_reference(&dm_chat(), &old.id, old.timestamp)
            .await
            .unwrap();
        assert!(page.iter().any(|m| m.id == old.id));
        assert_eq!(page[0].text, "the original");

        let ghost = MessageId("dm:amir:ursula:0000000000000:deadbeef".to_string());
        let err = ursula
            .engine
            .backfill_reference(&dm_chat(), &ghost, old.timestamp)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ReferenceNotFound { .. }));
    }

    #[tokio::test]
    async fn undecryptable_and_invalid_frames_are_dropped() {
        let remote = Arc::new(MemoryRemoteLog::new());
        let ursula = harness("ursula", remote.clone()).await;

        // Sealed with a key nobody holds.
        let stranger = KeyPair::generate();
        let chat = dm_chat();
        let bogus = Message {
            id: MessageId::generate(&chat, 1_700_000_000_000),
            chat_id: chat.clone(),
            sender: UserId::new("amir"),
            receiver: Some(UserId::new("ursula")),
            text: "garbled".to_string(),
            media_url: None,
            reply_to_id: None,
            reply_to_text: None,
            timestamp: 1_700_000_000_000,
            delivered: false,
            seen: false,
        };
        let sealed = codec::seal_direct(&stranger, &KeyPair::generate().public_key(), &bogus).unwrap();
        ursula
            .engine
            .handle_transport_event(ServerEvent::ReceiveDm { message: sealed })
            .await;

        // Fails validation outright.
        let mut invalid = codec::group_wire(&bogus);
        invalid.timestamp = 0;
        ursula
            .engine
            .handle_transport_event(ServerEvent::ReceiveDm { message: invalid })
            .await;

        assert!(rows_of(&ursula.store, &chat).await.is_empty());
    }

    #[tokio::test]
    async fn open_chat_resets_unread_and_publishes_receipt() {
        let remote = Arc::new(MemoryRemoteLog::new());
        let amir = harness("amir", remote.clone()).await;
        let mut ursula = harness("ursula", remote.clone()).await;

        for text in ["one", "two"] {
            let sent = amir
                .engine
                .send_direct(&UserId::new("ursula"), text.into(), None, None)
                .await
                .unwrap();
            wait_until(|| remote.stored_ids().contains(&sent.id.as_str().to_string())).await;
            let wire = remote
                .fetch_since(&dm_chat(), None, None, 10)
                .await
                .unwrap()
                .into_iter()
                .find(|w| w.id == sent.id.as_str())
                .unwrap();
            ursula
                .engine
                .handle_transport_event(ServerEvent::ReceiveDm { message: wire })
                .await;
        }

        let c = dm_chat();
        let unread = ursula
            .store
            .with(move |db| db.get_unread(&c))
            .await
            .unwrap();
        assert_eq!(unread.count, 2);

        let rows = ursula.engine.open_chat(&dm_chat()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|m| m.seen));

        let c = dm_chat();
        let unread = ursula
            .store
            .with(move |db| db.get_unread(&c))
            .await
            .unwrap();
        assert_eq!(unread.count, 0);

        let frames = drain_relay(&mut ursula.relay);
        assert!(frames
            .iter()
            .any(|f| matches!(f, ClientEvent::SeenMessages { user, .. } if user == "ursula")));
        assert!(!remote.seen_marks().is_empty());

        wait_for_event(&mut ursula.events, |e| {
            matches!(e, SessionEvent::UnreadChanged { count: 0, .. })
        })
        .await;
    }

    #[tokio::test]
    async fn group_messages_skip_crypto_and_delivered_acks() {
        let remote = Arc::new(MemoryRemoteLog::new());
        let mut amir = harness("amir", remote.clone()).await;
        let mut ursula = harness("ursula", remote.clone()).await;
        let group = ChatId::group("plaza-regulars");

        let sent = amir
            .engine
            .send_group(&group, "meeting tonight".into(), None, None)
            .await
            .unwrap();
        wait_until(|| remote.stored_ids().contains(&sent.id.as_str().to_string())).await;

        let g = group.clone();
        let wire = remote.fetch_since(&g, None, None, 10).await.unwrap().remove(0);
        assert!(!wire.is_sealed());

        ursula
            .engine
            .handle_transport_event(ServerEvent::GroupMessage { message: wire })
            .await;

        let rows = rows_of(&ursula.store, &group).await;
        assert_eq!(rows[0].text, "meeting tonight");

        let frames = drain_relay(&mut ursula.relay);
        assert!(
            !frames
                .iter()
                .any(|f| matches!(f, ClientEvent::MessageDelivered { .. })),
            "groups get no per-peer delivered acks"
        );
        let _ = drain_relay(&mut amir.relay);
    }

    #[tokio::test]
    async fn typing_and_status_map_to_relay_frames() {
        let remote = Arc::new(MemoryRemoteLog::new());
        let mut amir = harness("amir", remote.clone()).await;
        let chat = dm_chat();

        amir.engine.set_typing(&chat, true).await;
        amir.engine.set_typing(&chat, false).await;
        amir.engine.query_status(&UserId::new("ursula")).await;

        let frames = drain_relay(&mut amir.relay);
        assert!(matches!(frames[0], ClientEvent::Typing { .. }));
        assert!(matches!(frames[1], ClientEvent::StoppedTyping { .. }));
        assert!(matches!(frames[2], ClientEvent::GetStatus { ref user } if user == "ursula"));
    }
}
