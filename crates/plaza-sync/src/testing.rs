//! In-memory remote log used by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use plaza_net::{NetError, RemoteLog};
use plaza_shared::constants::PUBKEY_SIZE;
use plaza_shared::{ChatId, MessageId, UserId, WireMessage};

/// Remote log backed by vectors, with an offline switch to simulate
/// connectivity loss and counters for asserting call patterns.
#[derive(Default)]
pub(crate) struct MemoryRemoteLog {
    messages: Mutex<Vec<WireMessage>>,
    keys: Mutex<HashMap<String, [u8; PUBKEY_SIZE]>>,
    deleted_messages: Mutex<Vec<String>>,
    deleted_media: Mutex<Vec<String>>,
    delivered_marks: Mutex<Vec<String>>,
    seen_marks: Mutex<Vec<(String, String, i64)>>,
    publishes: AtomicUsize,
    key_fetches: AtomicUsize,
    appends: AtomicUsize,
    offline: AtomicBool,
}

impl MemoryRemoteLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), NetError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(NetError::Connect("remote log unreachable".to_string()))
        } else {
            Ok(())
        }
    }

    /// Seed the log directly, bypassing `append` counters.
    pub(crate) fn seed(&self, message: WireMessage) {
        self.messages.lock().unwrap().push(message);
    }

    pub(crate) fn publish_count(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    pub(crate) fn key_fetch_count(&self) -> usize {
        self.key_fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn append_count(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    pub(crate) fn stored_ids(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.id.clone())
            .collect()
    }

    pub(crate) fn deleted_message_ids(&self) -> Vec<String> {
        self.deleted_messages.lock().unwrap().clone()
    }

    pub(crate) fn deleted_media_urls(&self) -> Vec<String> {
        self.deleted_media.lock().unwrap().clone()
    }

    pub(crate) fn delivered_ids(&self) -> Vec<String> {
        self.delivered_marks.lock().unwrap().clone()
    }

    pub(crate) fn seen_marks(&self) -> Vec<(String, String, i64)> {
        self.seen_marks.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteLog for MemoryRemoteLog {
    async fn fetch_since(
        &self,
        chat: &ChatId,
        after: Option<i64>,
        before: Option<i64>,
        limit: u32,
    ) -> Result<Vec<WireMessage>, NetError> {
        self.check_online()?;
        let mut page: Vec<WireMessage> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.chat_id == chat.as_str())
            .filter(|m| after.map_or(true, |a| m.timestamp > a))
            .filter(|m| before.map_or(true, |b| m.timestamp < b))
            .cloned()
            .collect();
        page.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
        page.truncate(limit as usize);
        Ok(page)
    }

    async fn append(&self, message: &WireMessage) -> Result<(), NetError> {
        self.check_online()?;
        self.appends.fetch_add(1, Ordering::SeqCst);
        let mut messages = self.messages.lock().unwrap();
        match messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message.clone(),
            None => messages.push(message.clone()),
        }
        Ok(())
    }

    async fn mark_delivered(&self, _chat: &ChatId, message: &MessageId) -> Result<(), NetError> {
        self.check_online()?;
        if let Some(m) = self
            .messages
            .lock()
            .unwrap()
            .iter_mut()
            .find(|m| m.id == message.as_str())
        {
            m.delivered = true;
        }
        self.delivered_marks
            .lock()
            .unwrap()
            .push(message.as_str().to_string());
        Ok(())
    }

    async fn mark_seen(
        &self,
        chat: &ChatId,
        user: &UserId,
        seen_up_to: i64,
    ) -> Result<(), NetError> {
        self.check_online()?;
        for m in self
            .messages
            .lock()
            .unwrap()
            .iter_mut()
            .filter(|m| m.chat_id == chat.as_str() && m.timestamp <= seen_up_to)
        {
            m.seen = true;
            m.delivered = true;
        }
        self.seen_marks.lock().unwrap().push((
            chat.as_str().to_string(),
            user.as_str().to_string(),
            seen_up_to,
        ));
        Ok(())
    }

    async fn delete_message(&self, _chat: &ChatId, message: &MessageId) -> Result<(), NetError> {
        self.check_online()?;
        self.messages
            .lock()
            .unwrap()
            .retain(|m| m.id != message.as_str());
        self.deleted_messages
            .lock()
            .unwrap()
            .push(message.as_str().to_string());
        Ok(())
    }

    async fn delete_media(&self, media_url: &str, _message: &MessageId) -> Result<(), NetError> {
        self.check_online()?;
        self.deleted_media
            .lock()
            .unwrap()
            .push(media_url.to_string());
        Ok(())
    }

    async fn fetch_public_key(
        &self,
        user: &UserId,
    ) -> Result<Option<[u8; PUBKEY_SIZE]>, NetError> {
        self.check_online()?;
        self.key_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.keys.lock().unwrap().get(user.as_str()).copied())
    }

    async fn publish_public_key(
        &self,
        user: &UserId,
        key: &[u8; PUBKEY_SIZE],
    ) -> Result<(), NetError> {
        self.check_online()?;
        self.publishes.fetch_add(1, Ordering::SeqCst);
        self.keys
            .lock()
            .unwrap()
            .insert(user.as_str().to_string(), *key);
        Ok(())
    }
}
