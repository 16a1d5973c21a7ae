//! Async facade over the synchronous SQLite store.

use std::sync::{Arc, Mutex};

use plaza_store::Database;

use crate::error::Result;

/// Cloneable handle sharing one [`Database`] across tasks.
///
/// SQLite work runs on the blocking thread pool so engine tasks never stall
/// the runtime; the mutex serializes access to the single connection.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<Database>>,
}

impl SharedStore {
    pub fn new(db: Database) -> Self {
        Self {
            inner: Arc::new(Mutex::new(db)),
        }
    }

    /// Run `f` against the store on the blocking pool.
    ///
    /// Everything inside one closure runs under one lock acquisition, so a
    /// message upsert and its unread bump cannot interleave with another
    /// writer.
    pub async fn with<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> plaza_store::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let out = tokio::task::spawn_blocking(move || {
            // A poisoned lock still guards a usable connection.
            let db = match inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&db)
        })
        .await?;
        Ok(out?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaza_shared::{ChatId, MessageId, UserId};
    use plaza_store::Message;

    fn sample_message(chat: &ChatId, ts: i64) -> Message {
        Message {
            id: MessageId::generate(chat, ts),
            chat_id: chat.clone(),
            sender: UserId::new("amir"),
            receiver: Some(UserId::new("ursula")),
            text: "hello".to_string(),
            media_url: None,
            reply_to_id: None,
            reply_to_text: None,
            timestamp: ts,
            delivered: false,
            seen: false,
        }
    }

    #[tokio::test]
    async fn closure_sees_one_consistent_store() {
        let store = SharedStore::new(Database::open_in_memory().unwrap());
        let chat = ChatId::direct(&UserId::new("amir"), &UserId::new("ursula"));
        let message = sample_message(&chat, 1_700_000_000_000);

        let fetched = store
            .with(move |db| {
                db.upsert_message(&message)?;
                db.get_message(&message.id)
            })
            .await
            .unwrap();
        assert_eq!(fetched.text, "hello");
    }

    #[tokio::test]
    async fn clones_share_the_same_database() {
        let store = SharedStore::new(Database::open_in_memory().unwrap());
        let chat = ChatId::direct(&UserId::new("amir"), &UserId::new("ursula"));
        let message = sample_message(&chat, 1_700_000_000_001);
        let id = message.id.clone();

        store
            .with(move |db| db.upsert_message(&message))
            .await
            .unwrap();

        let other = store.clone();
        let exists = other.with(move |db| db.message_exists(&id)).await.unwrap();
        assert!(exists);
    }
}
