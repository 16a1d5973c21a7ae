//! Typed notifications pushed to the embedding application.

use serde::Serialize;

use plaza_shared::{ChatId, MessageId, UserId};
use plaza_store::Message;

/// Everything the engine reports back to the application.
///
/// Events arrive on the channel returned by
/// [`SyncSession::open`](crate::SyncSession::open). Each variant carries
/// enough data to update a view without re-querying the store, and the enum
/// serializes as a tagged JSON object for UI bridges that forward events
/// verbatim.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SessionEvent {
    /// The relay connection is up. `reconnect` is false only for the first
    /// connection of the session.
    Connected { reconnect: bool },
    /// The relay connection dropped; reconnection is already underway.
    Disconnected,
    /// A message was ingested into the store, live or during catch-up.
    MessageArrived { message: Message },
    /// Delivery progress changed for one already-stored message.
    MessageUpdated {
        chat_id: ChatId,
        message_id: MessageId,
    },
    /// A peer read everything up to `seen_up_to` in this chat.
    MessagesSeen {
        chat_id: ChatId,
        user: UserId,
        seen_up_to: i64,
    },
    /// A message was removed, locally or by a peer's deletion.
    MessageDeleted {
        chat_id: ChatId,
        message_id: MessageId,
    },
    /// A catch-up pass over one chat finished.
    ChatSynced { chat_id: ChatId, fetched: usize },
    /// The unread counter for a chat moved.
    UnreadChanged {
        chat_id: ChatId,
        count: u32,
        unread_timestamp: Option<i64>,
    },
    /// An outbound message exhausted its append retries. It stays queued
    /// and is retried on the next reconnect.
    SendFailed {
        chat_id: ChatId,
        message_id: MessageId,
    },
    /// A peer started or stopped typing in a chat.
    Typing {
        chat_id: ChatId,
        user: UserId,
        typing: bool,
    },
    /// Presence changed for a peer, or a status query was answered.
    PeerPresence {
        user: UserId,
        online: bool,
        last_seen: Option<i64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_tagged() {
        let event = SessionEvent::UnreadChanged {
            chat_id: ChatId("dm:a:b".to_string()),
            count: 3,
            unread_timestamp: Some(1_700_000_000_000),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "unread-changed");
        assert_eq!(json["chatId"], "dm:a:b");
        assert_eq!(json["count"], 3);

        let event = SessionEvent::Disconnected;
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "disconnected");
    }
}
