use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::constants::MESSAGE_ID_SUFFIX_BYTES;

/// Backend account identifier. Opaque to the engine; assigned at sign-up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conversation identifier, shared by both direct and group chats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ChatId(pub String);

impl ChatId {
    /// Canonical id for the direct chat between two users.
    ///
    /// Participants are sorted so both devices compute the same id without
    /// a server round-trip.
    pub fn direct(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a.0 <= b.0 { (a, b) } else { (b, a) };
        Self(format!("dm:{}:{}", lo.0, hi.0))
    }

    /// Wrap a server-assigned group id.
    pub fn group(id: impl Into<String>) -> Self {
        Self(format!("group:{}", id.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-generated message identifier.
///
/// Embeds the chat id, the sender's wall clock and a random suffix, so ids
/// are globally unique without coordination. Equal timestamps order by the
/// id's lexical order, which is deterministic across devices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn generate(chat: &ChatId, timestamp_ms: i64) -> Self {
        let mut suffix = [0u8; MESSAGE_ID_SUFFIX_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut suffix);
        Self(format!("{}:{:013}:{}", chat.0, timestamp_ms, hex::encode(suffix)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current wall clock as sender-assigned epoch milliseconds.
pub fn epoch_ms_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_chat_id_is_order_independent() {
        let a = UserId::new("ursula");
        let b = UserId::new("amir");
        assert_eq!(ChatId::direct(&a, &b), ChatId::direct(&b, &a));
        assert_eq!(ChatId::direct(&a, &b).as_str(), "dm:amir:ursula");
    }

    #[test]
    fn message_ids_are_unique_for_same_instant() {
        let chat = ChatId::direct(&UserId::new("a"), &UserId::new("b"));
        let ts = 1_700_000_000_000;
        let one = MessageId::generate(&chat, ts);
        let two = MessageId::generate(&chat, ts);
        assert_ne!(one, two);
        assert!(one.as_str().starts_with(chat.as_str()));
    }

    #[test]
    fn message_id_lexical_order_follows_timestamp() {
        let chat = ChatId::group("g1");
        let early = MessageId::generate(&chat, 1_000);
        let late = MessageId::generate(&chat, 2_000);
        assert!(early < late);
    }
}
