//! Domain model structs persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer.

use serde::{Deserialize, Serialize};

use plaza_shared::{ChatId, MessageId, UserId};

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Which policy a chat runs: sealed direct pair or plaintext group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Direct,
    Group,
}

impl ChatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatKind::Direct => "direct",
            ChatKind::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(ChatKind::Direct),
            "group" => Some(ChatKind::Group),
            _ => None,
        }
    }
}

/// A conversation: a direct pair or a group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    /// Stable identifier: `dm:{lo}:{hi}` for pairs, `group:{id}` for groups.
    pub id: ChatId,
    pub kind: ChatKind,
    /// Participant user ids; exactly two for direct chats.
    pub participants: Vec<UserId>,
    /// Display name (peer name for direct chats, group title for groups).
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    /// When the chat was first seen locally, epoch ms.
    pub created_at: i64,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message in decrypted form.
///
/// The wire form (`ciphertext`, `nonce`, `senderPublicKey`) is stripped during
/// ingest and never reaches this struct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Client-generated identifier, `"{chat_id}:{ts:013}:{hex}"`. Lexical
    /// order within a chat follows timestamp order and breaks ties
    /// deterministically across devices.
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender: UserId,
    /// Direct chats only; `None` for group messages.
    pub receiver: Option<UserId>,
    /// Decrypted body.
    pub text: String,
    /// Decrypted media URL, if the message carries an attachment.
    pub media_url: Option<String>,
    /// Message being replied to. May dangle until back-fill finds it.
    pub reply_to_id: Option<MessageId>,
    /// Decrypted preview of the replied-to text.
    pub reply_to_text: Option<String>,
    /// Sender-assigned epoch milliseconds.
    pub timestamp: i64,
    /// Flags are monotonic false -> true and merge with OR.
    pub delivered: bool,
    pub seen: bool,
}

// ---------------------------------------------------------------------------
// Unread state
// ---------------------------------------------------------------------------

/// Per-chat unread counter plus the seen/unseen boundary for divider
/// rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnreadState {
    pub chat_id: ChatId,
    pub count: u32,
    /// Timestamp of the first unseen message; `None` once the chat is read.
    pub unread_timestamp: Option<i64>,
}

// ---------------------------------------------------------------------------
// Pending deletion
// ---------------------------------------------------------------------------

/// A deletion queued while offline. Replayed in `queued_at` order on
/// reconnect, then cleared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingDeletion {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    /// Peer to notify over the transport (direct chats only).
    pub target: Option<UserId>,
    pub is_group: bool,
    /// Captured at enqueue time; the message row is already gone when the
    /// media blob gets deleted remotely.
    pub media_url: Option<String>,
    pub queued_at: i64,
}
