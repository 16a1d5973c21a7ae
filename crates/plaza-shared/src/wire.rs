//! Wire schema for the realtime relay and the remote message log.
//!
//! Every frame is a tagged JSON object (`"type"` discriminator). Optional
//! fields default instead of failing the whole frame, and inbound message
//! frames are validated here, before anything crosses into the
//! reconciliation engine.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::constants::NONCE_SIZE;
use crate::crypto::EncryptedPayload;
use crate::error::WireError;

/// A message as it travels through the relay and the remote log.
///
/// Direct chats run the sealed policy: `ciphertext`/`nonce`/
/// `sender_public_key` are set and `text` is absent. Group chats run the
/// plaintext policy: `text` is set and the crypto fields are absent. The
/// media URL and the reply preview follow the same split, each sealed under
/// its own nonce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub id: String,
    pub chat_id: String,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Plaintext body (group policy only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Sealed body, base64 (direct policy only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ciphertext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Sender's x25519 public key, base64. Lets the receiver derive the
    /// pair secret without a directory lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_public_key: Option<String>,
    /// Media URL: plaintext for groups, sealed + base64 for direct chats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    /// Reply preview: plaintext for groups, sealed + base64 for direct chats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_nonce: Option<String>,
    /// Sender-assigned epoch milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub delivered: bool,
    #[serde(default)]
    pub seen: bool,
}

impl WireMessage {
    /// Boundary validation. A frame must identify itself, carry a positive
    /// timestamp and exactly one body form, and pair every ciphertext with
    /// a nonce.
    pub fn validate(&self) -> Result<(), WireError> {
        if self.id.is_empty() {
            return Err(WireError::InvalidField("id"));
        }
        if self.chat_id.is_empty() {
            return Err(WireError::InvalidField("chatId"));
        }
        if self.sender.is_empty() {
            return Err(WireError::InvalidField("sender"));
        }
        if self.timestamp <= 0 {
            return Err(WireError::InvalidField("timestamp"));
        }
        match (&self.text, &self.ciphertext) {
            (None, None) | (Some(_), Some(_)) => {
                return Err(WireError::InvalidField("text/ciphertext"))
            }
            _ => {}
        }
        if self.ciphertext.is_some() && (self.nonce.is_none() || self.sender_public_key.is_none())
        {
            return Err(WireError::InvalidField("nonce/senderPublicKey"));
        }
        if self.media.is_some() && self.ciphertext.is_some() && self.media_nonce.is_none() {
            return Err(WireError::InvalidField("mediaNonce"));
        }
        Ok(())
    }

    /// Whether this message runs the sealed (direct-chat) policy.
    pub fn is_sealed(&self) -> bool {
        self.ciphertext.is_some()
    }
}

/// Encode a sealed payload into its `(ciphertext, nonce)` wire fields.
pub fn encode_sealed(payload: &EncryptedPayload) -> (String, String) {
    (
        BASE64.encode(&payload.ciphertext),
        BASE64.encode(payload.nonce),
    )
}

/// Decode `(ciphertext, nonce)` wire fields back into a sealed payload.
pub fn decode_sealed(ciphertext_b64: &str, nonce_b64: &str) -> Result<EncryptedPayload, WireError> {
    let ciphertext = BASE64.decode(ciphertext_b64)?;
    let nonce_vec = BASE64.decode(nonce_b64)?;
    let nonce: [u8; NONCE_SIZE] = nonce_vec
        .try_into()
        .map_err(|_| WireError::InvalidField("nonce"))?;
    Ok(EncryptedPayload { ciphertext, nonce })
}

/// Frames the client emits to the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Presence announcement, re-sent on every (re)connect.
    #[serde(rename = "user_online")]
    UserOnline { user: String, region: String },
    #[serde(rename = "send-dm")]
    SendDm { message: WireMessage },
    #[serde(rename = "group-message")]
    GroupMessage { message: WireMessage },
    #[serde(rename = "message-deleted")]
    MessageDeleted {
        message_id: String,
        chat_id: String,
        receiver: String,
    },
    #[serde(rename = "group-message-deleted")]
    GroupMessageDeleted { message_id: String, group_id: String },
    /// Receipt back to the sender once an inbound message is ingested.
    #[serde(rename = "message-delivered")]
    MessageDelivered {
        message_id: String,
        chat_id: String,
        receiver: String,
    },
    /// "Everything up to `seen_up_to` in this chat has been read."
    #[serde(rename = "seen-messages")]
    SeenMessages {
        chat_id: String,
        user: String,
        seen_up_to: i64,
    },
    #[serde(rename = "typing")]
    Typing { chat_id: String, user: String },
    #[serde(rename = "StoppedTyping")]
    StoppedTyping { chat_id: String, user: String },
    #[serde(rename = "get_status")]
    GetStatus { user: String },
}

/// Frames the relay pushes to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    #[serde(rename = "receive-dm")]
    ReceiveDm { message: WireMessage },
    #[serde(rename = "group-message")]
    GroupMessage { message: WireMessage },
    #[serde(rename = "message-deleted")]
    MessageDeleted { message_id: String, chat_id: String },
    #[serde(rename = "group-message-deleted")]
    GroupMessageDeleted { message_id: String, group_id: String },
    #[serde(rename = "message-delivered")]
    MessageDelivered { message_id: String, chat_id: String },
    #[serde(rename = "seen-messages")]
    SeenMessages {
        chat_id: String,
        user: String,
        seen_up_to: i64,
    },
    #[serde(rename = "typing")]
    Typing { chat_id: String, user: String },
    #[serde(rename = "StoppedTyping")]
    StoppedTyping { chat_id: String, user: String },
    #[serde(rename = "status_response")]
    StatusResponse {
        user: String,
        online: bool,
        #[serde(default)]
        last_seen: Option<i64>,
    },
    #[serde(rename = "user_online")]
    UserOnline { user: String },
    #[serde(rename = "user_offline")]
    UserOffline { user: String },
}

impl ClientEvent {
    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl ServerEvent {
    /// Parse and validate one relay frame.
    pub fn from_json(raw: &str) -> Result<Self, WireError> {
        let event: ServerEvent = serde_json::from_str(raw)?;
        match &event {
            ServerEvent::ReceiveDm { message } | ServerEvent::GroupMessage { message } => {
                message.validate()?;
            }
            _ => {}
        }
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;
    use crate::crypto::KeyPair;

    fn sample_message() -> WireMessage {
        WireMessage {
            id: "dm:a:b:0001700000000000:deadbeef".into(),
            chat_id: "dm:a:b".into(),
            sender: "a".into(),
            receiver: Some("b".into()),
            group_id: None,
            text: None,
            ciphertext: Some("AAAA".into()),
            nonce: Some(BASE64.encode([7u8; NONCE_SIZE])),
            sender_public_key: Some(BASE64.encode([1u8; 32])),
            media: None,
            media_nonce: None,
            reply_to_id: None,
            reply_to_text: None,
            reply_to_nonce: None,
            timestamp: 1_700_000_000_000,
            delivered: false,
            seen: false,
        }
    }

    #[test]
    fn test_event_tag_names() {
        let json = ClientEvent::SendDm {
            message: sample_message(),
        }
        .to_json()
        .unwrap();
        assert!(json.contains(r#""type":"send-dm""#));

        let json = ClientEvent::GetStatus { user: "a".into() }.to_json().unwrap();
        assert!(json.contains(r#""type":"get_status""#));

        let json = ClientEvent::StoppedTyping {
            chat_id: "c".into(),
            user: "a".into(),
        }
        .to_json()
        .unwrap();
        assert!(json.contains(r#""type":"StoppedTyping""#));
    }

    #[test]
    fn test_server_event_roundtrip() {
        let event = ServerEvent::ReceiveDm {
            message: sample_message(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed = ServerEvent::from_json(&json).unwrap();
        assert_eq!(event, parsed);
    }

    #[test]
    fn test_optional_fields_default() {
        let raw = r#"{
            "type": "receive-dm",
            "message": {
                "id": "group:g1:0000000000001:00000000",
                "chatId": "group:g1",
                "sender": "a",
                "text": "hello",
                "timestamp": 1
            }
        }"#;
        let parsed = ServerEvent::from_json(raw).unwrap();
        match parsed {
            ServerEvent::ReceiveDm { message } => {
                assert_eq!(message.text.as_deref(), Some("hello"));
                assert!(!message.delivered);
                assert!(message.media.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_validation_rejects_bodyless_frame() {
        let mut msg = sample_message();
        msg.ciphertext = None;
        msg.nonce = None;
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_ciphertext_without_nonce() {
        let mut msg = sample_message();
        msg.nonce = None;
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_dual_body() {
        let mut msg = sample_message();
        msg.text = Some("plain".into());
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_malformed_frame_is_rejected() {
        assert!(ServerEvent::from_json("{\"type\":\"receive-dm\"}").is_err());
        assert!(ServerEvent::from_json("not json").is_err());
    }

    #[test]
    fn test_sealed_field_roundtrip() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let key = alice.shared_secret(&bob.public_key());

        let sealed = crypto::encrypt(&key, b"round trip").unwrap();
        let (ct, nonce) = encode_sealed(&sealed);
        let decoded = decode_sealed(&ct, &nonce).unwrap();

        assert_eq!(sealed, decoded);
        assert_eq!(crypto::decrypt(&key, &decoded).unwrap(), b"round trip");
    }

    #[test]
    fn test_decode_sealed_rejects_short_nonce() {
        assert!(decode_sealed("AAAA", &BASE64.encode([0u8; 8])).is_err());
    }
}
