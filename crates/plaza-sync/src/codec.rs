//! Conversion between local message rows and the wire form.
//!
//! Direct messages are sealed per field: the body, the media URL and the
//! reply preview are each encrypted under the pair key with their own
//! nonce. Ids, timestamps and flags stay in the clear so the remote log can
//! order and page without key material. Group messages pass through in
//! plaintext. Everything here is pure CPU work, run on the blocking pool by
//! the engine.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use plaza_shared::wire::{decode_sealed, encode_sealed};
use plaza_shared::{
    decrypt, encrypt, ChatId, CryptoError, KeyPair, MessageId, PublicKey, SharedSecret, UserId,
    WireError, WireMessage,
};
use plaza_store::Message;

use crate::error::Result;

/// Seal a direct message for the wire.
pub(crate) fn seal_direct(
    keys: &KeyPair,
    counterpart: &PublicKey,
    message: &Message,
) -> Result<WireMessage> {
    let key = keys.shared_secret(counterpart);

    let (ciphertext, nonce) = encode_sealed(&encrypt(&key, message.text.as_bytes())?);
    let (media, media_nonce) = seal_optional(&key, message.media_url.as_deref())?;
    let (reply_to_text, reply_to_nonce) = seal_optional(&key, message.reply_to_text.as_deref())?;

    Ok(WireMessage {
        id: message.id.as_str().to_string(),
        chat_id: message.chat_id.as_str().to_string(),
        sender: message.sender.as_str().to_string(),
        receiver: message.receiver.as_ref().map(|r| r.as_str().to_string()),
        group_id: None,
        text: None,
        ciphertext: Some(ciphertext),
        nonce: Some(nonce),
        sender_public_key: Some(BASE64.encode(keys.public_key_bytes())),
        media,
        media_nonce,
        reply_to_id: message.reply_to_id.as_ref().map(|i| i.as_str().to_string()),
        reply_to_text,
        reply_to_nonce,
        timestamp: message.timestamp,
        delivered: message.delivered,
        seen: message.seen,
    })
}

/// Open a wire message into a local row, decrypting when sealed.
///
/// `counterpart` is the other end of the pair key: the sender's key for
/// inbound messages, the receiver's key for echoes of our own.
pub(crate) fn open_direct(
    keys: &KeyPair,
    counterpart: &PublicKey,
    wire: &WireMessage,
) -> Result<Message> {
    let key = keys.shared_secret(counterpart);

    let text = match (&wire.text, &wire.ciphertext, &wire.nonce) {
        (Some(plain), None, _) => plain.clone(),
        (None, Some(ciphertext), Some(nonce)) => open_field(&key, ciphertext, nonce)?,
        _ => return Err(WireError::InvalidField("ciphertext").into()),
    };
    let media_url = open_optional(&key, wire.media.as_deref(), wire.media_nonce.as_deref())?;
    let reply_to_text = open_optional(
        &key,
        wire.reply_to_text.as_deref(),
        wire.reply_to_nonce.as_deref(),
    )?;

    Ok(Message {
        id: MessageId(wire.id.clone()),
        chat_id: ChatId(wire.chat_id.clone()),
        sender: UserId(wire.sender.clone()),
        receiver: wire.receiver.clone().map(UserId),
        text,
        media_url,
        reply_to_id: wire.reply_to_id.clone().map(MessageId),
        reply_to_text,
        timestamp: wire.timestamp,
        delivered: wire.delivered,
        seen: wire.seen,
    })
}

/// Wire form of a plaintext group message.
pub(crate) fn group_wire(message: &Message) -> WireMessage {
    WireMessage {
        id: message.id.as_str().to_string(),
        chat_id: message.chat_id.as_str().to_string(),
        sender: message.sender.as_str().to_string(),
        receiver: None,
        group_id: group_id_of(&message.chat_id),
        text: Some(message.text.clone()),
        ciphertext: None,
        nonce: None,
        sender_public_key: None,
        media: message.media_url.clone(),
        media_nonce: None,
        reply_to_id: message.reply_to_id.as_ref().map(|i| i.as_str().to_string()),
        reply_to_text: message.reply_to_text.clone(),
        reply_to_nonce: None,
        timestamp: message.timestamp,
        delivered: message.delivered,
        seen: message.seen,
    }
}

/// Local row for a plaintext group message.
pub(crate) fn group_to_local(wire: &WireMessage) -> Result<Message> {
    let text = wire
        .text
        .clone()
        .ok_or(WireError::InvalidField("text"))?;

    Ok(Message {
        id: MessageId(wire.id.clone()),
        chat_id: ChatId(wire.chat_id.clone()),
        sender: UserId(wire.sender.clone()),
        receiver: None,
        text,
        media_url: wire.media.clone(),
        reply_to_id: wire.reply_to_id.clone().map(MessageId),
        reply_to_text: wire.reply_to_text.clone(),
        timestamp: wire.timestamp,
        delivered: wire.delivered,
        seen: wire.seen,
    })
}

/// The raw group id inside a `group:` chat id, if this is a group chat.
pub(crate) fn group_id_of(chat: &ChatId) -> Option<String> {
    chat.as_str().strip_prefix("group:").map(str::to_string)
}

/// The sender's public key carried on a sealed wire message.
pub(crate) fn wire_sender_key(wire: &WireMessage) -> Result<PublicKey> {
    let encoded = wire
        .sender_public_key
        .as_deref()
        .ok_or(WireError::InvalidField("senderPublicKey"))?;
    let bytes = BASE64
        .decode(encoded)
        .map_err(WireError::Base64)?;
    Ok(plaza_shared::crypto::public_key_from_bytes(&bytes)?)
}

fn seal_optional(
    key: &SharedSecret,
    value: Option<&str>,
) -> Result<(Option<String>, Option<String>)> {
    match value {
        Some(plain) => {
            let (ciphertext, nonce) = encode_sealed(&encrypt(key, plain.as_bytes())?);
            Ok((Some(ciphertext), Some(nonce)))
        }
        None => Ok((None, None)),
    }
}

fn open_optional(
    key: &SharedSecret,
    ciphertext: Option<&str>,
    nonce: Option<&str>,
) -> Result<Option<String>> {
    match (ciphertext, nonce) {
        (Some(ciphertext), Some(nonce)) => Ok(Some(open_field(key, ciphertext, nonce)?)),
        // A bare value without a nonce is plaintext (group media URLs).
        (Some(plain), None) => Ok(Some(plain.to_string())),
        _ => Ok(None),
    }
}

fn open_field(key: &SharedSecret, ciphertext_b64: &str, nonce_b64: &str) -> Result<String> {
    let sealed = decode_sealed(ciphertext_b64, nonce_b64)?;
    let plain = decrypt(key, &sealed)?;
    String::from_utf8(plain).map_err(|_| CryptoError::DecryptionFailed.into())
}
