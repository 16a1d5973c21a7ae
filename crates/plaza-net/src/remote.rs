//! Remote message log client.
//!
//! The authoritative message history lives behind a REST API. This module
//! defines the [`RemoteLog`] trait the sync engine talks to, plus the
//! production [`HttpRemoteLog`] implementation. The trait seam exists so the
//! engine's reconciliation logic can run against an in-memory log in tests.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use plaza_shared::constants::PUBKEY_SIZE;
use plaza_shared::{ChatId, MessageId, UserId, WireError, WireMessage};

use crate::error::{NetError, Result};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Operations against the authoritative remote message log.
///
/// `append` is the durability point for outbound messages; everything else
/// is idempotent and safe to retry.
#[async_trait]
pub trait RemoteLog: Send + Sync {
    /// Page of messages for one chat, `timestamp > after` and
    /// `timestamp < before` where given, oldest first, at most `limit`.
    async fn fetch_since(
        &self,
        chat: &ChatId,
        after: Option<i64>,
        before: Option<i64>,
        limit: u32,
    ) -> Result<Vec<WireMessage>>;

    /// Persist one message. Success means the message survives the sender
    /// going offline.
    async fn append(&self, message: &WireMessage) -> Result<()>;

    /// Record delivered progress for one message.
    async fn mark_delivered(&self, chat: &ChatId, message: &MessageId) -> Result<()>;

    /// Record that `user` has seen everything up to `seen_up_to` in `chat`.
    async fn mark_seen(&self, chat: &ChatId, user: &UserId, seen_up_to: i64) -> Result<()>;

    /// Remove one log entry. Deleting an already-deleted entry is a no-op.
    async fn delete_message(&self, chat: &ChatId, message: &MessageId) -> Result<()>;

    /// Remove a media blob. Deleting an already-deleted blob is a no-op.
    async fn delete_media(&self, media_url: &str, message: &MessageId) -> Result<()>;

    /// Look up a user's published x25519 public key; `None` when the user
    /// has not published one yet.
    async fn fetch_public_key(&self, user: &UserId) -> Result<Option<[u8; PUBKEY_SIZE]>>;

    /// Publish (or re-publish) the local user's x25519 public key.
    async fn publish_public_key(&self, user: &UserId, key: &[u8; PUBKEY_SIZE]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Configuration for the HTTP remote log client.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the API, e.g. `https://api.plaza.example`.
    pub base_url: String,
    /// Bearer token attached to every request, if the deployment requires
    /// one.
    pub auth_token: Option<String>,
    /// Per-request deadline.
    pub timeout: Duration,
}

/// [`RemoteLog`] over reqwest.
pub struct HttpRemoteLog {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpRemoteLog {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let request = self.authorize(self.client.post(self.url(path)).json(body));
        check_status(request.send().await?)
    }
}

#[async_trait]
impl RemoteLog for HttpRemoteLog {
    async fn fetch_since(
        &self,
        chat: &ChatId,
        after: Option<i64>,
        before: Option<i64>,
        limit: u32,
    ) -> Result<Vec<WireMessage>> {
        let mut query: Vec<(&str, String)> = vec![
            ("chatId", chat.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }
        if let Some(before) = before {
            query.push(("before", before.to_string()));
        }

        let request = self.authorize(
            self.client
                .get(self.url("/messages/sync"))
                .query(&query),
        );
        let response = check_status(request.send().await?)?;
        let body: SyncResponse = response.json().await?;
        Ok(body.messages)
    }

    async fn append(&self, message: &WireMessage) -> Result<()> {
        self.post_json("/message", &AppendBody { message }).await?;
        Ok(())
    }

    async fn mark_delivered(&self, chat: &ChatId, message: &MessageId) -> Result<()> {
        self.post_json(
            "/message/delivered",
            &MessageRef {
                chat_id: chat.as_str(),
                message_id: message.as_str(),
            },
        )
        .await?;
        Ok(())
    }

    async fn mark_seen(&self, chat: &ChatId, user: &UserId, seen_up_to: i64) -> Result<()> {
        self.post_json(
            "/messages/seen",
            &SeenBody {
                chat_id: chat.as_str(),
                user: user.as_str(),
                seen_up_to,
            },
        )
        .await?;
        Ok(())
    }

    async fn delete_message(&self, chat: &ChatId, message: &MessageId) -> Result<()> {
        let request = self.authorize(self.client.post(self.url("/delete-message")).json(
            &MessageRef {
                chat_id: chat.as_str(),
                message_id: message.as_str(),
            },
        ));
        let response = request.send().await?;
        // Already gone counts as deleted; replay must be idempotent.
        if response.status().as_u16() == 404 {
            return Ok(());
        }
        check_status(response)?;
        Ok(())
    }

    async fn delete_media(&self, media_url: &str, message: &MessageId) -> Result<()> {
        let request = self.authorize(self.client.post(self.url("/delete-media")).json(
            &DeleteMediaBody {
                media: media_url,
                message_id: message.as_str(),
            },
        ));
        let response = request.send().await?;
        if response.status().as_u16() == 404 {
            return Ok(());
        }
        check_status(response)?;
        Ok(())
    }

    async fn fetch_public_key(&self, user: &UserId) -> Result<Option<[u8; PUBKEY_SIZE]>> {
        let request = self.authorize(
            self.client
                .get(self.url(&format!("/keys/{}", user.as_str()))),
        );
        let response = request.send().await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let response = check_status(response)?;
        let record: KeyRecord = response.json().await?;
        Ok(Some(decode_key(&record.public_key)?))
    }

    async fn publish_public_key(&self, user: &UserId, key: &[u8; PUBKEY_SIZE]) -> Result<()> {
        self.post_json(
            "/keys",
            &KeyRecord {
                user_id: user.to_string(),
                public_key: BASE64.encode(key),
            },
        )
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct AppendBody<'a> {
    message: &'a WireMessage,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef<'a> {
    chat_id: &'a str,
    message_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SeenBody<'a> {
    chat_id: &'a str,
    user: &'a str,
    seen_up_to: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteMediaBody<'a> {
    media: &'a str,
    message_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct SyncResponse {
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyRecord {
    user_id: String,
    public_key: String,
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(NetError::Status(response.status().as_u16()))
    }
}

fn decode_key(encoded: &str) -> Result<[u8; PUBKEY_SIZE]> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|_| NetError::Wire(WireError::InvalidField("publicKey")))?;
    bytes
        .try_into()
        .map_err(|_| NetError::Wire(WireError::InvalidField("publicKey")))
}
