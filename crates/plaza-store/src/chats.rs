//! CRUD operations for [`Chat`] records.

use rusqlite::params;

use plaza_shared::{ChatId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Chat, ChatKind};

impl Database {
    // ------------------------------------------------------------------
    // Create / update
    // ------------------------------------------------------------------

    /// Insert a chat or refresh its metadata (name, photo, participants).
    /// `kind` and `created_at` are fixed by the first write.
    pub fn upsert_chat(&self, chat: &Chat) -> Result<()> {
        let participants = serde_json::to_string(&chat.participants)?;
        self.conn().execute(
            "INSERT INTO chats (id, kind, participants, display_name, photo_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 participants = excluded.participants,
                 display_name = excluded.display_name,
                 photo_url    = excluded.photo_url",
            params![
                chat.id.as_str(),
                chat.kind.as_str(),
                participants,
                chat.display_name,
                chat.photo_url,
                chat.created_at,
            ],
        )?;
        Ok(())
    }

    /// Insert a chat only if it does not exist yet.
    ///
    /// Used when a message arrives for a chat the store has never seen;
    /// never overwrites metadata a later `upsert_chat` has written.
    pub fn ensure_chat(&self, chat: &Chat) -> Result<()> {
        let participants = serde_json::to_string(&chat.participants)?;
        self.conn().execute(
            "INSERT OR IGNORE INTO chats
                 (id, kind, participants, display_name, photo_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                chat.id.as_str(),
                chat.kind.as_str(),
                participants,
                chat.display_name,
                chat.photo_url,
                chat.created_at,
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single chat by id.
    pub fn get_chat(&self, id: &ChatId) -> Result<Chat> {
        self.conn()
            .query_row(
                "SELECT id, kind, participants, display_name, photo_url, created_at
                 FROM chats
                 WHERE id = ?1",
                params![id.as_str()],
                row_to_chat,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List all chats, most recently active first.  A chat with no messages
    /// yet sorts by its creation time.
    pub fn list_chats(&self) -> Result<Vec<Chat>> {
        let mut stmt = self.conn().prepare(
            "SELECT c.id, c.kind, c.participants, c.display_name, c.photo_url, c.created_at
             FROM chats c
             LEFT JOIN (
                 SELECT chat_id, MAX(timestamp) AS last_ts
                 FROM messages
                 GROUP BY chat_id
             ) m ON m.chat_id = c.id
             ORDER BY COALESCE(m.last_ts, c.created_at) DESC",
        )?;

        let rows = stmt.query_map([], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Chat`].
fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let kind_str: String = row.get(1)?;
    let participants_json: String = row.get(2)?;

    let kind = ChatKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown chat kind: {kind_str}").into(),
        )
    })?;

    let participants: Vec<UserId> = serde_json::from_str(&participants_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Chat {
        id: ChatId(row.get(0)?),
        kind,
        participants,
        display_name: row.get(3)?,
        photo_url: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaza_shared::MessageId;

    use crate::models::Message;

    fn direct_chat(a: &str, b: &str, created_at: i64) -> Chat {
        let (a, b) = (UserId::new(a), UserId::new(b));
        Chat {
            id: ChatId::direct(&a, &b),
            kind: ChatKind::Direct,
            participants: vec![a, b],
            display_name: None,
            photo_url: None,
            created_at,
        }
    }

    #[test]
    fn upsert_refreshes_metadata() {
        let db = Database::open_in_memory().unwrap();
        let mut chat = direct_chat("alice", "bob", 1_000);

        db.upsert_chat(&chat).unwrap();
        chat.display_name = Some("Bob".into());
        db.upsert_chat(&chat).unwrap();

        let stored = db.get_chat(&chat.id).unwrap();
        assert_eq!(stored.display_name.as_deref(), Some("Bob"));
        assert_eq!(stored.participants, chat.participants);
    }

    #[test]
    fn list_orders_by_recent_activity() {
        let db = Database::open_in_memory().unwrap();
        let older = direct_chat("alice", "bob", 1_000);
        let newer = direct_chat("alice", "carol", 2_000);
        db.upsert_chat(&older).unwrap();
        db.upsert_chat(&newer).unwrap();

        // A fresh message in the older chat bumps it to the top.
        db.upsert_message(&Message {
            id: MessageId::generate(&older.id, 5_000),
            chat_id: older.id.clone(),
            sender: UserId::new("bob"),
            receiver: Some(UserId::new("alice")),
            text: "ping".into(),
            media_url: None,
            reply_to_id: None,
            reply_to_text: None,
            timestamp: 5_000,
            delivered: false,
            seen: false,
        })
        .unwrap();

        let chats = db.list_chats().unwrap();
        assert_eq!(chats[0].id, older.id);
        assert_eq!(chats[1].id, newer.id);
    }

    #[test]
    fn ensure_never_overwrites_existing_metadata() {
        let db = Database::open_in_memory().unwrap();
        let mut chat = direct_chat("alice", "bob", 1_000);
        chat.display_name = Some("Bob".into());
        db.upsert_chat(&chat).unwrap();

        let skeleton = direct_chat("alice", "bob", 9_999);
        db.ensure_chat(&skeleton).unwrap();

        let stored = db.get_chat(&chat.id).unwrap();
        assert_eq!(stored.display_name.as_deref(), Some("Bob"));
        assert_eq!(stored.created_at, 1_000);
    }

    #[test]
    fn missing_chat_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let id = ChatId::group("nope");
        assert!(matches!(db.get_chat(&id), Err(StoreError::NotFound)));
    }
}
