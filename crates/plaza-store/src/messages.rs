//! CRUD and merge operations for [`Message`] rows.
//!
//! All ingest paths (live transport, catch-up sync, local sends) funnel
//! through [`Database::upsert_message`], which enforces the merge rules:
//! content columns are last-write-wins, `delivered`/`seen` only ever go up.

use rusqlite::params;

use plaza_shared::{ChatId, MessageId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Message;

impl Database {
    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Insert or merge a message row.  Idempotent: re-applying the same
    /// message is a no-op, and no interleaving of upserts for one id can
    /// lower a delivered/seen flag.
    pub fn upsert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages
                 (id, chat_id, sender, receiver, text, media_url,
                  reply_to_id, reply_to_text, timestamp, delivered, seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                 text          = excluded.text,
                 media_url     = excluded.media_url,
                 reply_to_id   = excluded.reply_to_id,
                 reply_to_text = excluded.reply_to_text,
                 timestamp     = excluded.timestamp,
                 delivered     = MAX(messages.delivered, excluded.delivered),
                 seen          = MAX(messages.seen, excluded.seen)",
            params![
                message.id.as_str(),
                message.chat_id.as_str(),
                message.sender.as_str(),
                message.receiver.as_ref().map(|r| r.as_str()),
                message.text,
                message.media_url,
                message.reply_to_id.as_ref().map(|r| r.as_str()),
                message.reply_to_text,
                message.timestamp,
                message.delivered,
                message.seen,
            ],
        )?;
        Ok(())
    }

    /// Flip the delivered flag for one message.  Returns `true` if the row
    /// existed and was still undelivered.
    pub fn mark_delivered(&self, id: &MessageId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET delivered = 1 WHERE id = ?1 AND delivered = 0",
            params![id.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// Reader side: the local user opened the chat and saw everything from
    /// `since_ts` onward.  Marks inbound rows (not authored by `reader`)
    /// seen.  Returns the number of rows that actually flipped.
    pub fn mark_seen_since(&self, chat: &ChatId, since_ts: i64, reader: &UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET seen = 1, delivered = 1
             WHERE chat_id = ?1 AND timestamp >= ?2 AND sender != ?3 AND seen = 0",
            params![chat.as_str(), since_ts, reader.as_str()],
        )?;
        Ok(affected)
    }

    /// Receipt side: the peer `reader` reported having seen everything up to
    /// `up_to_ts`.  Marks our outbound rows seen in one comparison instead of
    /// per-message round trips.  Returns the number of rows that flipped.
    pub fn mark_seen_up_to(&self, chat: &ChatId, up_to_ts: i64, reader: &UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET seen = 1, delivered = 1
             WHERE chat_id = ?1 AND timestamp <= ?2 AND sender != ?3 AND seen = 0",
            params![chat.as_str(), up_to_ts, reader.as_str()],
        )?;
        Ok(affected)
    }

    /// Delete a message row.  Returns `true` if a row was deleted.
    pub fn delete_message(&self, id: &MessageId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM messages WHERE id = ?1", params![id.as_str()])?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single message by id.
    pub fn get_message(&self, id: &MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.as_str()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Cheap existence probe, used by reference back-fill.
    pub fn message_exists(&self, id: &MessageId) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Newest messages in a chat, display order: `timestamp DESC, id DESC`.
    /// The id tie-break keeps ordering deterministic across devices.
    pub fn get_messages(&self, chat: &ChatId, limit: u32, offset: u32) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chat_id = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2 OFFSET ?3"
        ))?;

        let rows = stmt.query_map(params![chat.as_str(), limit, offset], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Messages strictly older than `before_ts`, newest first.  Drives
    /// scroll-back pagination.
    pub fn get_messages_before(
        &self,
        chat: &ChatId,
        before_ts: i64,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chat_id = ?1 AND timestamp < ?2
             ORDER BY timestamp DESC, id DESC
             LIMIT ?3"
        ))?;

        let rows = stmt.query_map(params![chat.as_str(), before_ts, limit], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Messages inside a closed timestamp window, newest first.  Drives
    /// jump-to-reference views after a back-fill.
    pub fn get_messages_in_range(
        &self,
        chat: &ChatId,
        low_ts: i64,
        high_ts: i64,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chat_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3
             ORDER BY timestamp DESC, id DESC"
        ))?;

        let rows = stmt.query_map(params![chat.as_str(), low_ts, high_ts], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const MESSAGE_COLUMNS: &str = "id, chat_id, sender, receiver, text, media_url, \
                               reply_to_id, reply_to_text, timestamp, delivered, seen";

/// Map a `rusqlite::Row` to a [`Message`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: MessageId(row.get(0)?),
        chat_id: ChatId(row.get(1)?),
        sender: UserId(row.get(2)?),
        receiver: row.get::<_, Option<String>>(3)?.map(UserId),
        text: row.get(4)?,
        media_url: row.get(5)?,
        reply_to_id: row.get::<_, Option<String>>(6)?.map(MessageId),
        reply_to_text: row.get(7)?,
        timestamp: row.get(8)?,
        delivered: row.get(9)?,
        seen: row.get(10)?,
    })
}
