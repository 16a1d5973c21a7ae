//! Per-chat unread counters.
//!
//! `unread_timestamp` is the seen/unseen boundary: set when the first unread
//! message arrives, cleared when the chat is read, so the UI can render an
//! "unread below here" divider.

use rusqlite::params;

use plaza_shared::ChatId;

use crate::database::Database;
use crate::error::Result;
use crate::models::UnreadState;

impl Database {
    /// Bump the unread count after ingesting a message into a closed chat.
    /// The boundary timestamp sticks to the first unread message.
    pub fn increment_unread(&self, chat: &ChatId, first_unread_ts: i64) -> Result<()> {
        self.conn().execute(
            "INSERT INTO unread_counts (chat_id, count, unread_timestamp)
             VALUES (?1, 1, ?2)
             ON CONFLICT(chat_id) DO UPDATE SET
                 count            = unread_counts.count + 1,
                 unread_timestamp = COALESCE(unread_counts.unread_timestamp,
                                             excluded.unread_timestamp)",
            params![chat.as_str(), first_unread_ts],
        )?;
        Ok(())
    }

    /// Drop the count by one, never below zero.  Used when an unread message
    /// is deleted before the chat is opened.
    pub fn decrement_unread(&self, chat: &ChatId) -> Result<()> {
        self.conn().execute(
            "UPDATE unread_counts SET count = MAX(count - 1, 0) WHERE chat_id = ?1",
            params![chat.as_str()],
        )?;
        Ok(())
    }

    /// Clear the counter and the divider boundary when the chat is opened.
    pub fn reset_unread(&self, chat: &ChatId) -> Result<()> {
        self.conn().execute(
            "INSERT INTO unread_counts (chat_id, count, unread_timestamp)
             VALUES (?1, 0, NULL)
             ON CONFLICT(chat_id) DO UPDATE SET
                 count            = 0,
                 unread_timestamp = NULL",
            params![chat.as_str()],
        )?;
        Ok(())
    }

    /// Current unread state; a chat without a row reads as zero.
    pub fn get_unread(&self, chat: &ChatId) -> Result<UnreadState> {
        let state = self
            .conn()
            .query_row(
                "SELECT count, unread_timestamp FROM unread_counts WHERE chat_id = ?1",
                params![chat.as_str()],
                |row| {
                    Ok(UnreadState {
                        chat_id: chat.clone(),
                        count: row.get(0)?,
                        unread_timestamp: row.get(1)?,
                    })
                },
            );

        match state {
            Ok(state) => Ok(state),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(UnreadState {
                chat_id: chat.clone(),
                count: 0,
                unread_timestamp: None,
            }),
            Err(other) => Err(other.into()),
        }
    }
}
