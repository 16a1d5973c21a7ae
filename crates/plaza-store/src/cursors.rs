//! Per-chat sync cursors.
//!
//! A cursor is the newest timestamp whose messages are known to be durably
//! fetched for that chat.  Catch-up sync asks the remote log for everything
//! after it.  Cursors only move forward.

use rusqlite::params;

use plaza_shared::ChatId;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Current cursor for a chat; `None` means never synced (fetch from the
    /// beginning).
    pub fn cursor(&self, chat: &ChatId) -> Result<Option<i64>> {
        let cursor = self.conn().query_row(
            "SELECT last_ts FROM sync_cursors WHERE chat_id = ?1",
            params![chat.as_str()],
            |row| row.get(0),
        );

        match cursor {
            Ok(ts) => Ok(Some(ts)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    /// Advance the cursor to `ts`.  Max semantics: a stale advance (ts at or
    /// below the stored value) is a no-op, so concurrent catch-up pages can
    /// report out of order.
    pub fn advance_cursor(&self, chat: &ChatId, ts: i64) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sync_cursors (chat_id, last_ts)
             VALUES (?1, ?2)
             ON CONFLICT(chat_id) DO UPDATE SET
                 last_ts = MAX(sync_cursors.last_ts, excluded.last_ts)",
            params![chat.as_str(), ts],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_starts_unset_and_moves_forward() {
        let db = Database::open_in_memory().unwrap();
        let chat = ChatId::group("g1");

        assert_eq!(db.cursor(&chat).unwrap(), None);

        db.advance_cursor(&chat, 5_000).unwrap();
        assert_eq!(db.cursor(&chat).unwrap(), Some(5_000));

        // Regressions are ignored.
        db.advance_cursor(&chat, 3_000).unwrap();
        assert_eq!(db.cursor(&chat).unwrap(), Some(5_000));

        db.advance_cursor(&chat, 8_000).unwrap();
        assert_eq!(db.cursor(&chat).unwrap(), Some(8_000));
    }
}
