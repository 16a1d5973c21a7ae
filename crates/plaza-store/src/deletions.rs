//! Tombstone queue for deletions performed while offline.
//!
//! Deleting a message removes the row immediately and enqueues a
//! [`PendingDeletion`].  The sync engine drains the queue on reconnect and
//! clears each entry only after the remote side acknowledged; every replay
//! step is idempotent, so a crash mid-drain just repeats work.

use rusqlite::params;

use plaza_shared::{ChatId, MessageId, UserId};

use crate::database::Database;
use crate::error::Result;
use crate::models::PendingDeletion;

impl Database {
    /// Queue a deletion for replay.  Re-queuing the same message id is a
    /// no-op.
    pub fn enqueue_pending_deletion(&self, deletion: &PendingDeletion) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO pending_deletions
                 (message_id, chat_id, target, is_group, media_url, queued_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                deletion.message_id.as_str(),
                deletion.chat_id.as_str(),
                deletion.target.as_ref().map(|t| t.as_str()),
                deletion.is_group,
                deletion.media_url,
                deletion.queued_at,
            ],
        )?;
        Ok(())
    }

    /// All queued deletions in enqueue order.
    pub fn list_pending_deletions(&self) -> Result<Vec<PendingDeletion>> {
        let mut stmt = self.conn().prepare(
            "SELECT message_id, chat_id, target, is_group, media_url, queued_at
             FROM pending_deletions
             ORDER BY queued_at ASC, message_id ASC",
        )?;

        let rows = stmt.query_map([], row_to_deletion)?;

        let mut deletions = Vec::new();
        for row in rows {
            deletions.push(row?);
        }
        Ok(deletions)
    }

    /// Remove a tombstone after the remote side acknowledged the deletion.
    /// Returns `true` if the entry was still queued.
    pub fn clear_pending_deletion(&self, message_id: &MessageId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM pending_deletions WHERE message_id = ?1",
            params![message_id.as_str()],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`PendingDeletion`].
fn row_to_deletion(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingDeletion> {
    Ok(PendingDeletion {
        message_id: MessageId(row.get(0)?),
        chat_id: ChatId(row.get(1)?),
        target: row.get::<_, Option<String>>(2)?.map(UserId),
        is_group: row.get(3)?,
        media_url: row.get(4)?,
        queued_at: row.get(5)?,
    })
}
