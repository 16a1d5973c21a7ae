//! v001 -- Initial schema creation.
//!
//! Creates the five core tables: `chats`, `messages`, `unread_counts`,
//! `pending_deletions`, and `sync_cursors`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
///
/// All timestamps are sender-assigned epoch milliseconds (INTEGER); they are
/// the ordering unit for display and the cursor unit for sync.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Chats (direct pairs and groups)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id           TEXT PRIMARY KEY NOT NULL,   -- "dm:{lo}:{hi}" or "group:{id}"
    kind         TEXT NOT NULL,               -- 'direct' | 'group'
    participants TEXT NOT NULL,               -- JSON array of user ids
    display_name TEXT,
    photo_url    TEXT,
    created_at   INTEGER NOT NULL             -- epoch ms
);

-- ----------------------------------------------------------------
-- Messages, stored decrypted. Wire crypto fields never land here.
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id            TEXT PRIMARY KEY NOT NULL,  -- "{chat_id}:{ts:013}:{suffix}"
    chat_id       TEXT NOT NULL,
    sender        TEXT NOT NULL,
    receiver      TEXT,                       -- NULL for group messages
    text          TEXT NOT NULL,
    media_url     TEXT,
    reply_to_id   TEXT,                       -- may dangle; not a FK
    reply_to_text TEXT,
    timestamp     INTEGER NOT NULL,           -- epoch ms, sender-assigned
    delivered     INTEGER NOT NULL DEFAULT 0, -- boolean 0/1, monotonic
    seen          INTEGER NOT NULL DEFAULT 0  -- boolean 0/1, monotonic
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_ts
    ON messages(chat_id, timestamp DESC, id DESC);

-- ----------------------------------------------------------------
-- Unread counters, one row per chat
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS unread_counts (
    chat_id          TEXT PRIMARY KEY NOT NULL,
    count            INTEGER NOT NULL DEFAULT 0,
    unread_timestamp INTEGER                  -- first unseen ts, NULL when read
);

-- ----------------------------------------------------------------
-- Deletions queued while offline, drained on reconnect
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS pending_deletions (
    message_id TEXT PRIMARY KEY NOT NULL,
    chat_id    TEXT NOT NULL,
    target     TEXT,                          -- peer user id (direct only)
    is_group   INTEGER NOT NULL DEFAULT 0,
    media_url  TEXT,                          -- captured before the row dies
    queued_at  INTEGER NOT NULL               -- epoch ms, drain order
);

-- ----------------------------------------------------------------
-- Per-chat sync cursors (newest durably fetched timestamp)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sync_cursors (
    chat_id TEXT PRIMARY KEY NOT NULL,
    last_ts INTEGER NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
