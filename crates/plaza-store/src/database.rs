//! SQLite connection handling.
//!
//! [`Database`] owns the [`rusqlite::Connection`]. Every constructor runs
//! migrations before handing the connection out, so callers always see the
//! current schema.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Database filename inside the data directory.
pub const DB_FILE: &str = "plaza.db";

/// Platform-appropriate data directory:
/// - Linux:   `~/.local/share/plaza`
/// - macOS:   `~/Library/Application Support/app.plaza.plaza`
/// - Windows: `{FOLDERID_RoamingAppData}\plaza\plaza\data`
///
/// Callers that keep sibling files next to the database (the device key
/// file does) resolve this once and hand explicit paths around.
pub fn default_data_dir() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("app", "plaza", "plaza").ok_or(StoreError::NoDataDir)?;
    Ok(project_dirs.data_dir().to_path_buf())
}

/// An open, migrated database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the default application database, at [`DB_FILE`]
    /// inside [`default_data_dir`].
    pub fn open_default() -> Result<Self> {
        let data_dir = default_data_dir()?;
        std::fs::create_dir_all(&data_dir)?;

        let db_path = data_dir.join(DB_FILE);

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path, for tests and for
    /// embedding the store inside custom directory layouts.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open a throwaway in-memory database. Used by tests and by the sync
    /// engine's convergence checks.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // WAL keeps readers unblocked while sync batches write. SQLite
        // leaves foreign_keys off unless asked.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// Borrow the underlying connection.
    ///
    /// The typed helpers cover routine access; transactions and ad-hoc
    /// queries go through here.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Filesystem path of the open database, if it has one.
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}
