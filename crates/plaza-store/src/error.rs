use thiserror::Error;

/// Errors surfaced by the local store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Anything SQLite itself rejected.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No platform data directory could be resolved.
    #[error("No writable application data directory")]
    NoDataDir,

    /// Filesystem trouble while preparing the database location.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A lookup expected a row that is not there.
    #[error("Record not found")]
    NotFound,

    /// A schema migration step failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// A structured column failed to (de)serialize.
    #[error("Column JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
