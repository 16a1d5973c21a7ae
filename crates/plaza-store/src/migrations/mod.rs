//! Database migration runner.
//!
//! Every [`Database::open_at`] / [`Database::open_in_memory`] call walks the
//! step table below and applies whatever the `user_version` pragma says is
//! still missing, so an old database upgrades in place on first open.
//!
//! [`Database::open_at`]: crate::Database::open_at
//! [`Database::open_in_memory`]: crate::Database::open_in_memory

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> rusqlite::Result<()>;

/// Ordered schema steps. Entry N upgrades a database at `user_version` N to
/// N + 1; appending a `(name, up)` pair here is all a new migration needs.
const STEPS: &[(&str, Step)] = &[("v001_initial", v001_initial::up)];

/// Schema version a fully migrated database reports.
pub(crate) const CURRENT_VERSION: u32 = STEPS.len() as u32;

/// Apply every step the connection's `user_version` has not seen yet.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let applied: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::info!(
        current_version = applied,
        target_version = CURRENT_VERSION,
        "checking database migrations"
    );

    for (version, (name, step)) in STEPS.iter().enumerate().skip(applied as usize) {
        tracing::info!(migration = name, "applying schema migration");
        step(conn).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        conn.pragma_update(None, "user_version", version as u32 + 1)?;
    }

    Ok(())
}
