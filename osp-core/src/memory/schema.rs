//! SQLite schema for the shelf store.

use rusqlite::{Connection, Result as SqliteResult};

/// Layout version recorded in `PRAGMA user_version`.
pub(crate) const SCHEMA_VERSION: i32 = 1;

/// Bring `conn` up to [`SCHEMA_VERSION`]. Safe to call on every open.
pub(crate) fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    // WAL lets readers in other processes proceed during a commit
    conn.pragma_update(None, "journal_mode", "WAL")?;

    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    // One row per stored record, keyed `anchor:<id>`
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS shelf (
            key TEXT PRIMARY KEY,
            id TEXT NOT NULL,
            type TEXT NOT NULL,
            data TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_shelf_type ON shelf(type);",
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)
}
