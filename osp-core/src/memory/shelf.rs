//! SQLite-backed shelf: the embedded, file-backed fallback tier.

use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::ReentrantMutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::anchor::{AnchorId, StoredRecord};
use crate::error::Result;
use crate::memory::schema::initialize_schema;

/// File-backed fallback store.
///
/// Every access goes through a re-entrant lock, so a read-modify-write
/// sequence wrapped in [`ShelfStore::atomically`] can call the other methods
/// without deadlocking and without interleaving with other threads.
pub struct ShelfStore {
    conn: ReentrantMutex<Connection>,
    path: Option<PathBuf>,
}

impl ShelfStore {
    /// Open or create a shelf at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::Error::storage("shelf", e.to_string()))?;
        }

        let conn = Connection::open(path)?;
        initialize_schema(&conn)?;

        Ok(Self {
            conn: ReentrantMutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Create an in-memory shelf (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;

        Ok(Self {
            conn: ReentrantMutex::new(conn),
            path: None,
        })
    }

    /// Location on disk, `None` for in-memory shelves.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn).map_err(Into::into)
    }

    /// Run `f` while holding the shelf lock.
    pub fn atomically<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let _guard = self.conn.lock();
        f(self)
    }

    /// Get a record by anchor id.
    pub fn get(&self, id: &AnchorId) -> Result<Option<StoredRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, data, type FROM shelf WHERE key = ?1",
                params![id.storage_key()],
                |row| {
                    Ok(StoredRecord {
                        id: row.get(0)?,
                        data: row.get(1)?,
                        type_name: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Insert or replace a record.
    pub fn put(&self, record: &StoredRecord) -> Result<()> {
        self.with_conn(|conn| {
            Self::upsert(conn, record)?;
            Ok(())
        })
    }

    /// Insert or replace several records in one transaction.
    pub fn put_many(&self, records: &[StoredRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            for record in records {
                Self::upsert(&tx, record)?;
            }
            tx.commit()
        })
    }

    fn upsert(conn: &Connection, record: &StoredRecord) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO shelf (key, id, type, data, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET
                type = excluded.type,
                data = excluded.data,
                updated_at = excluded.updated_at",
            params![
                record.key(),
                record.id,
                record.type_name,
                record.data,
                Utc::now().to_rfc3339(),
            ],
        )
    }

    /// Delete a record.
    pub fn delete(&self, id: &AnchorId) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = conn.execute("DELETE FROM shelf WHERE key = ?1", params![id.storage_key()])?;
            Ok(rows > 0)
        })
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM shelf", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Ids of all stored records of an archetype.
    pub fn ids_of_type(&self, type_name: &str) -> Result<Vec<AnchorId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM shelf WHERE type = ?1 ORDER BY updated_at")?;
            let ids = stmt
                .query_map(params![type_name], |row| row.get::<_, String>(0))?
                .filter_map(|r| r.ok())
                .filter_map(|s| AnchorId::parse(&s).ok())
                .collect();
            Ok(ids)
        })
    }
}
