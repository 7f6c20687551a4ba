//! SQLite storage backend.
//!
//! Single-file vault database: a `meta` key/value table for the
//! configuration blob and an `entries` table for credential rows.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::backend::{EntryRecord, StorageBackend};
use keyhaven_common::{Error, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS entries (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    username TEXT,
    url TEXT,
    notes TEXT,
    password_ct BLOB,
    recovery_codes_ct BLOB,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    last_rotated_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_entries_updated_at ON entries(updated_at);
"#;

const CONFIG_KEY: &str = "config";

const ENTRY_COLUMNS: &str =
    "id, title, username, url, notes, password_ct, recovery_codes_ct, \
     created_at, updated_at, last_rotated_at";

/// SQLite-backed entry storage.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Create or open a vault database file.
    ///
    /// Parent directories are created as needed; the schema is applied on
    /// every open.
    ///
    /// # Errors
    /// - `Storage` on database open or migration failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path).map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        info!(path = %db_path.display(), "vault database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRecord> {
    Ok(EntryRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        username: row.get(2)?,
        url: row.get(3)?,
        notes: row.get(4)?,
        password_ct: row.get(5)?,
        recovery_codes_ct: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        last_rotated_at: row.get(9)?,
    })
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load_config(&self) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![CONFIG_KEY],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)
    }

    async fn save_config(&self, config: Vec<u8>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![CONFIG_KEY, config],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_entry(&self, record: &EntryRecord) -> Result<()> {
        debug!(id = %record.id, "inserting entry row");
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO entries (id, title, username, url, notes, password_ct, \
             recovery_codes_ct, created_at, updated_at, last_rotated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id,
                record.title,
                record.username,
                record.url,
                record.notes,
                record.password_ct,
                record.recovery_codes_ct,
                record.created_at,
                record.updated_at,
                record.last_rotated_at,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_entry(&self, id: &str) -> Result<Option<EntryRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {} FROM entries WHERE id = ?1", ENTRY_COLUMNS),
            params![id],
            row_to_record,
        )
        .optional()
        .map_err(db_err)
    }

    async fn update_entry(&self, record: &EntryRecord) -> Result<bool> {
        debug!(id = %record.id, "updating entry row");
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE entries SET title = ?2, username = ?3, url = ?4, notes = ?5, \
                 password_ct = ?6, recovery_codes_ct = ?7, updated_at = ?8, \
                 last_rotated_at = ?9 WHERE id = ?1",
                params![
                    record.id,
                    record.title,
                    record.username,
                    record.url,
                    record.notes,
                    record.password_ct,
                    record.recovery_codes_ct,
                    record.updated_at,
                    record.last_rotated_at,
                ],
            )
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    async fn delete_entry(&self, id: &str) -> Result<bool> {
        debug!(id = %id, "deleting entry row");
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute("DELETE FROM entries WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    async fn list_entries(&self) -> Result<Vec<EntryRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM entries ORDER BY updated_at DESC",
                ENTRY_COLUMNS
            ))
            .map_err(db_err)?;

        let rows = stmt.query_map([], row_to_record).map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(db_err)?);
        }
        Ok(records)
    }

    async fn replace_all(&self, config: Vec<u8>, records: Vec<EntryRecord>) -> Result<()> {
        info!(rows = records.len(), "replacing vault contents");
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute("DELETE FROM entries", []).map_err(db_err)?;
        tx.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![CONFIG_KEY, config],
        )
        .map_err(db_err)?;

        for record in &records {
            tx.execute(
                "INSERT INTO entries (id, title, username, url, notes, password_ct, \
                 recovery_codes_ct, created_at, updated_at, last_rotated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id,
                    record.title,
                    record.username,
                    record.url,
                    record.notes,
                    record.password_ct,
                    record.recovery_codes_ct,
                    record.created_at,
                    record.updated_at,
                    record.last_rotated_at,
                ],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str, updated_at: i64) -> EntryRecord {
        EntryRecord {
            id: id.to_string(),
            title: title.to_string(),
            username: Some("dev".to_string()),
            url: None,
            notes: None,
            password_ct: Some(vec![1, 2, 3]),
            recovery_codes_ct: None,
            created_at: updated_at,
            updated_at,
            last_rotated_at: None,
        }
    }

    #[tokio::test]
    async fn test_config_roundtrip() {
        let backend = SqliteBackend::in_memory().unwrap();

        assert!(backend.load_config().await.unwrap().is_none());

        backend.save_config(vec![9, 8, 7]).await.unwrap();
        assert_eq!(backend.load_config().await.unwrap(), Some(vec![9, 8, 7]));
    }

    #[tokio::test]
    async fn test_insert_get_delete() {
        let backend = SqliteBackend::in_memory().unwrap();
        let rec = record("abc", "GitHub", 100);

        backend.insert_entry(&rec).await.unwrap();
        assert_eq!(backend.get_entry("abc").await.unwrap(), Some(rec));

        assert!(backend.delete_entry("abc").await.unwrap());
        assert!(backend.get_entry("abc").await.unwrap().is_none());
        assert!(!backend.delete_entry("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_missing_row() {
        let backend = SqliteBackend::in_memory().unwrap();

        assert!(!backend.update_entry(&record("nope", "x", 1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_ordered_by_recency() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.insert_entry(&record("a", "old", 100)).await.unwrap();
        backend.insert_entry(&record("b", "new", 300)).await.unwrap();
        backend.insert_entry(&record("c", "mid", 200)).await.unwrap();

        let ids: Vec<String> = backend
            .list_entries()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();

        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_replace_all_swaps_contents() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.save_config(vec![1]).await.unwrap();
        backend.insert_entry(&record("a", "old", 100)).await.unwrap();

        backend
            .replace_all(vec![2], vec![record("b", "new", 200)])
            .await
            .unwrap();

        assert_eq!(backend.load_config().await.unwrap(), Some(vec![2]));
        let entries = backend.list_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "b");
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("vault.db");

        {
            let backend = SqliteBackend::open(&db_path).unwrap();
            backend.save_config(vec![5]).await.unwrap();
            backend.insert_entry(&record("a", "Bank", 42)).await.unwrap();
        }

        let backend = SqliteBackend::open(&db_path).unwrap();
        assert_eq!(backend.load_config().await.unwrap(), Some(vec![5]));
        assert_eq!(backend.list_entries().await.unwrap().len(), 1);
    }
}
