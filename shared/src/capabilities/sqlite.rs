use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, instrument};

use super::kv::{KvError, KvKey, LocalStore, StorageErrorCode, MAX_VALUE_SIZE};
use crate::get_current_time_ms;

/// SQLite-backed [`LocalStore`]. One row per key.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn map_err(e: &rusqlite::Error) -> KvError {
    let code = match e.sqlite_error_code() {
        Some(rusqlite::ErrorCode::DatabaseBusy) => StorageErrorCode::Busy,
        Some(rusqlite::ErrorCode::DatabaseLocked) => StorageErrorCode::Locked,
        Some(rusqlite::ErrorCode::DiskFull) => StorageErrorCode::DiskFull,
        Some(rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase) => {
            StorageErrorCode::Corrupted
        }
        Some(rusqlite::ErrorCode::CannotOpen) => StorageErrorCode::Unavailable,
        Some(rusqlite::ErrorCode::SystemIoFailure) => StorageErrorCode::IoError,
        _ => StorageErrorCode::Unknown,
    };
    KvError::storage(code, e.to_string())
}

impl SqliteStore {
    #[instrument(skip(path))]
    pub fn open(path: &Path) -> Result<Self, KvError> {
        let conn = Connection::open(path).map_err(|e| map_err(&e))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, KvError> {
        let conn = Connection::open_in_memory().map_err(|e| map_err(&e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, KvError> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )
        .map_err(|e| map_err(&e))?;
        debug!("local store ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl LocalStore for SqliteStore {
    fn get(&self, key: &KvKey) -> Result<Option<String>, KvError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key.raw()],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|e| map_err(&e))
    }

    fn set(&self, key: &KvKey, value: &str) -> Result<(), KvError> {
        if value.len() > MAX_VALUE_SIZE {
            return Err(KvError::ValueTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        let now = i64::try_from(get_current_time_ms()).unwrap_or(i64::MAX);
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            r"
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
            params![key.raw(), value, now],
        )
        .map_err(|e| map_err(&e))?;
        Ok(())
    }

    fn remove(&self, key: &KvKey) -> Result<(), KvError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key.raw()])
            .map_err(|e| map_err(&e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::KeyNamespace;

    fn key(name: &str) -> KvKey {
        KvKey::new(KeyNamespace::UserData, name).unwrap()
    }

    #[test]
    fn upsert_overwrites_previous_value() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set(&key("userProfile"), r#"{"name":"a"}"#).unwrap();
        store.set(&key("userProfile"), r#"{"name":"b"}"#).unwrap();
        assert_eq!(
            store.get(&key("userProfile")).unwrap().as_deref(),
            Some(r#"{"name":"b"}"#)
        );
    }

    #[test]
    fn missing_key_reads_as_none() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get(&key("contacts")).unwrap(), None);
        store.remove(&key("contacts")).unwrap();
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kalinga.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.set(&key("contacts"), "[]").unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get(&key("contacts")).unwrap().as_deref(), Some("[]"));
        reopened.remove(&key("contacts")).unwrap();
        assert_eq!(reopened.get(&key("contacts")).unwrap(), None);
    }
}
