use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;

use crate::error::Result;

/// The persistence surface the memory subsystem is built on: a small
/// key-value interface with advisory TTLs and bounded lists. Values are
/// opaque bytes; callers own the serialization.
pub trait KvStore: Send + Sync {
    /// Store a value under `key`. `ttl_secs` of `None` means no expiry.
    fn put(&self, key: &str, value: &[u8], ttl_secs: Option<u64>) -> Result<()>;

    /// Fetch a value. Expired entries read as absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Append to a bounded list; once `cap` entries exist the oldest are
    /// dropped.
    fn append_bounded_list(&self, key: &str, value: &[u8], cap: usize) -> Result<()>;

    /// Read up to `n` most-recent list entries, oldest first.
    fn list_head(&self, key: &str, n: usize) -> Result<Vec<Vec<u8>>>;

    /// Remove a key (both scalar and list forms).
    fn delete(&self, key: &str) -> Result<()>;
}

/// SQLite-backed [`KvStore`].
///
/// Thread-safe: wraps the connection in a Mutex, same as the rest of the
/// workspace's SQLite usage. Expiry is lazy — expired rows are deleted when
/// read past their deadline.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    pub fn open(path: &str) -> Result<Self> {
        Self::new(Connection::open(path)?)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }
}

/// Initialise KV tables. Safe to call on every startup (idempotent).
fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv (
            key        TEXT PRIMARY KEY,
            value      BLOB NOT NULL,
            expires_at TEXT
        );
        CREATE TABLE IF NOT EXISTS kv_list (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            key        TEXT NOT NULL,
            value      BLOB NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_kv_list_key
            ON kv_list(key, id);",
    )
}

impl KvStore for SqliteStore {
    fn put(&self, key: &str, value: &[u8], ttl_secs: Option<u64>) -> Result<()> {
        let db = self.db.lock().unwrap();
        let expires_at = ttl_secs
            .map(|s| (Utc::now() + chrono::Duration::seconds(s as i64)).to_rfc3339());
        db.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, expires_at = ?3",
            rusqlite::params![key, value, expires_at],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let db = self.db.lock().unwrap();
        let row: Option<(Vec<u8>, Option<String>)> = db
            .query_row(
                "SELECT value, expires_at FROM kv WHERE key = ?1",
                rusqlite::params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();

        match row {
            Some((value, expires_at)) => {
                if let Some(deadline) = expires_at {
                    if deadline < Utc::now().to_rfc3339() {
                        db.execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key])?;
                        return Ok(None);
                    }
                }
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn append_bounded_list(&self, key: &str, value: &[u8], cap: usize) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO kv_list (key, value, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, value, Utc::now().to_rfc3339()],
        )?;
        // Trim anything older than the newest `cap` rows.
        db.execute(
            "DELETE FROM kv_list WHERE key = ?1 AND id NOT IN (
                SELECT id FROM kv_list WHERE key = ?1 ORDER BY id DESC LIMIT ?2
            )",
            rusqlite::params![key, cap],
        )?;
        Ok(())
    }

    fn list_head(&self, key: &str, n: usize) -> Result<Vec<Vec<u8>>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT value FROM kv_list WHERE key = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![key, n], |row| row.get::<_, Vec<u8>>(0))?;
        // Reverse so oldest first.
        let mut values: Vec<Vec<u8>> = rows.filter_map(|r| r.ok()).collect();
        values.reverse();
        Ok(values)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute("DELETE FROM kv WHERE key = ?1", rusqlite::params![key])?;
        db.execute("DELETE FROM kv_list WHERE key = ?1", rusqlite::params![key])?;
        Ok(())
    }
}

/// Serialize a value into the store.
pub fn put_json<T: serde::Serialize>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    ttl_secs: Option<u64>,
) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    store.put(key, &bytes, ttl_secs)
}

/// Read a value back out, tolerating absence.
pub fn get_json<T: serde::de::DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}
