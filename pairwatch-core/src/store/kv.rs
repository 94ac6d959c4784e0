//! Key-value backends for the position store.
//!
//! Contract: strongly consistent per key, no cross-key transactions. Each
//! pair's record lives under a single key, so a record write is atomic.
//! Writes are conditional (`compare_and_swap`), and the condition is checked by
//! the backend itself: for `SqliteKv` that holds across every process sharing
//! the database file.

use super::StoreError;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tracing::debug;

/// Persistent string key-value store with conditional writes.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write `value` only if the key currently holds `expected` (`None`: the key
    /// is absent). Returns `false`, writing nothing, when the condition fails.
    fn compare_and_swap(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool, StoreError>;

    /// All keys starting with `prefix`, sorted.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// In-process backend. State is lost on exit.
#[derive(Debug, Default)]
pub struct MemoryKv {
    map: RwLock<BTreeMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let map = self.map.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.get(key).cloned())
    }

    fn compare_and_swap(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool, StoreError> {
        let mut map = self.map.write().map_err(|_| StoreError::LockPoisoned)?;
        if map.get(key).map(String::as_str) != expected {
            return Ok(false);
        }
        map.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let map = self.map.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }
}

/// SQLite-backed store: one `kv(key, value)` table in WAL mode.
///
/// Every read goes to the database, and a swap is a single conditional
/// `INSERT OR IGNORE` / `UPDATE ... WHERE value = ?`, so overlapping
/// `pairwatch cycle` processes see each other's writes and cannot both apply a
/// write computed from the same read.
#[derive(Debug)]
pub struct SqliteKv {
    path: PathBuf,
    conn: Mutex<Connection>,
}

/// Lock wait before a write gives up with `StoreError::Io`.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl SqliteKv {
    /// Open (or create) the database at `path`.
    ///
    /// A file that exists but is not a database is an error, never silently
    /// reset: losing state would re-send alerts that were already delivered.
    pub fn open(path: impl Into<PathBuf>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Io(format!("create dir {}: {e}", parent.display())))?;
            }
        }

        let conn = Connection::open(&path).map_err(|e| sql_error(&path, e))?;
        conn.busy_timeout(busy_timeout).map_err(|e| sql_error(&path, e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| sql_error(&path, e))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| sql_error(&path, e))?;
        debug!(path = %path.display(), "state store opened");

        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

fn sql_error(path: &Path, e: rusqlite::Error) -> StoreError {
    match e.sqlite_error_code() {
        Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt) => StoreError::Corrupt {
            key: path.display().to_string(),
            reason: e.to_string(),
        },
        _ => StoreError::Io(format!("{}: {e}", path.display())),
    }
}

impl KvBackend for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.conn()?
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(|e| sql_error(&self.path, e))
    }

    fn compare_and_swap(&self, key: &str, expected: Option<&str>, value: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = match expected {
            None => conn.execute("INSERT OR IGNORE INTO kv (key, value) VALUES (?1, ?2)", params![key, value]),
            Some(old) => conn.execute(
                "UPDATE kv SET value = ?3 WHERE key = ?1 AND value = ?2",
                params![key, old, value],
            ),
        }
        .map_err(|e| sql_error(&self.path, e))?;
        Ok(changed == 1)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")
            .map_err(|e| sql_error(&self.path, e))?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get(0))
            .map_err(|e| sql_error(&self.path, e))?
            .collect::<Result<Vec<String>, _>>()
            .map_err(|e| sql_error(&self.path, e))?;
        Ok(keys)
    }
}
