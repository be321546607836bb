//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A serialized value as it sits in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
  /// JSON-encoded value
  pub value: Vec<u8>,
  /// When the value was written
  pub stored_at: DateTime<Utc>,
  /// When the value stops being served; `None` never expires
  pub expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
    self.expires_at.is_some_and(|expires| now > expires)
  }
}

/// Trait for cache storage backends.
///
/// Entries are always written whole; there is no partial update.
pub trait CacheStorage: Send + Sync {
  /// Read the entry stored under `key`.
  fn read(&self, key: &str) -> Result<Option<StoredEntry>>;

  /// Replace the entry stored under `key`.
  fn write(&self, key: &str, entry: &StoredEntry) -> Result<()>;

  /// Remove the entry stored under `key`.
  fn delete(&self, key: &str) -> Result<()>;

  /// Marker that changes when another process commits to the same store.
  fn data_version(&self) -> Result<i64>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn read(&self, _key: &str) -> Result<Option<StoredEntry>> {
    Ok(None) // Always miss
  }

  fn write(&self, _key: &str, _entry: &StoredEntry) -> Result<()> {
    Ok(()) // Discard
  }

  fn delete(&self, _key: &str) -> Result<()> {
    Ok(())
  }

  fn data_version(&self) -> Result<i64> {
    Ok(0)
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the store at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open the store at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Private store that lives only as long as this value.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::with_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("stockroom").join("cache.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .busy_timeout(std::time::Duration::from_secs(2))
      .map_err(|e| eyre!("Failed to configure cache database: {}", e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_cache (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    stored_at INTEGER NOT NULL,
    expires_at INTEGER
);
"#;

impl CacheStorage for SqliteStorage {
  fn read(&self, key: &str) -> Result<Option<StoredEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(Vec<u8>, i64, Option<i64>)> = conn
      .query_row(
        "SELECT value, stored_at, expires_at FROM kv_cache WHERE key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry {}: {}", key, e))?;

    let Some((value, stored_at, expires_at)) = row else {
      return Ok(None);
    };

    Ok(Some(StoredEntry {
      value,
      stored_at: from_millis(stored_at)?,
      expires_at: expires_at.map(from_millis).transpose()?,
    }))
  }

  fn write(&self, key: &str, entry: &StoredEntry) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv_cache (key, value, stored_at, expires_at)
         VALUES (?, ?, ?, ?)",
        params![
          key,
          entry.value,
          entry.stored_at.timestamp_millis(),
          entry.expires_at.map(|e| e.timestamp_millis())
        ],
      )
      .map_err(|e| eyre!("Failed to store cache entry {}: {}", key, e))?;

    Ok(())
  }

  fn delete(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM kv_cache WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to delete cache entry {}: {}", key, e))?;

    Ok(())
  }

  fn data_version(&self) -> Result<i64> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row("PRAGMA data_version", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to read cache data version: {}", e))
  }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp_millis(millis)
    .ok_or_else(|| eyre!("Invalid timestamp in cache: {}", millis))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  fn entry(value: &str, expires_at: Option<DateTime<Utc>>) -> StoredEntry {
    StoredEntry {
      value: value.as_bytes().to_vec(),
      stored_at: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
      expires_at,
    }
  }

  #[test]
  fn test_write_then_read() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let e = entry("[1,2,3]", None);
    storage.write("numbers", &e).unwrap();
    assert_eq!(storage.read("numbers").unwrap(), Some(e));
  }

  #[test]
  fn test_write_replaces_whole_entry() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let expires = DateTime::from_timestamp_millis(1_700_000_100_000);
    storage.write("k", &entry("old", expires)).unwrap();
    storage.write("k", &entry("new", None)).unwrap();

    let read = storage.read("k").unwrap().unwrap();
    assert_eq!(read.value, b"new".to_vec());
    assert_eq!(read.expires_at, None);
  }

  #[test]
  fn test_delete_missing_key_is_ok() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.delete("nothing").unwrap();
    assert_eq!(storage.read("nothing").unwrap(), None);
  }

  #[test]
  fn test_expiry_check_is_strict() {
    let stored = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
    let e = entry("v", Some(stored + Duration::seconds(5)));
    assert!(!e.is_expired_at(stored + Duration::seconds(5)));
    assert!(e.is_expired_at(stored + Duration::milliseconds(5_001)));
  }

  #[test]
  fn test_data_version_changes_on_foreign_commit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let ours = SqliteStorage::open(&path).unwrap();
    let theirs = SqliteStorage::open(&path).unwrap();

    let before = ours.data_version().unwrap();
    ours.write("k", &entry("mine", None)).unwrap();
    assert_eq!(ours.data_version().unwrap(), before);

    theirs.write("k", &entry("theirs", None)).unwrap();
    assert_ne!(ours.data_version().unwrap(), before);
    assert_eq!(ours.read("k").unwrap().unwrap().value, b"theirs".to_vec());
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    storage.write("k", &entry("v", None)).unwrap();
    assert_eq!(storage.read("k").unwrap(), None);
  }
}
