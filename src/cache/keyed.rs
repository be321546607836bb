//! Keyed cache with an optional time-to-live on top of a storage backend.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::{CacheStorage, StoredEntry};

/// Persistent key/value cache.
///
/// Values survive restarts but are only a hint: losing an entry forces a
/// re-fetch and nothing else. Expired entries are treated as absent and
/// removed on the read that notices them.
#[derive(Clone)]
pub struct PersistentCache {
  storage: Arc<dyn CacheStorage>,
  ttl: Option<Duration>,
}

impl PersistentCache {
  /// Create a cache that never expires entries.
  #[cfg(test)]
  pub fn new<S: CacheStorage + 'static>(storage: S) -> Self {
    Self::from_shared(Arc::new(storage))
  }

  pub fn from_shared(storage: Arc<dyn CacheStorage>) -> Self {
    Self { storage, ttl: None }
  }

  /// Set the time-to-live applied to subsequent writes. `None` never expires.
  pub fn with_ttl(mut self, ttl: Option<std::time::Duration>) -> Self {
    self.ttl = ttl.and_then(|t| Duration::from_std(t).ok());
    self
  }

  /// Read a value, treating expired or undecodable entries as absent.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    self.get_at(key, Utc::now())
  }

  /// Write a value whole, stamped with the current time.
  pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
    self.set_at(key, value, Utc::now())
  }

  pub fn remove(&self, key: &str) -> Result<()> {
    self.storage.delete(key)
  }

  pub(crate) fn get_at<T: DeserializeOwned>(
    &self,
    key: &str,
    now: DateTime<Utc>,
  ) -> Result<Option<T>> {
    let Some(entry) = self.storage.read(key)? else {
      return Ok(None);
    };

    if entry.is_expired_at(now.trunc_subsecs(3)) {
      debug!(key, "cache entry expired");
      self.storage.delete(key)?;
      return Ok(None);
    }

    match serde_json::from_slice(&entry.value) {
      Ok(value) => Ok(Some(value)),
      Err(e) => {
        warn!(key, error = %e, "discarding undecodable cache entry");
        self.storage.delete(key)?;
        Ok(None)
      }
    }
  }

  pub(crate) fn set_at<T: Serialize>(&self, key: &str, value: &T, now: DateTime<Utc>) -> Result<()> {
    let value =
      serde_json::to_vec(value).map_err(|e| eyre!("Failed to serialize cache value: {}", e))?;

    // Storage keeps milliseconds
    let now = now.trunc_subsecs(3);
    let entry = StoredEntry {
      value,
      stored_at: now,
      expires_at: self.ttl.map(|ttl| now + ttl),
    };

    self.storage.write(key, &entry)
  }

  /// Start observing writes made to the store by other processes.
  pub fn watch(&self) -> CacheWatch {
    let seen = self.storage.data_version().ok();
    CacheWatch {
      storage: Arc::clone(&self.storage),
      seen,
    }
  }
}

/// Detects commits made to the store by another process since the last check.
///
/// Writes through the same store handle are not reported.
pub struct CacheWatch {
  storage: Arc<dyn CacheStorage>,
  seen: Option<i64>,
}

impl CacheWatch {
  /// Returns `true` once per batch of foreign commits.
  pub fn changed(&mut self) -> bool {
    match self.storage.data_version() {
      Ok(version) => {
        let changed = self.seen.is_some_and(|seen| seen != version);
        self.seen = Some(version);
        changed
      }
      Err(e) => {
        warn!(error = %e, "failed to poll cache for external changes");
        false
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::SqliteStorage;

  fn memory_cache(ttl: Option<std::time::Duration>) -> PersistentCache {
    PersistentCache::new(SqliteStorage::open_in_memory().unwrap()).with_ttl(ttl)
  }

  #[test]
  fn test_set_then_get_returns_value() {
    let cache = memory_cache(Some(std::time::Duration::from_secs(300)));
    let value = vec!["north".to_string(), "south".to_string()];
    cache.set("warehouses", &value).unwrap();
    assert_eq!(cache.get::<Vec<String>>("warehouses").unwrap(), Some(value));
  }

  #[test]
  fn test_entry_is_absent_after_ttl() {
    let ttl = std::time::Duration::from_secs(60);
    let cache = memory_cache(Some(ttl));
    let t0 = Utc::now();
    cache.set_at("k", &42u32, t0).unwrap();

    let just_before = t0 + Duration::seconds(60);
    assert_eq!(cache.get_at::<u32>("k", just_before).unwrap(), Some(42));

    let after = t0 + Duration::seconds(60) + Duration::milliseconds(1);
    assert_eq!(cache.get_at::<u32>("k", after).unwrap(), None);

    // Proactively removed, not merely hidden
    assert_eq!(cache.get_at::<u32>("k", t0).unwrap(), None);
  }

  #[test]
  fn test_sub_millisecond_write_time_does_not_shorten_ttl() {
    let cache = memory_cache(Some(std::time::Duration::from_secs(60)));
    let t0 = DateTime::from_timestamp(1_700_000_000, 999_999_999).unwrap();
    cache.set_at("k", &42u32, t0).unwrap();

    let boundary = t0 + Duration::seconds(60);
    assert_eq!(cache.get_at::<u32>("k", boundary).unwrap(), Some(42));

    let past = boundary + Duration::milliseconds(1);
    assert_eq!(cache.get_at::<u32>("k", past).unwrap(), None);
  }

  #[test]
  fn test_no_ttl_never_expires() {
    let cache = memory_cache(None);
    let t0 = Utc::now();
    cache.set_at("k", &"v", t0).unwrap();
    let much_later = t0 + Duration::days(365);
    assert_eq!(
      cache.get_at::<String>("k", much_later).unwrap(),
      Some("v".to_string())
    );
  }

  #[test]
  fn test_undecodable_entry_is_treated_as_absent() {
    let cache = memory_cache(None);
    cache.set("k", &"not a number").unwrap();
    assert_eq!(cache.get::<u32>("k").unwrap(), None);
    assert_eq!(cache.get::<String>("k").unwrap(), None);
  }

  #[test]
  fn test_watch_reports_foreign_writes_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let ours = PersistentCache::new(SqliteStorage::open(&path).unwrap());
    let theirs = PersistentCache::new(SqliteStorage::open(&path).unwrap());

    let mut watch = ours.watch();
    ours.set("k", &1u32).unwrap();
    assert!(!watch.changed());

    theirs.set("k", &2u32).unwrap();
    assert!(watch.changed());
    assert!(!watch.changed());
    assert_eq!(ours.get::<u32>("k").unwrap(), Some(2));
  }
}
