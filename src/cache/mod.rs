//! Persistent cache for list data and the session.
//!
//! This module provides a small keyed store that:
//! - Persists JSON values across restarts in SQLite
//! - Expires entries after a configurable time-to-live
//! - Reports writes made by other processes sharing the same file

mod keyed;
mod storage;

pub use keyed::{CacheWatch, PersistentCache};
pub use storage::{CacheStorage, NoopStorage, SqliteStorage};
