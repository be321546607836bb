//! Coordinator owning the "current list" of a searchable page.

use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::cancel::CancellableFetch;
use super::debounce::{Debouncer, Trigger};
use super::filter::{CategoryFilter, ListFilter};
use crate::api::{ApiError, ApiResult, ListItem};
use crate::cache::{CacheWatch, PersistentCache};

/// Produces the network request for a search text.
type ListFetcher<T> = Box<dyn Fn(String) -> BoxFuture<'static, ApiResult<Vec<T>>> + Send + Sync>;

/// Lifecycle of the list as observed by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListPhase {
  /// Nothing requested yet; items may be seeded from the cache
  Idle,
  /// A request is in flight
  Loading,
  /// The latest request succeeded
  Settled,
  /// The latest request failed with this message
  Failed(String),
}

struct CacheSlot {
  cache: PersistentCache,
  key: String,
  watch: CacheWatch,
}

/// Single source of truth for `{ items, loading, error }` of one list.
///
/// Search text goes to the server (debounced); the category filter is
/// applied locally and never causes a request. Only the most recently
/// issued request can change the published items.
pub struct ListCoordinator<T> {
  fetcher: ListFetcher<T>,
  fetch: CancellableFetch<Vec<T>>,
  debounce: Debouncer,
  cache: Option<CacheSlot>,
  items: Vec<T>,
  phase: ListPhase,
  /// Query of the request in flight
  in_flight_query: Option<String>,
  /// Query of the last request that completed successfully
  completed_query: Option<String>,
  filter: ListFilter,
}

impl<T> ListCoordinator<T>
where
  T: ListItem + Serialize + DeserializeOwned,
{
  /// Create a coordinator around `fetcher`, which receives the trimmed
  /// search text.
  pub fn new<F, Fut>(fetcher: F, debounce: Duration) -> Self
  where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<Vec<T>>> + Send + 'static,
  {
    Self {
      fetcher: Box::new(move |query| Box::pin(fetcher(query))),
      fetch: CancellableFetch::new(),
      debounce: Debouncer::new(debounce),
      cache: None,
      items: Vec::new(),
      phase: ListPhase::Idle,
      in_flight_query: None,
      completed_query: None,
      filter: ListFilter::default(),
    }
  }

  /// Persist successful results under `key` and seed the list from it.
  pub fn with_cache(mut self, cache: PersistentCache, key: impl Into<String>) -> Self {
    let key = key.into();
    match cache.get::<Vec<T>>(&key) {
      Ok(Some(items)) => {
        debug!(key = %key, count = items.len(), "seeded list from cache");
        self.items = items;
      }
      Ok(None) => {}
      Err(e) => warn!(key = %key, error = %e, "failed to read list cache"),
    }

    let watch = cache.watch();
    self.cache = Some(CacheSlot { cache, key, watch });
    self
  }

  /// Issue the initial unfiltered load. The cache seed is only a hint.
  pub fn mount(&mut self) {
    self.load("");
  }

  /// Load the list for `query` unless that query is already in flight or
  /// was the last one to succeed.
  ///
  /// Returns whether a request was issued.
  pub fn load(&mut self, query: &str) -> bool {
    let query = query.trim().to_string();
    if self.active_query() == Some(query.as_str()) {
      debug!(query = %query, "skipping duplicate load");
      return false;
    }

    debug!(query = %query, "loading list");
    let future = (self.fetcher)(query.clone());
    self.fetch.issue(future);
    self.in_flight_query = Some(query);
    self.phase = ListPhase::Loading;
    true
  }

  /// Load the current search text again, even if it already succeeded.
  pub fn retry(&mut self) {
    self.completed_query = None;
    self.in_flight_query = None;
    self.fetch.cancel();
    let query = self.filter.text.clone();
    self.load(&query);
  }

  /// Update the search text. Clearing it loads immediately; anything else
  /// waits for the debounce period.
  pub fn set_search_text(&mut self, text: impl Into<String>) {
    let text = text.into();
    self.filter.text = text.clone();
    match self.debounce.trigger(text) {
      Trigger::Immediate(query) => {
        self.load(&query);
      }
      Trigger::Scheduled => {}
    }
  }

  /// Change the category filter. Never touches the network.
  pub fn set_category(&mut self, category: CategoryFilter) {
    self.filter.category = category;
  }

  /// Apply whatever has happened since the last call.
  ///
  /// Returns `Ok(true)` when published state changed. Auth failures are
  /// not absorbed; they are returned so the session handler can react.
  pub fn poll(&mut self) -> ApiResult<bool> {
    let mut changed = false;

    if let Some(query) = self.debounce.poll() {
      changed |= self.load(&query);
    }

    if let Some(result) = self.fetch.poll() {
      self.settle(result)?;
      changed = true;
    }

    if !self.is_loading() {
      changed |= self.sync_from_cache();
    }

    Ok(changed)
  }

  /// Wait for the in-flight request, if any, and apply it.
  #[cfg(test)]
  pub async fn settle_in_flight(&mut self) -> ApiResult<bool> {
    match self.fetch.settle().await {
      Some(result) => {
        self.settle(result)?;
        Ok(true)
      }
      None => Ok(false),
    }
  }

  fn settle(&mut self, result: ApiResult<Vec<T>>) -> ApiResult<()> {
    let query = self.in_flight_query.take();
    match result {
      Ok(items) => {
        debug!(query = ?query, count = items.len(), "list loaded");
        self.items = items;
        self.write_cache();
        self.completed_query = query;
        self.phase = ListPhase::Settled;
        Ok(())
      }
      Err(ApiError::Unauthorized) => {
        self.completed_query = None;
        self.phase = ListPhase::Idle;
        Err(ApiError::Unauthorized)
      }
      Err(e) => {
        warn!(query = ?query, error = %e, "list load failed");
        self.items.clear();
        self.completed_query = None;
        self.phase = ListPhase::Failed(e.user_message());
        Ok(())
      }
    }
  }

  fn active_query(&self) -> Option<&str> {
    if self.fetch.is_in_flight() {
      self.in_flight_query.as_deref()
    } else if self.phase == ListPhase::Settled {
      self.completed_query.as_deref()
    } else {
      None
    }
  }

  /// Adopt a list written to the cache by another process.
  fn sync_from_cache(&mut self) -> bool {
    let Some(slot) = self.cache.as_mut() else {
      return false;
    };
    if !slot.watch.changed() {
      return false;
    }

    match slot.cache.get::<Vec<T>>(&slot.key) {
      Ok(Some(items)) => {
        debug!(key = %slot.key, "list replaced by external cache write");
        self.items = items;
        // Fresh items supersede the failure message
        if let ListPhase::Failed(_) = self.phase {
          self.phase = ListPhase::Settled;
        }
        true
      }
      Ok(None) => false,
      Err(e) => {
        warn!(key = %slot.key, error = %e, "failed to read list cache");
        false
      }
    }
  }

  fn write_cache(&self) {
    if let Some(slot) = &self.cache {
      if let Err(e) = slot.cache.set(&slot.key, &self.items) {
        warn!(key = %slot.key, error = %e, "failed to write list cache");
      }
    }
  }

  // Local updates, used after successful mutations

  pub fn find(&self, id: &str) -> Option<&T> {
    self.items.iter().find(|item| item.item_id() == id)
  }

  /// Replace the item with the same id. Returns whether it was present.
  pub fn replace_item(&mut self, item: T) -> bool {
    let Some(slot) = self
      .items
      .iter_mut()
      .find(|existing| existing.item_id() == item.item_id())
    else {
      return false;
    };
    *slot = item;
    self.write_cache();
    true
  }

  /// Recompute the item with `id` from its current value.
  pub fn update_item(&mut self, id: &str, update: impl FnOnce(&T) -> T) -> bool {
    let Some(slot) = self.items.iter_mut().find(|item| item.item_id() == id) else {
      return false;
    };
    *slot = update(slot);
    self.write_cache();
    true
  }

  pub fn remove_item(&mut self, id: &str) -> bool {
    let before = self.items.len();
    self.items.retain(|item| item.item_id() != id);
    let removed = self.items.len() != before;
    if removed {
      self.write_cache();
    }
    removed
  }

  // Accessors for rendering

  /// Everything the last successful load returned.
  #[cfg(test)]
  pub fn items(&self) -> &[T] {
    &self.items
  }

  /// Items passing the current search text and category filter.
  pub fn visible(&self) -> Vec<&T> {
    self
      .items
      .iter()
      .filter(|item| self.filter.matches(*item))
      .collect()
  }

  /// Distinct non-empty categories, in first-seen order.
  pub fn categories(&self) -> Vec<String> {
    let mut categories: Vec<String> = Vec::new();
    for category in self.items.iter().filter_map(|item| item.category()) {
      let category = category.trim();
      if !category.is_empty() && !categories.iter().any(|c| c == category) {
        categories.push(category.to_string());
      }
    }
    categories
  }

  pub fn filter(&self) -> &ListFilter {
    &self.filter
  }

  pub fn phase(&self) -> &ListPhase {
    &self.phase
  }

  pub fn is_loading(&self) -> bool {
    self.phase == ListPhase::Loading
  }

  #[cfg(test)]
  pub fn error(&self) -> Option<&str> {
    match &self.phase {
      ListPhase::Failed(message) => Some(message),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::Warehouse;
  use crate::cache::SqliteStorage;
  use std::sync::{Arc, Mutex};

  const DEBOUNCE: Duration = Duration::from_millis(500);

  fn warehouse(id: &str, name: &str, category: &str) -> Warehouse {
    Warehouse {
      id: id.to_string(),
      name: name.to_string(),
      address: None,
      category: Some(category.to_string()),
    }
  }

  /// Fetcher that records queries and answers after a per-query delay.
  fn scripted(
    calls: Arc<Mutex<Vec<String>>>,
  ) -> impl Fn(String) -> BoxFuture<'static, ApiResult<Vec<Warehouse>>> + Send + Sync {
    move |query: String| {
      calls.lock().unwrap().push(query.clone());
      Box::pin(async move {
        let delay = if query == "slow" { 300 } else { 20 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        match query.as_str() {
          "broken" => Err(ApiError::Server {
            status: 500,
            message: "boom".to_string(),
          }),
          "expired" => Err(ApiError::Unauthorized),
          "" => Ok(vec![
            warehouse("1", "Main St", "A"),
            warehouse("2", "Harbor", "B"),
          ]),
          _ => Ok(vec![warehouse(&query, &query, "A")]),
        }
      })
    }
  }

  fn coordinator(calls: &Arc<Mutex<Vec<String>>>) -> ListCoordinator<Warehouse> {
    ListCoordinator::new(scripted(Arc::clone(calls)), DEBOUNCE)
  }

  async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
  }

  #[tokio::test(start_paused = true)]
  async fn test_mount_loads_unfiltered_list() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut list = coordinator(&calls);
    assert_eq!(list.phase(), &ListPhase::Idle);

    list.mount();
    assert!(list.is_loading());
    advance(50).await;
    assert!(list.poll().unwrap());

    assert_eq!(list.phase(), &ListPhase::Settled);
    assert_eq!(list.items().len(), 2);
    assert_eq!(list.categories(), vec!["A".to_string(), "B".to_string()]);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_response_never_wins() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut list = coordinator(&calls);

    list.load("slow");
    list.load("fast");
    advance(500).await;
    list.poll().unwrap();

    assert_eq!(list.items().len(), 1);
    assert_eq!(list.items()[0].name, "fast");
    assert_eq!(*calls.lock().unwrap(), vec!["slow", "fast"]);
  }

  #[tokio::test(start_paused = true)]
  async fn test_unchanged_query_is_deduplicated() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut list = coordinator(&calls);

    assert!(list.load("north"));
    assert!(!list.load("north"), "in-flight query is not reissued");
    advance(50).await;
    list.poll().unwrap();

    assert!(!list.load("north"), "completed query is not reissued");
    assert!(!list.load("  north "));
    assert_eq!(calls.lock().unwrap().len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failure_clears_items_and_allows_retry() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut list = coordinator(&calls);
    list.mount();
    advance(50).await;
    list.poll().unwrap();

    list.load("broken");
    advance(50).await;
    list.poll().unwrap();
    assert_eq!(list.error(), Some("boom"));
    assert!(list.items().is_empty());

    // A failed query is not considered completed
    assert!(list.load("broken"));
    assert!(list.is_loading());
    assert_eq!(list.error(), None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_auth_failure_propagates() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut list = coordinator(&calls);
    list.load("expired");
    advance(50).await;
    assert_eq!(list.poll(), Err(ApiError::Unauthorized));
    assert_eq!(list.error(), None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_typing_is_debounced_and_clearing_is_not() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut list = coordinator(&calls);
    list.mount();
    advance(50).await;
    list.poll().unwrap();

    list.set_search_text("N");
    list.set_search_text("No");
    list.set_search_text("North");
    advance(100).await;
    list.poll().unwrap();
    assert_eq!(calls.lock().unwrap().len(), 1);

    // Cleared within the debounce window: fires at once, "North" never does
    list.set_search_text("");
    assert_eq!(calls.lock().unwrap().len(), 1, "empty query deduplicated");
    list.set_search_text("North");
    list.set_search_text("");
    advance(1_000).await;
    list.poll().unwrap();
    assert_eq!(*calls.lock().unwrap(), vec![""]);
  }

  #[tokio::test(start_paused = true)]
  async fn test_debounced_query_is_loaded_on_poll() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut list = coordinator(&calls);
    list.set_search_text("North");
    advance(510).await;
    assert!(list.poll().unwrap());
    assert!(list.is_loading());
    advance(50).await;
    list.poll().unwrap();
    assert_eq!(list.items()[0].name, "North");
  }

  #[tokio::test(start_paused = true)]
  async fn test_category_change_filters_locally() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut list: ListCoordinator<Warehouse> = ListCoordinator::new(
      {
        let calls = Arc::clone(&calls);
        move |query: String| {
          calls.lock().unwrap().push(query);
          async { Ok::<_, ApiError>(vec![warehouse("1", "Main St", "A")]) }
        }
      },
      DEBOUNCE,
    );

    list.set_search_text("Main");
    advance(510).await;
    list.poll().unwrap();
    advance(10).await;
    list.poll().unwrap();
    assert_eq!(list.visible().len(), 1);
    assert_eq!(list.visible()[0].name, "Main St");

    list.set_category(CategoryFilter::Only("B".to_string()));
    advance(1_000).await;
    list.poll().unwrap();
    assert!(list.visible().is_empty());
    assert_eq!(*calls.lock().unwrap(), vec!["Main"]);
  }

  #[tokio::test(start_paused = true)]
  async fn test_cache_seeds_and_is_written_through() {
    let cache = PersistentCache::new(SqliteStorage::open_in_memory().unwrap())
      .with_ttl(Some(Duration::from_secs(300)));
    cache
      .set("warehouses", &vec![warehouse("9", "Cached", "C")])
      .unwrap();

    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut list = coordinator(&calls).with_cache(cache.clone(), "warehouses");
    assert_eq!(list.items()[0].name, "Cached");
    assert_eq!(list.phase(), &ListPhase::Idle);

    list.mount();
    assert_eq!(calls.lock().unwrap().len(), 1, "seed does not skip the load");
    advance(50).await;
    list.poll().unwrap();

    let cached: Vec<Warehouse> = cache.get("warehouses").unwrap().unwrap();
    assert_eq!(cached.len(), 2);

    list.remove_item("1");
    let cached: Vec<Warehouse> = cache.get("warehouses").unwrap().unwrap();
    assert_eq!(cached.len(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_foreign_write_clears_failed_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let ours = PersistentCache::from_shared(Arc::new(SqliteStorage::open(&path).unwrap()));
    let theirs = PersistentCache::from_shared(Arc::new(SqliteStorage::open(&path).unwrap()));

    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut list = coordinator(&calls).with_cache(ours, "warehouses");
    list.load("broken");
    advance(50).await;
    list.poll().unwrap();
    assert_eq!(list.error(), Some("boom"));
    assert!(list.items().is_empty());

    theirs
      .set("warehouses", &vec![warehouse("7", "Elsewhere", "A")])
      .unwrap();
    assert!(list.poll().unwrap());

    assert_eq!(list.phase(), &ListPhase::Settled);
    assert_eq!(list.error(), None);
    assert_eq!(list.items()[0].name, "Elsewhere");
  }

  #[tokio::test(start_paused = true)]
  async fn test_retry_reissues_completed_query() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut list = coordinator(&calls);
    list.mount();
    advance(50).await;
    list.poll().unwrap();

    list.retry();
    assert!(list.is_loading());
    assert_eq!(*calls.lock().unwrap(), vec!["", ""]);
  }
}
