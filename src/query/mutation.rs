//! Per-item mutations with a busy lock and local reconciliation.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::coordinator::ListCoordinator;
use crate::api::{ApiError, ApiResult, ListItem};

/// How the list changes when a mutation succeeds without returning an item.
pub enum LocalPatch<T> {
  Update(Box<dyn FnOnce(&T) -> T + Send>),
  Remove,
  Keep,
}

impl<T> LocalPatch<T> {
  pub fn update(f: impl FnOnce(&T) -> T + Send + 'static) -> Self {
    Self::Update(Box::new(f))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationRejected {
  #[error("an operation on {0} is already in progress")]
  Busy(String),
}

/// What happened to a settled mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
  Applied { id: String },
  Removed { id: String },
  Failed { id: String, message: String },
}

struct Settled<T> {
  id: String,
  result: ApiResult<Option<T>>,
  patch: LocalPatch<T>,
}

/// Runs mutations against items of a [`ListCoordinator`].
///
/// At most one mutation per item id is in flight. The lock is released on
/// every outcome. Failures are recorded per item and leave the list alone.
pub struct MutationApplier<T> {
  busy: HashSet<String>,
  errors: HashMap<String, String>,
  tasks: HashMap<String, JoinHandle<()>>,
  tx: mpsc::UnboundedSender<Settled<T>>,
  rx: mpsc::UnboundedReceiver<Settled<T>>,
}

impl<T> MutationApplier<T>
where
  T: ListItem + Serialize + DeserializeOwned,
{
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      busy: HashSet::new(),
      errors: HashMap::new(),
      tasks: HashMap::new(),
      tx,
      rx,
    }
  }

  /// Start `request` for item `id`.
  ///
  /// Rejected synchronously, without running `request`, when the item
  /// already has a mutation in flight. A returned item replaces the local
  /// one; otherwise `patch` is applied.
  pub fn mutate<Fut>(
    &mut self,
    id: impl Into<String>,
    request: Fut,
    patch: LocalPatch<T>,
  ) -> Result<(), MutationRejected>
  where
    Fut: Future<Output = ApiResult<Option<T>>> + Send + 'static,
  {
    let id = id.into();
    if !self.busy.insert(id.clone()) {
      debug!(id = %id, "mutation rejected, item busy");
      return Err(MutationRejected::Busy(id));
    }
    self.errors.remove(&id);

    let tx = self.tx.clone();
    let task_id = id.clone();
    let handle = tokio::spawn(async move {
      let result = request.await;
      let _ = tx.send(Settled {
        id: task_id,
        result,
        patch,
      });
    });
    self.tasks.insert(id, handle);
    Ok(())
  }

  /// Reconcile settled mutations into `list`.
  ///
  /// A 401 stops processing and is returned so the session can be torn down.
  pub fn poll(&mut self, list: &mut ListCoordinator<T>) -> ApiResult<Vec<MutationOutcome>> {
    let mut outcomes = Vec::new();
    while let Ok(settled) = self.rx.try_recv() {
      let Settled { id, result, patch } = settled;
      self.busy.remove(&id);
      self.tasks.remove(&id);

      match result {
        Ok(Some(item)) => {
          if !list.replace_item(item) {
            debug!(id = %id, "mutated item no longer listed");
          }
          outcomes.push(MutationOutcome::Applied { id });
        }
        Ok(None) => match patch {
          LocalPatch::Update(update) => {
            list.update_item(&id, update);
            outcomes.push(MutationOutcome::Applied { id });
          }
          LocalPatch::Remove => {
            list.remove_item(&id);
            outcomes.push(MutationOutcome::Removed { id });
          }
          LocalPatch::Keep => outcomes.push(MutationOutcome::Applied { id }),
        },
        Err(ApiError::Unauthorized) => return Err(ApiError::Unauthorized),
        Err(ApiError::Cancelled) => {}
        Err(e) => {
          warn!(id = %id, error = %e, "mutation failed");
          let message = e.user_message();
          self.errors.insert(id.clone(), message.clone());
          outcomes.push(MutationOutcome::Failed { id, message });
        }
      }
    }
    Ok(outcomes)
  }

  pub fn is_busy(&self, id: &str) -> bool {
    self.busy.contains(id)
  }

  pub fn error(&self, id: &str) -> Option<&str> {
    self.errors.get(id).map(String::as_str)
  }

  pub fn clear_error(&mut self, id: &str) {
    self.errors.remove(id);
  }
}

impl<T> Default for MutationApplier<T>
where
  T: ListItem + Serialize + DeserializeOwned,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Drop for MutationApplier<T> {
  fn drop(&mut self) {
    for (_, handle) in self.tasks.drain() {
      handle.abort();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::{Product, StockAction, StockAdjustment};
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  fn product(id: &str, quantity: u32) -> Product {
    Product {
      id: id.to_string(),
      name: format!("Product {}", id),
      quantity,
      critical_value: 2,
      category: "Tools".to_string(),
      photo: None,
      created_at: None,
    }
  }

  async fn done(item: Option<Product>) -> ApiResult<Option<Product>> {
    Ok(item)
  }

  async fn failed(err: ApiError) -> ApiResult<Option<Product>> {
    Err(err)
  }

  async fn loaded_list(products: Vec<Product>) -> ListCoordinator<Product> {
    let mut list = ListCoordinator::new(
      move |_query: String| {
        let products = products.clone();
        async move { Ok::<_, ApiError>(products) }
      },
      Duration::ZERO,
    );
    list.mount();
    list.settle_in_flight().await.unwrap();
    list
  }

  fn subtract(current: u32, requested: i64) -> LocalPatch<Product> {
    let adjustment = StockAdjustment::clamped(StockAction::Sub, requested, current);
    LocalPatch::update(move |p: &Product| Product {
      quantity: adjustment.apply_to(p.quantity),
      ..p.clone()
    })
  }

  #[tokio::test(start_paused = true)]
  async fn test_subtract_updates_local_quantity() {
    let mut list = loaded_list(vec![product("p1", 10)]).await;
    let mut applier = MutationApplier::new();

    applier
      .mutate("p1", done(None), subtract(10, 5))
      .unwrap();
    assert!(applier.is_busy("p1"));

    tokio::time::sleep(Duration::from_millis(1)).await;
    let outcomes = applier.poll(&mut list).unwrap();

    assert_eq!(
      outcomes,
      vec![MutationOutcome::Applied {
        id: "p1".to_string()
      }]
    );
    assert_eq!(list.find("p1").unwrap().quantity, 5);
    assert!(!applier.is_busy("p1"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_second_mutation_on_busy_item_is_rejected_without_request() {
    let mut list = loaded_list(vec![product("p1", 10)]).await;
    let mut applier = MutationApplier::new();
    let calls = Arc::new(AtomicU32::new(0));

    let request = |calls: Arc<AtomicU32>| async move {
      calls.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(50)).await;
      done(None).await
    };

    applier
      .mutate("p1", request(calls.clone()), subtract(10, 1))
      .unwrap();
    let rejected = applier.mutate("p1", request(calls.clone()), subtract(10, 1));
    assert_eq!(rejected, Err(MutationRejected::Busy("p1".to_string())));

    tokio::time::sleep(Duration::from_millis(100)).await;
    applier.poll(&mut list).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(list.find("p1").unwrap().quantity, 9);
  }

  #[tokio::test(start_paused = true)]
  async fn test_items_are_locked_independently() {
    let mut list = loaded_list(vec![product("p1", 10), product("p2", 3)]).await;
    let mut applier = MutationApplier::new();

    applier
      .mutate("p1", done(None), subtract(10, 1))
      .unwrap();
    applier
      .mutate("p2", done(None), subtract(3, 10))
      .unwrap();

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(applier.poll(&mut list).unwrap().len(), 2);
    assert_eq!(list.find("p1").unwrap().quantity, 9);
    assert_eq!(list.find("p2").unwrap().quantity, 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failure_keeps_list_and_releases_lock() {
    let mut list = loaded_list(vec![product("p1", 10)]).await;
    let mut applier = MutationApplier::new();

    applier
      .mutate(
        "p1",
        failed(ApiError::Server {
          status: 500,
          message: "Stock service down".to_string(),
        }),
        subtract(10, 5),
      )
      .unwrap();

    tokio::time::sleep(Duration::from_millis(1)).await;
    applier.poll(&mut list).unwrap();

    assert_eq!(list.find("p1").unwrap().quantity, 10);
    assert_eq!(applier.error("p1"), Some("Stock service down"));
    assert!(!applier.is_busy("p1"));

    applier.clear_error("p1");
    assert_eq!(applier.error("p1"), None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_server_item_replaces_local_and_remove_patch_deletes() {
    let mut list = loaded_list(vec![product("p1", 10), product("p2", 1)]).await;
    let mut applier = MutationApplier::new();

    applier
      .mutate("p1", done(Some(product("p1", 42))), LocalPatch::Keep)
      .unwrap();
    applier
      .mutate("p2", done(None), LocalPatch::Remove)
      .unwrap();

    tokio::time::sleep(Duration::from_millis(1)).await;
    applier.poll(&mut list).unwrap();

    assert_eq!(list.find("p1").unwrap().quantity, 42);
    assert!(list.find("p2").is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_unauthorized_propagates_and_releases_lock() {
    let mut list = loaded_list(vec![product("p1", 10)]).await;
    let mut applier = MutationApplier::new();
    applier
      .mutate("p1", failed(ApiError::Unauthorized), LocalPatch::Keep)
      .unwrap();

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(applier.poll(&mut list), Err(ApiError::Unauthorized));
    assert!(!applier.is_busy("p1"));
  }
}
