//! Query for a single value, such as the warehouse shown in a page title.
//!
//! ```ignore
//! let client = client.clone();
//! let mut query = Query::new(move || {
//!   let client = client.clone();
//!   async move { client.get_warehouse(&id).await }
//! });
//!
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll()? {
//!   // State changed, trigger re-render
//! }
//! ```

use futures::future::BoxFuture;
use std::future::Future;

use super::cancel::CancellableFetch;
use crate::api::{ApiError, ApiResult};

/// The state of a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with a user-facing message
  Error(String),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  #[cfg(test)]
  pub fn error(&self) -> Option<&str> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<'static, ApiResult<T>> + Send + Sync>;

/// Async query with loading state and cancellation on refetch.
pub struct Query<T> {
  state: QueryState<T>,
  fetcher: FetcherFn<T>,
  fetch: CancellableFetch<T>,
}

impl<T: Send + 'static> Query<T> {
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      fetcher: Box::new(move || Box::pin(fetcher())),
      fetch: CancellableFetch::new(),
    }
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  #[cfg(test)]
  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  #[cfg(test)]
  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  #[cfg(test)]
  pub fn error(&self) -> Option<&str> {
    self.state.error()
  }

  /// Start fetching unless already loading.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.refetch();
  }

  /// Fetch again, superseding any request in flight.
  pub fn refetch(&mut self) {
    self.state = QueryState::Loading;
    let future = (self.fetcher)();
    self.fetch.issue(future);
  }

  /// Apply a settled result. Returns `Ok(true)` if the state changed.
  ///
  /// A 401 is returned as an error instead of being stored.
  pub fn poll(&mut self) -> ApiResult<bool> {
    let Some(result) = self.fetch.poll() else {
      return Ok(false);
    };

    match result {
      Ok(data) => self.state = QueryState::Success(data),
      Err(ApiError::Unauthorized) => {
        self.state = QueryState::Idle;
        return Err(ApiError::Unauthorized);
      }
      Err(e) => self.state = QueryState::Error(e.user_message()),
    }
    Ok(true)
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("in_flight", &self.fetch.is_in_flight())
      .finish_non_exhaustive()
  }
}
