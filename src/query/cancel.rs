//! Single-slot request runner where each new request supersedes the last.

use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::api::{ApiError, ApiResult};

/// Identifies one issued request. Superseded tokens are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchToken(u64);

struct Settled<T> {
  token: FetchToken,
  result: ApiResult<T>,
}

/// Runs at most one live request at a time.
///
/// Issuing a request aborts the previous one. Aborting the task is only an
/// optimization: a result that was already sent is still dropped in
/// [`poll`](Self::poll) because its token is no longer current.
pub struct CancellableFetch<T> {
  current: FetchToken,
  in_flight: Option<JoinHandle<()>>,
  tx: mpsc::UnboundedSender<Settled<T>>,
  rx: mpsc::UnboundedReceiver<Settled<T>>,
}

impl<T> CancellableFetch<T> {
  pub fn is_in_flight(&self) -> bool {
    self.in_flight.is_some()
  }
}

impl<T: Send + 'static> CancellableFetch<T> {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      current: FetchToken(0),
      in_flight: None,
      tx,
      rx,
    }
  }

  /// Start `future`, cancelling whatever was in flight.
  pub fn issue<Fut>(&mut self, future: Fut) -> FetchToken
  where
    Fut: Future<Output = ApiResult<T>> + Send + 'static,
  {
    self.cancel();

    let token = self.current;
    let tx = self.tx.clone();
    self.in_flight = Some(tokio::spawn(async move {
      let result = future.await;
      // Ignore send errors - the owner may be gone
      let _ = tx.send(Settled { token, result });
    }));

    token
  }

  /// Cancel the in-flight request, if any. Its result will never be returned.
  pub fn cancel(&mut self) {
    if let Some(handle) = self.in_flight.take() {
      trace!(token = self.current.0, "aborting in-flight request");
      handle.abort();
    }
    self.current = FetchToken(self.current.0 + 1);
  }

  /// Take the result of the live request if it has settled.
  ///
  /// Results of superseded requests, and requests that resolved as
  /// cancelled, are discarded here.
  pub fn poll(&mut self) -> Option<ApiResult<T>> {
    while let Ok(settled) = self.rx.try_recv() {
      if let Some(result) = self.accept(settled) {
        return Some(result);
      }
    }
    None
  }

  /// Wait for the live request to settle.
  ///
  /// Returns `None` when nothing is in flight or the request was cancelled.
  #[cfg(test)]
  pub async fn settle(&mut self) -> Option<ApiResult<T>> {
    while self.in_flight.is_some() {
      let settled = self.rx.recv().await?;
      if let Some(result) = self.accept(settled) {
        return Some(result);
      }
    }
    None
  }

  fn accept(&mut self, settled: Settled<T>) -> Option<ApiResult<T>> {
    if settled.token != self.current || self.in_flight.is_none() {
      trace!(token = settled.token.0, "dropping stale response");
      return None;
    }

    self.in_flight = None;
    match settled.result {
      Err(ApiError::Cancelled) => None,
      result => Some(result),
    }
  }
}

impl<T: Send + 'static> Default for CancellableFetch<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Drop for CancellableFetch<T> {
  fn drop(&mut self) {
    if let Some(handle) = self.in_flight.take() {
      handle.abort();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  async fn delayed(ms: u64, value: u32) -> ApiResult<u32> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(value)
  }

  #[tokio::test(start_paused = true)]
  async fn test_settles_with_result() {
    let mut fetch = CancellableFetch::new();
    fetch.issue(delayed(10, 1));
    assert!(fetch.is_in_flight());
    assert_eq!(fetch.settle().await, Some(Ok(1)));
    assert!(!fetch.is_in_flight());
  }

  #[tokio::test(start_paused = true)]
  async fn test_newer_request_wins_even_if_slower() {
    let mut fetch = CancellableFetch::new();
    let first = fetch.issue(delayed(10, 1));
    let second = fetch.issue(delayed(50, 2));
    assert!(second > first);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fetch.poll(), Some(Ok(2)));
    assert_eq!(fetch.poll(), None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_already_sent_stale_result_is_dropped() {
    let mut fetch = CancellableFetch::new();
    fetch.issue(async { Ok(1) });
    // Let the first request finish and sit in the channel
    tokio::time::sleep(Duration::from_millis(1)).await;

    fetch.issue(delayed(20, 2));
    assert_eq!(fetch.poll(), None);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(fetch.poll(), Some(Ok(2)));
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancel_discards_result() {
    let mut fetch: CancellableFetch<u32> = CancellableFetch::new();
    fetch.issue(async { Ok(1) });
    tokio::time::sleep(Duration::from_millis(1)).await;
    fetch.cancel();
    assert_eq!(fetch.poll(), None);
    assert_eq!(fetch.settle().await, None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_network_error_is_distinct_from_cancellation() {
    let mut fetch: CancellableFetch<u32> = CancellableFetch::new();
    fetch.issue(async { Err(ApiError::Network("refused".to_string())) });
    assert_eq!(
      fetch.settle().await,
      Some(Err(ApiError::Network("refused".to_string())))
    );

    fetch.issue(async { Err(ApiError::Cancelled) });
    assert_eq!(fetch.settle().await, None);
  }
}
