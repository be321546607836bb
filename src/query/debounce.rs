//! Debounced trigger for search text.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What a call to [`Debouncer::trigger`] decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
  /// Fire now with this query; nothing was scheduled.
  Immediate(String),
  /// The query will come out of [`Debouncer::poll`] after the quiet period.
  Scheduled,
}

/// Collapses bursts of search input into one query.
///
/// Every trigger restarts the quiet period and only the latest query
/// survives. A cleared query is a reset, not typing, and is never delayed.
pub struct Debouncer {
  delay: Duration,
  generation: u64,
  pending: Option<JoinHandle<()>>,
  tx: mpsc::UnboundedSender<(u64, String)>,
  rx: mpsc::UnboundedReceiver<(u64, String)>,
}

impl Debouncer {
  pub fn new(delay: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      delay,
      generation: 0,
      pending: None,
      tx,
      rx,
    }
  }

  /// Schedule `query`, replacing anything still waiting.
  pub fn trigger(&mut self, query: impl Into<String>) -> Trigger {
    let query = query.into();
    self.cancel();

    if query.trim().is_empty() {
      return Trigger::Immediate(String::new());
    }
    if self.delay.is_zero() {
      return Trigger::Immediate(query);
    }

    let generation = self.generation;
    let delay = self.delay;
    let tx = self.tx.clone();
    self.pending = Some(tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      let _ = tx.send((generation, query));
    }));

    Trigger::Scheduled
  }

  /// Drop the scheduled query, if any.
  pub fn cancel(&mut self) {
    if let Some(handle) = self.pending.take() {
      handle.abort();
    }
    self.generation += 1;
  }

  #[cfg(test)]
  pub fn is_pending(&self) -> bool {
    self.pending.is_some()
  }

  /// Take the query whose quiet period has elapsed.
  pub fn poll(&mut self) -> Option<String> {
    while let Ok((generation, query)) = self.rx.try_recv() {
      if generation == self.generation && self.pending.is_some() {
        self.pending = None;
        return Some(query);
      }
    }
    None
  }
}

impl Drop for Debouncer {
  fn drop(&mut self) {
    if let Some(handle) = self.pending.take() {
      handle.abort();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const DELAY: Duration = Duration::from_millis(500);

  #[tokio::test(start_paused = true)]
  async fn test_fires_after_quiet_period() {
    let mut debouncer = Debouncer::new(DELAY);
    assert_eq!(debouncer.trigger("bolts"), Trigger::Scheduled);

    tokio::time::sleep(Duration::from_millis(499)).await;
    assert_eq!(debouncer.poll(), None);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(debouncer.poll(), Some("bolts".to_string()));
    assert!(!debouncer.is_pending());
  }

  #[tokio::test(start_paused = true)]
  async fn test_only_latest_query_survives() {
    let mut debouncer = Debouncer::new(DELAY);
    debouncer.trigger("M");
    tokio::time::sleep(Duration::from_millis(300)).await;
    debouncer.trigger("Ma");
    tokio::time::sleep(Duration::from_millis(300)).await;
    debouncer.trigger("Main");

    // 600ms after the first keystroke: still quiet-period for "Main"
    assert_eq!(debouncer.poll(), None);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(debouncer.poll(), Some("Main".to_string()));
    assert_eq!(debouncer.poll(), None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_cleared_query_bypasses_delay() {
    let mut debouncer = Debouncer::new(DELAY);
    debouncer.trigger("Main");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(debouncer.trigger("   "), Trigger::Immediate(String::new()));
    assert!(!debouncer.is_pending());

    // The earlier "Main" never fires
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(debouncer.poll(), None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancel_on_teardown() {
    let mut debouncer = Debouncer::new(DELAY);
    debouncer.trigger("North");
    debouncer.cancel();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(debouncer.poll(), None);
  }

  #[tokio::test]
  async fn test_zero_delay_is_immediate() {
    let mut debouncer = Debouncer::new(Duration::ZERO);
    assert_eq!(
      debouncer.trigger("North"),
      Trigger::Immediate("North".to_string())
    );
  }
}
