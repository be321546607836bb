use crossterm::event::KeyEvent;
use ratatui::prelude::*;
use std::time::Duration;

use crate::api::InventoryClient;
use crate::cache::PersistentCache;
use crate::session::SessionContext;

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  /// Lower = shown first
  pub priority: u8,
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// Everything a view needs to load its data.
#[derive(Clone)]
pub struct ViewContext {
  pub client: InventoryClient,
  pub cache: PersistentCache,
  pub debounce: Duration,
}

impl ViewContext {
  pub fn session(&self) -> &SessionContext {
    self.client.session()
  }
}

/// Actions that a view can request in response to user input
pub enum ViewAction {
  None,
  /// Push a new view onto the stack
  Push(Box<dyn View>),
  /// Pop current view from stack (go back)
  Pop,
}

/// Trait for view behavior
///
/// Views handle their own input modes (search, pickers) and return
/// actions for the App to execute: App → View → Components.
///
/// Views that load data own a `ListCoordinator` or `Query` and poll it in
/// `tick()`.
pub trait View {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  fn render(&mut self, frame: &mut Frame, area: Rect);

  fn breadcrumb_label(&self) -> String;

  /// Called on each tick to poll async work
  fn tick(&mut self) {}

  /// Whether an overlay (search, picker) currently owns the keyboard
  fn is_capturing_input(&self) -> bool {
    false
  }

  /// One-shot message for the footer, taken by the App
  fn take_notice(&mut self) -> Option<String> {
    None
  }

  /// Keyboard shortcuts to display in the header
  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
