use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::session::{Access, Redirect, Session};
use crate::ui;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewContext};
use crate::ui::views::{OrderListView, WarehouseListView};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tracing::{info, warn};

const TICK_RATE: Duration = Duration::from_millis(100);

/// Why the terminal UI stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
  Quit,
  /// The server rejected the session; the user has to log in again
  SessionExpired,
}

/// Main application state
pub struct App {
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// `:` palette
  command: CommandInput,

  config: Config,

  ctx: ViewContext,

  /// Latest one-shot message shown in the footer
  notice: Option<String>,

  exit: Option<ExitReason>,
}

impl App {
  pub fn new(config: Config, ctx: ViewContext) -> Self {
    let root = WarehouseListView::new(ctx.clone());
    Self {
      view_stack: vec![Box::new(root)],
      command: CommandInput::new(),
      config,
      ctx,
      notice: None,
      exit: None,
    }
  }

  pub async fn run(&mut self) -> Result<ExitReason> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;

    let result = self.event_loop().await;

    // Restore the terminal even when the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(&mut self) -> Result<ExitReason> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    let mut events = EventHandler::new(TICK_RATE);

    loop {
      terminal.draw(|frame| ui::draw(frame, self))?;

      let Some(event) = events.next().await else {
        return Ok(ExitReason::Quit);
      };
      self.handle_event(event);

      if let Some(reason) = self.exit {
        info!(reason = ?reason, "leaving terminal ui");
        return Ok(reason);
      }
    }
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Resize => {}
      Event::Tick => {}
    }
    // Keys can arrive faster than the tick rate; poll after every event
    self.tick();
  }

  fn tick(&mut self) {
    for view in &mut self.view_stack {
      view.tick();
    }
    if let Some(notice) = self.current_view_mut().and_then(|v| v.take_notice()) {
      self.notice = Some(notice);
    }

    if self.ctx.session().is_expired() {
      warn!("session rejected by the server");
      self.exit = Some(ExitReason::SessionExpired);
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.exit = Some(ExitReason::Quit);
      return;
    }

    // Overlays inside the view get ':' as text
    let capturing = self
      .view_stack
      .last()
      .is_some_and(|v| v.is_capturing_input());
    if self.command.is_active() || !capturing {
      match self.command.handle_key(key) {
        KeyResult::Event(CommandEvent::Submitted(cmd)) => {
          self.execute_command(&cmd);
          return;
        }
        KeyResult::NotHandled => {}
        _ => return,
      }
    }

    self.notice = None;
    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::None,
    };
    self.apply(action);
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.exit = Some(ExitReason::Quit);
        }
      }
    }
  }

  /// Replace the whole stack with a new root view
  fn set_root(&mut self, view: Box<dyn View>) {
    self.view_stack.clear();
    self.view_stack.push(view);
  }

  fn execute_command(&mut self, cmd: &str) {
    match cmd {
      "warehouses" => self.set_root(Box::new(WarehouseListView::new(self.ctx.clone()))),
      "orders" => match self.ctx.session().authorize(Access::Manager) {
        Ok(()) => self.set_root(Box::new(OrderListView::new(self.ctx.clone(), None))),
        Err(Redirect::Forbidden) => {
          self.notice = Some("Orders are available to managers only".to_string());
        }
        Err(Redirect::Login { .. }) => self.exit = Some(ExitReason::SessionExpired),
      },
      "quit" => self.exit = Some(ExitReason::Quit),
      "" => {}
      other => self.notice = Some(format!("Unknown command: {}", other)),
    }
  }

  // Accessors for UI rendering
  pub fn current_view_mut(&mut self) -> Option<&mut Box<dyn View>> {
    self.view_stack.last_mut()
  }

  pub fn command(&self) -> &CommandInput {
    &self.command
  }

  pub fn title(&self) -> Option<&str> {
    self.config.title.as_deref()
  }

  pub fn api_url(&self) -> &str {
    &self.config.api.url
  }

  pub fn session(&self) -> Option<Session> {
    self.ctx.session().current()
  }

  pub fn notice(&self) -> Option<&str> {
    self.notice.as_deref()
  }

  pub fn shortcuts(&self) -> Vec<ShortcutInfo> {
    self
      .view_stack
      .last()
      .map(|v| v.shortcuts())
      .unwrap_or_default()
  }

  pub fn breadcrumb(&self) -> Vec<String> {
    self
      .view_stack
      .iter()
      .map(|v| v.breadcrumb_label())
      .collect()
  }
}
