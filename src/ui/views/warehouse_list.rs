use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use tracing::debug;

use crate::api::Warehouse;
use crate::query::{CategoryFilter, ListCoordinator, ListPhase};
use crate::ui::components::{KeyResult, Picker, PickerEvent, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::pad;
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewContext};
use crate::ui::views::ProductListView;

pub const CACHE_KEY: &str = "warehouses";

/// Root view: all warehouses, searchable on the server and filterable by
/// category locally.
pub struct WarehouseListView {
  ctx: ViewContext,
  list: ListCoordinator<Warehouse>,
  list_state: ListState,
  search: SearchInput,
  category_picker: Picker,
}

impl WarehouseListView {
  pub fn new(ctx: ViewContext) -> Self {
    let client = ctx.client.clone();
    let mut list = ListCoordinator::new(
      move |query: String| {
        let client = client.clone();
        async move { client.list_warehouses(&query).await }
      },
      ctx.debounce,
    )
    .with_cache(ctx.cache.clone(), CACHE_KEY);
    list.mount();

    Self {
      ctx,
      list,
      list_state: ListState::default(),
      search: SearchInput::new("warehouses"),
      category_picker: Picker::new(),
    }
  }

  fn selected(&self) -> Option<&Warehouse> {
    let idx = self.list_state.selected()?;
    self.list.visible().get(idx).copied()
  }

  fn open_category_picker(&mut self) {
    let mut options = vec![CategoryFilter::All.label().to_string()];
    options.extend(self.list.categories());
    let current = match &self.list.filter().category {
      CategoryFilter::All => 0,
      CategoryFilter::Only(c) => options.iter().position(|o| o == c).unwrap_or(0),
    };
    self.category_picker.show("Category", options, current);
  }

  fn apply_category(&mut self, index: usize) {
    let category = match index {
      0 => CategoryFilter::All,
      n => match self.list.categories().get(n - 1) {
        Some(c) => CategoryFilter::Only(c.clone()),
        None => CategoryFilter::All,
      },
    };
    debug!(category = category.label(), "warehouse category changed");
    self.list.set_category(category);
    self.list_state.select(Some(0));
  }

  fn title(&self) -> String {
    let filter = self.list.filter();
    let mut scope = Vec::new();
    if !filter.text.trim().is_empty() {
      scope.push(format!("\"{}\"", filter.text.trim()));
    }
    if let CategoryFilter::Only(c) = &filter.category {
      scope.push(c.clone());
    }
    let scope = if scope.is_empty() {
      String::new()
    } else {
      format!(" [{}]", scope.join(", "))
    };

    match self.list.phase() {
      ListPhase::Loading => format!(" Warehouses{} (loading...) ", scope),
      ListPhase::Failed(e) => format!(" Warehouses{} (error: {}) ", scope, e),
      _ => format!(" Warehouses{} ({}) ", scope, self.list.visible().len()),
    }
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let title = self.title();
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let visible = self.list.visible();
    ensure_valid_selection(&mut self.list_state, visible.len());

    if visible.is_empty() {
      let content = match self.list.phase() {
        ListPhase::Loading => "Loading warehouses...".to_string(),
        ListPhase::Failed(e) => format!("{}. Press 'r' to retry.", e),
        _ => "No warehouses found.".to_string(),
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = visible
      .iter()
      .map(|w| {
        ListItem::new(Line::from(vec![
          Span::styled(pad(&w.name, 28), Style::default().fg(Color::Cyan)),
          Span::raw(" "),
          Span::styled(
            pad(w.category.as_deref().unwrap_or("-"), 16),
            Style::default().fg(Color::Yellow),
          ),
          Span::raw(" "),
          Span::styled(
            w.address.clone().unwrap_or_default(),
            Style::default().fg(Color::DarkGray),
          ),
        ]))
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for WarehouseListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.category_picker.handle_key(key) {
      KeyResult::Event(PickerEvent::Selected(index)) => {
        self.apply_category(index);
        return ViewAction::None;
      }
      KeyResult::NotHandled => {}
      _ => return ViewAction::None,
    }

    match self.search.handle_key(key) {
      KeyResult::Event(SearchEvent::Changed(text)) => {
        self.list.set_search_text(text);
        self.list_state.select(Some(0));
        return ViewAction::None;
      }
      KeyResult::NotHandled => {}
      _ => return ViewAction::None,
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('c') => self.open_category_picker(),
      KeyCode::Char('r') => self.list.retry(),
      KeyCode::Enter => {
        if let Some(warehouse) = self.selected().cloned() {
          return ViewAction::Push(Box::new(ProductListView::new(self.ctx.clone(), warehouse)));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.search.render_overlay(frame, area);
    self.category_picker.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Warehouses".to_string()
  }

  fn tick(&mut self) {
    // A 401 has already expired the session; the App reacts to that
    if let Err(e) = self.list.poll() {
      debug!(error = %e, "warehouse list poll stopped");
    }
  }

  fn is_capturing_input(&self) -> bool {
    self.search.is_active() || self.category_picker.is_active()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("c", "category").with_priority(30),
      ShortcutInfo::new("r", "retry").with_priority(40),
      ShortcutInfo::new("enter", "products").with_priority(50),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}
