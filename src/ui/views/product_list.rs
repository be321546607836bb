use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use std::collections::HashMap;
use tracing::debug;

use crate::api::{Product, StockAction, StockAdjustment, Warehouse};
use crate::query::{
  CategoryFilter, ListCoordinator, ListPhase, LocalPatch, MutationApplier, MutationOutcome, Query,
};
use crate::session::Access;
use crate::ui::components::{KeyResult, Picker, PickerEvent, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{pad, stock_style};
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewContext};
use crate::ui::views::OrderListView;

/// Cache key of the product list of one warehouse
pub fn cache_key(warehouse_id: &str) -> String {
  format!("products:{}", warehouse_id)
}

/// Products of one warehouse with per-item stock adjustment.
pub struct ProductListView {
  ctx: ViewContext,
  warehouse: Warehouse,
  details: Query<Warehouse>,
  list: ListCoordinator<Product>,
  applier: MutationApplier<Product>,
  mode: StockAction,
  /// Amount entered per product; 1 when untouched
  amounts: HashMap<String, i64>,
  list_state: ListState,
  search: SearchInput,
  category_picker: Picker,
  notice: Option<String>,
}

impl ProductListView {
  pub fn new(ctx: ViewContext, warehouse: Warehouse) -> Self {
    let client = ctx.client.clone();
    let warehouse_id = warehouse.id.clone();
    let mut list = ListCoordinator::new(
      move |query: String| {
        let client = client.clone();
        let warehouse_id = warehouse_id.clone();
        async move { client.list_products(&warehouse_id, &query).await }
      },
      ctx.debounce,
    )
    .with_cache(ctx.cache.clone(), cache_key(&warehouse.id));
    list.mount();

    let client = ctx.client.clone();
    let warehouse_id = warehouse.id.clone();
    let mut details = Query::new(move || {
      let client = client.clone();
      let warehouse_id = warehouse_id.clone();
      async move { client.get_warehouse(&warehouse_id).await }
    });
    details.fetch();

    Self {
      ctx,
      warehouse,
      details,
      list,
      applier: MutationApplier::new(),
      mode: StockAction::Sub,
      amounts: HashMap::new(),
      list_state: ListState::default(),
      search: SearchInput::new("products"),
      category_picker: Picker::new(),
      notice: None,
    }
  }

  /// Latest known warehouse details, falling back to what the list had
  fn warehouse(&self) -> &Warehouse {
    self.details.data().unwrap_or(&self.warehouse)
  }

  fn selected(&self) -> Option<&Product> {
    let idx = self.list_state.selected()?;
    self.list.visible().get(idx).copied()
  }

  fn amount(&self, product_id: &str) -> i64 {
    self.amounts.get(product_id).copied().unwrap_or(1)
  }

  fn change_amount(&mut self, delta: i64) {
    let Some(id) = self.selected().map(|p| p.id.clone()) else {
      return;
    };
    let amount = (self.amount(&id) + delta).max(1);
    self.amounts.insert(id.clone(), amount);
    self.applier.clear_error(&id);
  }

  fn submit(&mut self) {
    let Some(product) = self.selected().cloned() else {
      return;
    };

    let adjustment = StockAdjustment::clamped(self.mode, self.amount(&product.id), product.quantity);
    if adjustment.is_noop() {
      self.notice = Some(format!("{} is out of stock", product.name));
      return;
    }

    let client = self.ctx.client.clone();
    let warehouse_id = self.warehouse.id.clone();
    let product_id = product.id.clone();
    let request =
      async move { client.adjust_quantity(&warehouse_id, &product_id, adjustment).await };
    let patch = LocalPatch::update(move |p: &Product| Product {
      quantity: adjustment.apply_to(p.quantity),
      ..p.clone()
    });

    debug!(product = %product.id, action = ?adjustment.action(), value = adjustment.value(), "submitting stock change");
    if let Err(rejected) = self.applier.mutate(product.id.clone(), request, patch) {
      self.notice = Some(rejected.to_string());
    }
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
    let category = index
      .checked_sub(1)
      .and_then(|i| self.list.categories().get(i).cloned())
      .map(CategoryFilter::Only)
      .unwrap_or_default();
    self.list.set_category(category);
    self.list_state.select(Some(0));
  }

  fn open_orders(&mut self) -> ViewAction {
    match self.ctx.session().authorize(Access::Manager) {
      Ok(()) => ViewAction::Push(Box::new(OrderListView::new(
        self.ctx.clone(),
        Some(self.warehouse().clone()),
      ))),
      Err(_) => {
        self.notice = Some("Orders are available to managers only".to_string());
        ViewAction::None
      }
    }
  }

  fn render_row(&self, product: &Product) -> ListItem<'static> {
    let mut spans = vec![
      Span::styled(pad(&product.name, 26), Style::default().fg(Color::Cyan)),
      Span::raw(" "),
      Span::styled(pad(&product.category, 14), Style::default().fg(Color::Yellow)),
      Span::raw(" "),
      Span::styled(format!("{:>6}", product.quantity), stock_style(product)),
      Span::styled(
        format!("  min {:<5}", product.critical_value),
        Style::default().fg(Color::DarkGray),
      ),
    ];

    let sign = match self.mode {
      StockAction::Add => '+',
      StockAction::Sub => '-',
    };
    spans.push(Span::styled(
      format!(" {}{:<4}", sign, self.amount(&product.id)),
      Style::default().fg(Color::White),
    ));

    if self.applier.is_busy(&product.id) {
      spans.push(Span::styled(" saving...", Style::default().fg(Color::Magenta)));
    } else if let Some(error) = self.applier.error(&product.id) {
      spans.push(Span::styled(format!(" {}", error), Style::default().fg(Color::Red)));
    }

    ListItem::new(Line::from(spans))
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let name = self.warehouse().name.clone();
    let title = match self.list.phase() {
      ListPhase::Loading => format!(" {} (loading...) ", name),
      ListPhase::Failed(e) => format!(" {} (error: {}) ", name, e),
      _ => format!(
        " {} ({}) · mode: {} ",
        name,
        self.list.visible().len(),
        self.mode.label()
      ),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let visible = self.list.visible();
    ensure_valid_selection(&mut self.list_state, visible.len());

    if visible.is_empty() {
      let content = match self.list.phase() {
        ListPhase::Loading => "Loading products...".to_string(),
        ListPhase::Failed(e) => format!("{}. Press 'r' to retry.", e),
        _ => "No products found.".to_string(),
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = visible.iter().map(|p| self.render_row(p)).collect();

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

impl View for ProductListView {
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
      KeyCode::Char('m') => self.mode = self.mode.toggle(),
      KeyCode::Char('+') | KeyCode::Char('=') => self.change_amount(1),
      KeyCode::Char('-') => self.change_amount(-1),
      KeyCode::Enter => self.submit(),
      KeyCode::Char('o') => return self.open_orders(),
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
    self.warehouse().name.clone()
  }

  fn tick(&mut self) {
    if let Err(e) = self.details.poll() {
      debug!(error = %e, "warehouse details poll stopped");
    }
    if let Err(e) = self.list.poll() {
      debug!(error = %e, "product list poll stopped");
    }
    match self.applier.poll(&mut self.list) {
      Ok(outcomes) => {
        for outcome in outcomes {
          if let MutationOutcome::Applied { id } = outcome {
            if let Some(product) = self.list.find(&id) {
              self.notice = Some(format!("{}: {} in stock", product.name, product.quantity));
            }
          }
        }
      }
      Err(e) => debug!(error = %e, "stock update stopped"),
    }
  }

  fn is_capturing_input(&self) -> bool {
    self.search.is_active() || self.category_picker.is_active()
  }

  fn take_notice(&mut self) -> Option<String> {
    self.notice.take()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    let mut shortcuts = vec![
      ShortcutInfo::new("/", "search").with_priority(20),
      ShortcutInfo::new("c", "category").with_priority(30),
      ShortcutInfo::new("m", "add/sub").with_priority(40),
      ShortcutInfo::new("+/-", "amount").with_priority(50),
      ShortcutInfo::new("enter", "apply").with_priority(60),
      ShortcutInfo::new("r", "retry").with_priority(80),
      ShortcutInfo::new("q", "back").with_priority(90),
    ];
    if self.ctx.session().is_manager() {
      shortcuts.push(ShortcutInfo::new("o", "orders").with_priority(70));
    }
    shortcuts
  }
}
