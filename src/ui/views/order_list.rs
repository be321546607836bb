use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use std::collections::HashMap;
use tracing::debug;

use crate::api::{ApiError, Order, OrderFilter, OrderStatus, Warehouse};
use crate::query::{
  CategoryFilter, ListCoordinator, ListPhase, LocalPatch, MutationApplier, MutationOutcome, Query,
};
use crate::ui::components::{KeyResult, Picker, PickerEvent};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{order_status_color, pad};
use crate::ui::view::{ShortcutInfo, View, ViewAction, ViewContext};

pub fn cache_key(warehouse_id: Option<&str>) -> String {
  match warehouse_id {
    Some(id) => format!("orders:{}", id),
    None => "orders".to_string(),
  }
}

/// Which picker is open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PickerPurpose {
  Filter,
  ChangeStatus,
}

/// Restocking orders, optionally scoped to one warehouse. Managers only.
pub struct OrderListView {
  warehouse: Option<Warehouse>,
  list: ListCoordinator<Order>,
  applier: MutationApplier<Order>,
  /// Warehouse names for orders that only carry an id
  names: Query<HashMap<String, String>>,
  list_state: ListState,
  picker: Picker,
  picker_purpose: PickerPurpose,
  /// Order id awaiting a second `x`
  confirm_delete: Option<String>,
  ctx: ViewContext,
  notice: Option<String>,
}

impl OrderListView {
  pub fn new(ctx: ViewContext, warehouse: Option<Warehouse>) -> Self {
    let client = ctx.client.clone();
    let filter = OrderFilter {
      warehouse_id: warehouse.as_ref().map(|w| w.id.clone()),
      status: None,
    };
    // The orders endpoint has no text search; status is filtered locally
    let mut list = ListCoordinator::new(
      move |_query: String| {
        let client = client.clone();
        let filter = filter.clone();
        async move { client.list_orders(&filter).await }
      },
      ctx.debounce,
    )
    .with_cache(
      ctx.cache.clone(),
      cache_key(warehouse.as_ref().map(|w| w.id.as_str())),
    );
    list.mount();

    let client = ctx.client.clone();
    let mut names = Query::new(move || {
      let client = client.clone();
      async move {
        let warehouses = client.list_warehouses("").await?;
        Ok::<_, ApiError>(
          warehouses
            .into_iter()
            .map(|w| (w.id, w.name))
            .collect::<HashMap<_, _>>(),
        )
      }
    });
    if warehouse.is_none() {
      names.fetch();
    }

    Self {
      warehouse,
      list,
      applier: MutationApplier::new(),
      names,
      list_state: ListState::default(),
      picker: Picker::new(),
      picker_purpose: PickerPurpose::Filter,
      confirm_delete: None,
      ctx,
      notice: None,
    }
  }

  fn selected(&self) -> Option<&Order> {
    let idx = self.list_state.selected()?;
    self.list.visible().get(idx).copied()
  }

  fn warehouse_name<'a>(&'a self, order: &'a Order) -> &'a str {
    if let Some(name) = order.warehouse.name() {
      return name;
    }
    if let Some(w) = &self.warehouse {
      if w.id == order.warehouse.id() {
        return &w.name;
      }
    }
    self
      .names
      .data()
      .and_then(|names| names.get(order.warehouse.id()))
      .map(String::as_str)
      .unwrap_or_else(|| order.warehouse.id())
  }

  fn status_options() -> Vec<String> {
    OrderStatus::ALL
      .iter()
      .map(|s| s.label().to_string())
      .collect()
  }

  fn open_filter(&mut self) {
    let mut options = vec![CategoryFilter::All.label().to_string()];
    options.extend(Self::status_options());
    let current = match &self.list.filter().category {
      CategoryFilter::All => 0,
      CategoryFilter::Only(wire) => OrderStatus::ALL
        .iter()
        .position(|s| s.wire_name() == wire)
        .map(|i| i + 1)
        .unwrap_or(0),
    };
    self.picker_purpose = PickerPurpose::Filter;
    self.picker.show("Status filter", options, current);
  }

  fn open_status_change(&mut self) {
    let Some(order) = self.selected() else {
      return;
    };
    let current = OrderStatus::ALL
      .iter()
      .position(|s| *s == order.status)
      .unwrap_or(0);
    self.picker_purpose = PickerPurpose::ChangeStatus;
    self.picker.show("Set status", Self::status_options(), current);
  }

  fn on_picked(&mut self, index: usize) {
    match self.picker_purpose {
      PickerPurpose::Filter => {
        let category = index
          .checked_sub(1)
          .and_then(|i| OrderStatus::ALL.get(i))
          .map(|s| CategoryFilter::Only(s.wire_name().to_string()))
          .unwrap_or_default();
        self.list.set_category(category);
        self.list_state.select(Some(0));
      }
      PickerPurpose::ChangeStatus => {
        if let Some(status) = OrderStatus::ALL.get(index).copied() {
          self.change_status(status);
        }
      }
    }
  }

  fn change_status(&mut self, status: OrderStatus) {
    let Some(order) = self.selected().cloned() else {
      return;
    };
    if order.status == status {
      return;
    }

    let client = self.ctx.client.clone();
    let warehouse_id = order.warehouse.id().to_string();
    let order_id = order.id.clone();
    let request = async move {
      client
        .update_order_status(&warehouse_id, &order_id, status)
        .await
        .map(Some)
    };

    debug!(order = %order.id, status = status.wire_name(), "changing order status");
    if let Err(rejected) = self.applier.mutate(order.id.clone(), request, LocalPatch::Keep) {
      self.notice = Some(rejected.to_string());
    }
  }

  fn delete_selected(&mut self) {
    let Some(order) = self.selected().cloned() else {
      return;
    };
    if self.confirm_delete.as_deref() != Some(order.id.as_str()) {
      self.notice = Some(format!("Press x again to delete the order for {}", order.product_name));
      self.confirm_delete = Some(order.id);
      return;
    }
    self.confirm_delete = None;

    let client = self.ctx.client.clone();
    let warehouse_id = order.warehouse.id().to_string();
    let order_id = order.id.clone();
    let request = async move {
      client.delete_order(&warehouse_id, &order_id).await?;
      Ok::<_, ApiError>(None)
    };

    if let Err(rejected) = self.applier.mutate(order.id.clone(), request, LocalPatch::Remove) {
      self.notice = Some(rejected.to_string());
    }
  }

  fn render_row(&self, order: &Order) -> ListItem<'static> {
    let mut spans = vec![
      Span::styled(pad(&order.product_name, 26), Style::default().fg(Color::Cyan)),
      Span::raw(" "),
      Span::styled(
        pad(self.warehouse_name(order), 20),
        Style::default().fg(Color::White),
      ),
      Span::raw(" "),
      Span::styled(
        pad(order.status.label(), 15),
        Style::default().fg(order_status_color(order.status)),
      ),
      Span::styled(
        order.created_at.clone().unwrap_or_default(),
        Style::default().fg(Color::DarkGray),
      ),
    ];

    if self.applier.is_busy(&order.id) {
      spans.push(Span::styled(" saving...", Style::default().fg(Color::Magenta)));
    } else if let Some(error) = self.applier.error(&order.id) {
      spans.push(Span::styled(format!(" {}", error), Style::default().fg(Color::Red)));
    }

    ListItem::new(Line::from(spans))
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let status = match &self.list.filter().category {
      CategoryFilter::All => None,
      CategoryFilter::Only(wire) => OrderStatus::ALL
        .iter()
        .find(|s| s.wire_name() == wire)
        .map(|s| s.label()),
    };
    let scope = match (&self.warehouse, status) {
      (Some(w), Some(s)) => format!(" [{}, {}]", w.name, s),
      (Some(w), None) => format!(" [{}]", w.name),
      (None, Some(s)) => format!(" [{}]", s),
      (None, None) => String::new(),
    };
    let title = match self.list.phase() {
      ListPhase::Loading => format!(" Orders{} (loading...) ", scope),
      ListPhase::Failed(e) => format!(" Orders{} (error: {}) ", scope, e),
      _ => format!(" Orders{} ({}) ", scope, self.list.visible().len()),
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
        ListPhase::Loading => "Loading orders...".to_string(),
        ListPhase::Failed(e) => format!("{}. Press 'r' to retry.", e),
        _ => "No orders.".to_string(),
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = visible.iter().map(|o| self.render_row(o)).collect();

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

impl View for OrderListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.picker.handle_key(key) {
      KeyResult::Event(PickerEvent::Selected(index)) => {
        self.on_picked(index);
        return ViewAction::None;
      }
      KeyResult::NotHandled => {}
      _ => return ViewAction::None,
    }

    if key.code != KeyCode::Char('x') {
      self.confirm_delete = None;
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('f') => self.open_filter(),
      KeyCode::Char('s') => self.open_status_change(),
      KeyCode::Char('x') => self.delete_selected(),
      KeyCode::Char('r') => self.list.retry(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.picker.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Orders".to_string()
  }

  fn tick(&mut self) {
    if let Err(e) = self.names.poll() {
      debug!(error = %e, "warehouse names poll stopped");
    }
    if let Err(e) = self.list.poll() {
      debug!(error = %e, "order list poll stopped");
    }
    match self.applier.poll(&mut self.list) {
      Ok(outcomes) => {
        for outcome in outcomes {
          if let MutationOutcome::Removed { .. } = outcome {
            self.notice = Some("Order deleted".to_string());
          }
        }
      }
      Err(e) => debug!(error = %e, "order update stopped"),
    }
  }

  fn is_capturing_input(&self) -> bool {
    self.picker.is_active()
  }

  fn take_notice(&mut self) -> Option<String> {
    self.notice.take()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("f", "filter").with_priority(20),
      ShortcutInfo::new("s", "status").with_priority(30),
      ShortcutInfo::new("x", "delete").with_priority(40),
      ShortcutInfo::new("r", "retry").with_priority(50),
      ShortcutInfo::new("q", "back").with_priority(90),
    ]
  }
}
