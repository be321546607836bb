//! Records exchanged with the inventory API.

use serde::{Deserialize, Deserializer, Serialize};

/// A record that can be shown in a searchable, filterable list.
pub trait ListItem: Clone + Send + Sync + 'static {
  /// Stable identifier of the record.
  fn item_id(&self) -> &str;

  /// Name used for client-side text filtering.
  fn display_name(&self) -> &str;

  /// Category used for client-side category filtering.
  fn category(&self) -> Option<&str> {
    None
  }
}

/// List payloads arrive either as a bare array or wrapped in `{ "items": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListEnvelope<T> {
  Bare(Vec<T>),
  Wrapped { items: Vec<T> },
}

impl<T> ListEnvelope<T> {
  pub fn into_items(self) -> Vec<T> {
    match self {
      Self::Bare(items) | Self::Wrapped { items } => items,
    }
  }
}

/// Identifiers come back as strings or numbers depending on the backend.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum RawId {
    Text(String),
    Number(i64),
  }

  Ok(match RawId::deserialize(deserializer)? {
    RawId::Text(s) => s,
    RawId::Number(n) => n.to_string(),
  })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warehouse {
  #[serde(rename = "_id", deserialize_with = "deserialize_id")]
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub address: Option<String>,
  #[serde(default)]
  pub category: Option<String>,
}

impl ListItem for Warehouse {
  fn item_id(&self) -> &str {
    &self.id
  }

  fn display_name(&self) -> &str {
    &self.name
  }

  fn category(&self) -> Option<&str> {
    self.category.as_deref()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
  pub url: String,
  #[serde(default)]
  pub delete_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  #[serde(rename = "_id", deserialize_with = "deserialize_id")]
  pub id: String,
  pub name: String,
  pub quantity: u32,
  #[serde(default)]
  pub critical_value: u32,
  #[serde(default)]
  pub category: String,
  #[serde(default)]
  pub photo: Option<Photo>,
  #[serde(default)]
  pub created_at: Option<String>,
}

impl Product {
  /// Stock has fallen to or below the reorder threshold.
  pub fn is_critical(&self) -> bool {
    self.quantity <= self.critical_value
  }
}

impl ListItem for Product {
  fn item_id(&self) -> &str {
    &self.id
  }

  fn display_name(&self) -> &str {
    &self.name
  }

  fn category(&self) -> Option<&str> {
    Some(self.category.as_str()).filter(|c| !c.trim().is_empty())
  }
}

/// Direction of a stock adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockAction {
  Add,
  Sub,
}

impl StockAction {
  pub fn toggle(self) -> Self {
    match self {
      Self::Add => Self::Sub,
      Self::Sub => Self::Add,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Self::Add => "add",
      Self::Sub => "subtract",
    }
  }
}

/// A stock adjustment whose amount has already been clamped for the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockAdjustment {
  action: StockAction,
  value: u32,
}

impl StockAdjustment {
  /// Clamp a requested amount against the current stock.
  ///
  /// Subtractions are limited to `[0, current]`; additions only to `>= 0`.
  pub fn clamped(action: StockAction, requested: i64, current: u32) -> Self {
    let floor = requested.max(0);
    let value = match action {
      StockAction::Sub => floor.min(i64::from(current)) as u32,
      StockAction::Add => floor.min(i64::from(u32::MAX)) as u32,
    };
    Self { action, value }
  }

  pub fn action(&self) -> StockAction {
    self.action
  }

  pub fn value(&self) -> u32 {
    self.value
  }

  pub fn is_noop(&self) -> bool {
    self.value == 0
  }

  /// Quantity after applying this adjustment locally.
  pub fn apply_to(&self, quantity: u32) -> u32 {
    match self.action {
      StockAction::Add => quantity.saturating_add(self.value),
      StockAction::Sub => quantity.saturating_sub(self.value),
    }
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuantityPatch<'a> {
  pub action: StockAction,
  pub value: u32,
  pub warehouse_id: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
  #[serde(rename = "Ожидает Заказа")]
  AwaitingOrder,
  #[serde(rename = "Заказано")]
  Ordered,
}

impl OrderStatus {
  pub const ALL: [OrderStatus; 2] = [OrderStatus::AwaitingOrder, OrderStatus::Ordered];

  /// The value the server stores and filters by.
  pub fn wire_name(self) -> &'static str {
    match self {
      Self::AwaitingOrder => "Ожидает Заказа",
      Self::Ordered => "Заказано",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Self::AwaitingOrder => "Awaiting order",
      Self::Ordered => "Ordered",
    }
  }
}

/// Orders reference their warehouse either by id or embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WarehouseRef {
  Id(String),
  Embedded(Warehouse),
}

impl WarehouseRef {
  pub fn id(&self) -> &str {
    match self {
      Self::Id(id) => id,
      Self::Embedded(w) => &w.id,
    }
  }

  pub fn name(&self) -> Option<&str> {
    match self {
      Self::Id(_) => None,
      Self::Embedded(w) => Some(&w.name),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  #[serde(rename = "_id", deserialize_with = "deserialize_id")]
  pub id: String,
  pub product_name: String,
  pub warehouse: WarehouseRef,
  pub status: OrderStatus,
  #[serde(default)]
  pub created_at: Option<String>,
  #[serde(default)]
  pub status_changed_at: Option<String>,
}

impl ListItem for Order {
  fn item_id(&self) -> &str {
    &self.id
  }

  fn display_name(&self) -> &str {
    &self.product_name
  }

  fn category(&self) -> Option<&str> {
    Some(self.status.wire_name())
  }
}

/// Server-side filter for the orders list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
  pub warehouse_id: Option<String>,
  pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogAction {
  Set,
  Add,
  Sub,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogUser {
  pub username: String,
  #[serde(default)]
  pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
  #[serde(rename = "_id", deserialize_with = "deserialize_id")]
  pub id: String,
  pub warehouse: String,
  pub product_id: String,
  pub action: LogAction,
  pub old_quantity: i64,
  pub new_quantity: i64,
  pub user: LogUser,
  pub timestamp: String,
}

impl ListItem for LogEntry {
  fn item_id(&self) -> &str {
    &self.id
  }

  fn display_name(&self) -> &str {
    &self.user.username
  }
}

/// Fields sent when creating or editing a product.
#[derive(Debug, Clone, Default)]
pub struct ProductForm {
  pub name: String,
  pub quantity: u32,
  pub critical_value: u32,
  pub category: String,
  pub photo: Option<std::path::PathBuf>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_warehouse_accepts_numeric_id() {
    let json = r#"{"_id": 7, "name": "Main St", "address": "1 Main", "category": "A"}"#;
    let w: Warehouse = serde_json::from_str(json).unwrap();
    assert_eq!(w.id, "7");
    assert_eq!(w.category(), Some("A"));
  }

  #[test]
  fn test_list_envelope_both_shapes() {
    let bare: ListEnvelope<Warehouse> =
      serde_json::from_str(r#"[{"_id": "1", "name": "North"}]"#).unwrap();
    assert_eq!(bare.into_items().len(), 1);

    let wrapped: ListEnvelope<Warehouse> =
      serde_json::from_str(r#"{"items": [{"_id": "1", "name": "North"}, {"_id": "2", "name": "South"}]}"#)
        .unwrap();
    assert_eq!(wrapped.into_items().len(), 2);
  }

  #[test]
  fn test_subtract_is_clamped_to_current_stock() {
    let adj = StockAdjustment::clamped(StockAction::Sub, 25, 10);
    assert_eq!(adj.value(), 10);
    assert_eq!(adj.apply_to(10), 0);

    let adj = StockAdjustment::clamped(StockAction::Sub, -3, 10);
    assert!(adj.is_noop());
  }

  #[test]
  fn test_add_has_no_upper_bound() {
    let adj = StockAdjustment::clamped(StockAction::Add, 1_000, 2);
    assert_eq!(adj.value(), 1_000);
    assert_eq!(adj.apply_to(2), 1_002);

    let adj = StockAdjustment::clamped(StockAction::Add, -5, 2);
    assert_eq!(adj.value(), 0);
  }

  #[test]
  fn test_order_status_wire_names() {
    let json = r#"{"_id": "o1", "productName": "Bolts", "warehouse": "w1", "status": "Заказано"}"#;
    let order: Order = serde_json::from_str(json).unwrap();
    assert_eq!(order.status, OrderStatus::Ordered);
    assert_eq!(order.warehouse.id(), "w1");

    let embedded = r#"{"_id": "o2", "productName": "Nuts", "warehouse": {"_id": "w2", "name": "East"}, "status": "Ожидает Заказа"}"#;
    let order: Order = serde_json::from_str(embedded).unwrap();
    assert_eq!(order.warehouse.id(), "w2");
    assert_eq!(order.warehouse.name(), Some("East"));
  }

  #[test]
  fn test_product_critical_threshold() {
    let json = r#"{"_id": "p1", "name": "Screws", "quantity": 3, "criticalValue": 3, "category": "hardware"}"#;
    let product: Product = serde_json::from_str(json).unwrap();
    assert!(product.is_critical());
  }

  #[test]
  fn test_quantity_patch_body() {
    let body = QuantityPatch {
      action: StockAction::Sub,
      value: 5,
      warehouse_id: "w1",
    };
    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(
      json,
      serde_json::json!({"action": "sub", "value": 5, "warehouseId": "w1"})
    );
  }
}
