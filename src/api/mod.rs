//! Typed client for the inventory REST API.

mod client;
mod error;
mod types;

pub use client::{ApiResult, InventoryClient, DEFAULT_BASE_URL};
pub use error::ApiError;
pub use types::{
  ListItem, LogAction, LogEntry, Order, OrderFilter, OrderStatus, Product, ProductForm,
  StockAction, StockAdjustment, Warehouse,
};
