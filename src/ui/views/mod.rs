mod order_list;
mod product_list;
mod warehouse_list;

pub use order_list::OrderListView;
pub use product_list::ProductListView;
pub use warehouse_list::WarehouseListView;
