//! Orders
//!
//! Submitted orders live in the external order store. This module holds the
//! client for it and the status aggregation shared by every order view.

pub mod client;
pub mod errors;
pub mod models;
pub mod status;

pub use client::{HttpOrdersApi, MockOrdersApi, OrdersApi};
pub use errors::OrdersApiError;
pub use models::{
    DetailId, NewOrder, OrderDetail, OrderDetails, OrderId, OrderLine, OrderReceipt, OrderSummary,
    summarize_orders,
};
pub use status::{AggregatedStatus, OrderStatus, UnknownStatus, aggregate, aggregate_statuses};
