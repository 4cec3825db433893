//! Larder prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    cart::{
        AddManyOptions, CartError, CartLine, CartLinePatch, CartStore, LineId, NewCartLine,
        ValidationError, equivalence_key,
    },
    config::ClientConfig,
    identity::{CustomerId, Identity, KeyResolver, Migration},
    orders::{
        AggregatedStatus, DetailId, HttpOrdersApi, NewOrder, OrderDetail, OrderDetails, OrderId,
        OrderReceipt, OrderStatus, OrderSummary, OrdersApi, OrdersApiError, aggregate,
        summarize_orders,
    },
    settings::{HttpSettingsProvider, SettingsProvider, StaticSettings, UnitSettings},
    storage::{
        ExternalChange, FileStorage, MemoryStorage, Persistence, PersistenceError,
        PersistencePolicy, StorageBackend, StorageKey,
    },
};
