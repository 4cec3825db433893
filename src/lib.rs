//! Larder
//!
//! Larder is the client-side order cart for a wholesale butcher: customers
//! collect cuts and quantities into a cart that survives reloads, logins and
//! several open windows, then submit it as an order. Submitted orders are
//! summarised by a single status aggregation engine.

pub mod cart;
pub mod config;
pub mod identity;
pub mod observability;
pub mod orders;
pub mod prelude;
pub mod settings;
pub mod storage;
pub mod uuids;
