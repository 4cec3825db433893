//! Carts

pub mod actions;
pub mod errors;
pub mod lines;
pub mod merge;
pub mod store;

pub use actions::{Applied, CartAction};
pub use errors::{CartError, ValidationError};
pub use lines::{CartLine, CartLinePatch, LineId, NewCartLine, coerce_quantity};
pub use merge::{EquivalenceKey, equivalence_key, merge_quantity};
pub use store::{AddManyOptions, CartStore};
