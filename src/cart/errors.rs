//! Cart errors.

use thiserror::Error;

use crate::{orders::OrdersApiError, storage::PersistenceError};

/// A cart line (or cart) failed local validation. Nothing was mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The line has no category.
    #[error("category is required")]
    MissingCategory,

    /// The line has neither an item key nor an item label.
    #[error("item key or item label is required")]
    MissingItem,

    /// The quantity is zero, negative or absent.
    #[error("quantity must be greater than zero")]
    NonPositiveQuantity,

    /// A unit change named no unit.
    #[error("unit must not be blank")]
    BlankUnit,

    /// Submission was attempted with nothing in the cart.
    #[error("the cart is empty")]
    EmptyCart,
}

/// Errors returned by cart store operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// A single line failed validation.
    #[error("invalid cart line: {0}")]
    Invalid(#[from] ValidationError),

    /// A line of a batch failed validation (index within the batch).
    #[error("invalid cart line at position {index}: {source}")]
    InvalidLine {
        /// Position of the offending line in the batch.
        index: usize,

        /// What was wrong with it.
        #[source]
        source: ValidationError,
    },

    /// Persisting the cart failed and the persistence policy surfaces failures.
    #[error("failed to persist cart")]
    Persistence(#[from] PersistenceError),

    /// The order API rejected or failed the submission. The cart is unchanged.
    #[error("failed to submit order")]
    Submission(#[from] OrdersApiError),
}

impl CartError {
    /// The validation failure behind this error, if any.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Invalid(error) | Self::InvalidLine { source: error, .. } => Some(error),
            Self::Persistence(_) | Self::Submission(_) => None,
        }
    }
}
