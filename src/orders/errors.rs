//! Order API errors.

use thiserror::Error;

use crate::orders::models::DetailId;

/// Failures talking to the order API.
///
/// Every variant is recoverable: callers leave their local state as it was
/// and may retry.
#[derive(Debug, Error)]
pub enum OrdersApiError {
    /// An HTTP transport error occurred, including timeouts.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API returned a non-2xx response.
    #[error("unexpected response from order API: {0}")]
    UnexpectedResponse(String),

    /// The API answered `ok: false`.
    #[error("order API rejected the request: {0}")]
    Rejected(String),

    /// The response body did not have the expected shape.
    #[error("failed to decode order API response")]
    Decode(#[source] serde_json::Error),

    /// No line of the order has this detail id.
    #[error("order detail {0} not found")]
    DetailNotFound(DetailId),
}
