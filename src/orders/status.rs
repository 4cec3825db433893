//! Order Status
//!
//! Line items of a submitted order each carry a delivery status. The
//! order-level status shown to customers and staff is derived from those
//! with [`aggregate`], and nowhere else, so the same order reads the same in
//! every list.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Delivery status of one order line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted, not yet delivered.
    #[default]
    Pending,

    /// Delivered to the customer.
    Delivered,

    /// Will not be delivered.
    Cancelled,
}

impl OrderStatus {
    /// Every status, in display order.
    pub const ALL: [Self; 3] = [Self::Pending, Self::Delivered, Self::Cancelled];

    /// The wire code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Interpret a raw status as reported by the order store.
    ///
    /// Matching ignores surrounding whitespace and case. Anything absent or
    /// unrecognised is [`OrderStatus::Pending`].
    pub fn normalize(raw: Option<&str>) -> Self {
        raw.and_then(|raw| raw.parse().ok()).unwrap_or_default()
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A raw status outside the fixed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown order status: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let code = raw.trim().to_ascii_uppercase();

        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == code)
            .ok_or_else(|| UnknownStatus(raw.to_string()))
    }
}

/// Order-level status derived from line statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregatedStatus {
    /// Nothing delivered yet.
    Pending,

    /// Every line delivered.
    Delivered,

    /// Every line cancelled.
    Cancelled,

    /// Some lines delivered, others not.
    Partial,
}

impl AggregatedStatus {
    /// The wire code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
            Self::Partial => "PARTIAL",
        }
    }
}

impl Display for AggregatedStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl From<OrderStatus> for AggregatedStatus {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Pending => Self::Pending,
            OrderStatus::Delivered => Self::Delivered,
            OrderStatus::Cancelled => Self::Cancelled,
        }
    }
}

/// Reduce raw line statuses to one order-level status.
///
/// Each raw status is normalised with [`OrderStatus::normalize`] first, so
/// the function is total over its input.
///
/// | distinct statuses                  | result      |
/// |------------------------------------|-------------|
/// | none                               | `PENDING`   |
/// | exactly one                        | that status |
/// | several, including `DELIVERED`     | `PARTIAL`   |
/// | `PENDING` and `CANCELLED` only     | `PENDING`   |
pub fn aggregate<I, S>(statuses: I) -> AggregatedStatus
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    aggregate_statuses(
        statuses
            .into_iter()
            .map(|raw| OrderStatus::normalize(raw.as_ref().map(S::as_ref))),
    )
}

/// [`aggregate`] over statuses that are already normalised.
pub fn aggregate_statuses<I>(statuses: I) -> AggregatedStatus
where
    I: IntoIterator<Item = OrderStatus>,
{
    let (mut pending, mut delivered, mut cancelled) = (false, false, false);

    for status in statuses {
        match status {
            OrderStatus::Pending => pending = true,
            OrderStatus::Delivered => delivered = true,
            OrderStatus::Cancelled => cancelled = true,
        }
    }

    match (pending, delivered, cancelled) {
        (false, true, false) => AggregatedStatus::Delivered,
        (false, false, true) => AggregatedStatus::Cancelled,
        (_, true, _) => AggregatedStatus::Partial,
        _ => AggregatedStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn of(raw: &[Option<&str>]) -> AggregatedStatus {
        aggregate(raw.iter().copied())
    }

    #[test]
    fn empty_is_pending() {
        assert_eq!(of(&[]), AggregatedStatus::Pending);
    }

    #[test]
    fn single_status_passes_through() {
        assert_eq!(of(&[Some("DELIVERED")]), AggregatedStatus::Delivered);
        assert_eq!(of(&[Some("PENDING")]), AggregatedStatus::Pending);
        assert_eq!(of(&[Some("CANCELLED")]), AggregatedStatus::Cancelled);
        assert_eq!(
            of(&[Some("CANCELLED"), Some("CANCELLED")]),
            AggregatedStatus::Cancelled
        );
    }

    #[test]
    fn any_delivered_in_a_mix_is_partial() {
        assert_eq!(
            of(&[Some("DELIVERED"), Some("PENDING")]),
            AggregatedStatus::Partial
        );
        assert_eq!(
            of(&[Some("DELIVERED"), Some("CANCELLED")]),
            AggregatedStatus::Partial
        );
        assert_eq!(
            of(&[Some("DELIVERED"), Some("CANCELLED"), Some("PENDING")]),
            AggregatedStatus::Partial
        );
    }

    #[test]
    fn pending_and_cancelled_is_pending() {
        assert_eq!(
            of(&[Some("PENDING"), Some("CANCELLED")]),
            AggregatedStatus::Pending
        );
    }

    #[test]
    fn unknown_and_missing_read_as_pending() {
        assert_eq!(of(&[None, None, Some("UNKNOWN")]), AggregatedStatus::Pending);
        assert_eq!(
            of(&[None, Some("DELIVERED")]),
            AggregatedStatus::Partial,
            "a missing status is a pending line"
        );
    }

    #[test]
    fn raw_statuses_are_trimmed_and_case_folded() {
        assert_eq!(OrderStatus::normalize(Some(" delivered ")), OrderStatus::Delivered);
        assert_eq!(OrderStatus::normalize(Some("Cancelled")), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::normalize(Some("shipped")), OrderStatus::Pending);
        assert_eq!(of(&[Some("delivered"), Some("DELIVERED")]), AggregatedStatus::Delivered);
    }

    #[test]
    fn from_str_is_strict_about_vocabulary() {
        assert_eq!("pending".parse::<OrderStatus>(), Ok(OrderStatus::Pending));
        assert_eq!(
            "NEW".parse::<OrderStatus>(),
            Err(UnknownStatus("NEW".to_string()))
        );
    }

    #[test]
    fn owned_strings_are_accepted() {
        let raw = vec![Some("DELIVERED".to_string()), None];

        assert_eq!(aggregate(raw), AggregatedStatus::Partial);
    }

    #[test]
    fn status_codes_match_serde_names() -> testresult::TestResult {
        for status in OrderStatus::ALL {
            assert_eq!(serde_json::to_value(status)?, status.as_str());
        }

        assert_eq!(serde_json::to_value(AggregatedStatus::Partial)?, "PARTIAL");

        Ok(())
    }
}
