//! Order models

use std::fmt::{Display, Formatter, Result as FmtResult};

use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::{
    cart::{CartLine, NewCartLine, coerce_quantity},
    identity::{CustomerId, Identity},
    orders::{
        client::OrdersApi,
        errors::OrdersApiError,
        status::{AggregatedStatus, OrderStatus, aggregate},
    },
};

/// Submitted order identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(u64);

impl OrderId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        self.0.fmt(f)
    }
}

/// Order line (detail) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetailId(u64);

impl DetailId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for DetailId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        self.0.fmt(f)
    }
}

/// One line of a submitted order, as reported by the order store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderDetail {
    /// Detail id; older rows may not carry one.
    #[serde(default)]
    pub detail_id: Option<DetailId>,

    /// Item category.
    #[serde(default, rename = "type")]
    pub category: Option<String>,

    /// Item display name.
    #[serde(default)]
    pub label: Option<String>,

    /// Cut.
    #[serde(default)]
    pub sub_label: Option<String>,

    /// Unit code.
    #[serde(default)]
    pub unit: Option<String>,

    /// Ordered amount.
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub quantity: Decimal,

    /// Unit price, when known.
    #[serde(default, deserialize_with = "lenient_optional_decimal")]
    pub price: Option<Decimal>,

    /// Line total, when known.
    #[serde(default, deserialize_with = "lenient_optional_decimal")]
    pub amount: Option<Decimal>,

    /// Raw delivery status.
    #[serde(default)]
    pub status: Option<String>,

    /// Free-text annotation.
    #[serde(default)]
    pub note: Option<String>,
}

impl OrderDetail {
    /// The normalised delivery status.
    pub fn status(&self) -> OrderStatus {
        OrderStatus::normalize(self.status.as_deref())
    }
}

/// A previously ordered line, ready to go back into a cart.
///
/// The label becomes the item identity. A blank unit is left for the cart's
/// default unit to fill.
impl From<&OrderDetail> for NewCartLine {
    fn from(detail: &OrderDetail) -> Self {
        let non_blank = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        Self {
            category: detail.category.clone().unwrap_or_default(),
            item_key: None,
            item_label: non_blank(detail.label.as_deref()),
            sub_item: non_blank(detail.sub_label.as_deref()),
            quantity: detail.quantity,
            unit: non_blank(detail.unit.as_deref()),
            note: non_blank(detail.note.as_deref()),
        }
    }
}

/// The lines of one submitted order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDetails {
    /// The order.
    pub order_id: OrderId,

    /// Its lines, in store order.
    pub details: Vec<OrderDetail>,
}

impl OrderDetails {
    /// Fetch the lines of `order_id`.
    ///
    /// # Errors
    ///
    /// Returns the API failure.
    pub async fn fetch<A>(api: &A, order_id: OrderId) -> Result<Self, OrdersApiError>
    where
        A: OrdersApi + ?Sized,
    {
        let details = api.order_details(order_id).await?;

        Ok(Self { order_id, details })
    }

    /// The order-level status.
    pub fn aggregated_status(&self) -> AggregatedStatus {
        aggregate(self.details.iter().map(|detail| detail.status.as_deref()))
    }

    /// Change the status of one line.
    ///
    /// The new status is shown immediately and rolled back if the API call
    /// fails. Returns the order-level status after the change.
    ///
    /// # Errors
    ///
    /// Returns [`OrdersApiError::DetailNotFound`] for an unknown detail, or
    /// the API failure (after reverting).
    pub async fn update_status<A>(
        &mut self,
        api: &A,
        detail_id: DetailId,
        status: OrderStatus,
    ) -> Result<AggregatedStatus, OrdersApiError>
    where
        A: OrdersApi + ?Sized,
    {
        let detail = self
            .details
            .iter_mut()
            .find(|detail| detail.detail_id == Some(detail_id))
            .ok_or(OrdersApiError::DetailNotFound(detail_id))?;

        let previous = detail.status.replace(status.as_str().to_string());

        if let Err(failure) = api.update_detail_status(detail_id, status).await {
            error!(order_id = %self.order_id, %detail_id, error = %failure, "detail status update failed; reverting");

            if let Some(detail) = self
                .details
                .iter_mut()
                .find(|detail| detail.detail_id == Some(detail_id))
            {
                detail.status = previous;
            }

            return Err(failure);
        }

        debug!(order_id = %self.order_id, %detail_id, %status, "detail status updated");

        Ok(self.aggregated_status())
    }
}

/// An order ready to submit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    /// Ordering customer; `None` for guests.
    pub customer_id: Option<CustomerId>,

    /// Customer display name.
    pub customer_name: Option<String>,

    /// When the customer asked for the order.
    pub requested_at: Timestamp,

    /// Order lines, in cart order.
    pub items: Vec<OrderLine>,
}

impl NewOrder {
    /// Build an order from cart lines.
    pub fn from_cart(identity: &Identity, lines: &[CartLine], requested_at: Timestamp) -> Self {
        Self {
            customer_id: identity.customer_id(),
            customer_name: identity.customer_name().map(str::to_string),
            requested_at,
            items: lines.iter().map(OrderLine::from).collect(),
        }
    }
}

/// A cart line as sent to the order API: no internal id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    /// Item category.
    #[serde(rename = "type")]
    pub category: String,

    /// Item identity.
    pub item_key: Option<String>,

    /// Item display name.
    pub label: String,

    /// Cut.
    pub sub_item: Option<String>,

    /// Unit code.
    pub unit: String,

    /// Ordered amount.
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub quantity: Decimal,

    /// Free-text annotation.
    pub note: Option<String>,

    /// When the line was first added to the cart.
    pub created_at: Timestamp,
}

impl From<&CartLine> for OrderLine {
    fn from(line: &CartLine) -> Self {
        Self {
            category: line.category.clone(),
            item_key: line.item_key.clone(),
            label: line.display_label().to_string(),
            sub_item: line.sub_item.clone(),
            unit: line.unit.clone(),
            quantity: line.quantity,
            note: line.note.clone(),
            created_at: line.created_at,
        }
    }
}

/// What the order API accepted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderReceipt {
    /// The created order.
    pub order_id: OrderId,

    /// Sum of line quantities.
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub total_qty: Decimal,

    /// Sum of line amounts; `None` when no prices are known.
    #[serde(default, deserialize_with = "lenient_optional_decimal")]
    pub total_amount: Option<Decimal>,
}

/// Order-level status for an order list.
#[derive(Debug)]
pub struct OrderSummary {
    /// The order.
    pub order_id: OrderId,

    /// Its aggregated status, or why its details could not be fetched.
    pub status: Result<AggregatedStatus, OrdersApiError>,
}

impl OrderSummary {
    /// The aggregated status, when the details were fetched.
    pub fn aggregated_status(&self) -> Option<AggregatedStatus> {
        self.status.as_ref().ok().copied()
    }
}

/// Aggregate the status of each order.
///
/// An order whose details cannot be fetched carries the fetch failure in
/// place of a status.
pub async fn summarize_orders<A, I>(api: &A, order_ids: I) -> Vec<OrderSummary>
where
    A: OrdersApi + ?Sized,
    I: IntoIterator<Item = OrderId>,
{
    let mut summaries = Vec::new();

    for order_id in order_ids {
        let status = OrderDetails::fetch(api, order_id)
            .await
            .map(|details| details.aggregated_status())
            .inspect_err(|error| warn!(%order_id, error = %error, "order details unavailable"));

        summaries.push(OrderSummary { order_id, status });
    }

    summaries
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;

    Ok(coerce_quantity(&value))
}

fn lenient_optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;

    Ok(match value {
        Value::Null => None,
        Value::String(ref text) if text.trim().is_empty() => None,
        other => Some(coerce_quantity(&other)),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use testresult::TestResult;

    use crate::{cart::NewCartLine, orders::client::MockOrdersApi};

    use super::*;

    fn details(statuses: &[(u64, Option<&str>)]) -> OrderDetails {
        OrderDetails {
            order_id: OrderId::new(1),
            details: statuses
                .iter()
                .map(|(id, status)| OrderDetail {
                    detail_id: Some(DetailId::new(*id)),
                    category: None,
                    label: Some("rib".to_string()),
                    sub_label: None,
                    unit: Some("KG".to_string()),
                    quantity: Decimal::ONE,
                    price: None,
                    amount: None,
                    status: status.map(str::to_string),
                    note: None,
                })
                .collect(),
        }
    }

    #[test]
    fn detail_rows_decode_leniently() -> TestResult {
        let detail: OrderDetail = serde_json::from_value(json!({
            "detail_id": 9,
            "id": 1,
            "type": "beef",
            "label": "rib",
            "sub_label": null,
            "unit": "KG",
            "quantity": "2.50",
            "price": "18000",
            "amount": null,
            "status": "delivered"
        }))?;

        assert_eq!(detail.detail_id, Some(DetailId::new(9)));
        assert_eq!(detail.quantity, Decimal::new(250, 2));
        assert_eq!(detail.price, Some(Decimal::from(18_000)));
        assert_eq!(detail.amount, None);
        assert_eq!(detail.status(), OrderStatus::Delivered);

        Ok(())
    }

    #[test]
    fn receipt_accepts_missing_amount() -> TestResult {
        let receipt: OrderReceipt = serde_json::from_value(json!({
            "ok": true,
            "order_id": 12,
            "total_qty": 5,
            "total_amount": null
        }))?;

        assert_eq!(receipt.order_id, OrderId::new(12));
        assert_eq!(receipt.total_qty, Decimal::from(5));
        assert_eq!(receipt.total_amount, None);

        Ok(())
    }

    #[test]
    fn new_order_omits_line_ids() -> TestResult {
        let line = NewCartLine::new("beef", "rib", 2)
            .with_label("Ribeye")
            .into_line("KG", Timestamp::now());
        let order = NewOrder::from_cart(
            &Identity::Customer {
                id: CustomerId::new(3),
                name: Some("Kim".to_string()),
            },
            &[line],
            Timestamp::now(),
        );

        let json = serde_json::to_value(&order)?;

        assert_eq!(json["customerId"], 3);
        assert_eq!(json["customerName"], "Kim");
        assert_eq!(json["items"][0]["type"], "beef");
        assert_eq!(json["items"][0]["label"], "Ribeye");
        assert_eq!(json["items"][0]["quantity"], json!(2.0));
        assert!(json["items"][0].get("id").is_none(), "line ids stay local");

        Ok(())
    }

    #[test]
    fn detail_maps_onto_a_cart_line() {
        let detail = OrderDetail {
            sub_label: Some("point".to_string()),
            unit: Some(" ".to_string()),
            note: Some(String::new()),
            ..details(&[(1, None)]).details.remove(0)
        };

        let line = NewCartLine::from(&detail);

        assert_eq!(line.item_key, None);
        assert_eq!(line.item_label.as_deref(), Some("rib"));
        assert_eq!(line.sub_item.as_deref(), Some("point"));
        assert_eq!(line.quantity, Decimal::ONE);
        assert_eq!(line.unit, None);
        assert_eq!(line.note, None);
    }

    #[tokio::test]
    async fn update_status_applies_and_reaggregates() -> TestResult {
        let mut order = details(&[(1, Some("PENDING")), (2, Some("DELIVERED"))]);
        let mut api = MockOrdersApi::new();

        api.expect_update_detail_status()
            .withf(|id, status| *id == DetailId::new(1) && *status == OrderStatus::Delivered)
            .times(1)
            .returning(|_, _| Ok(()));

        let status = order
            .update_status(&api, DetailId::new(1), OrderStatus::Delivered)
            .await?;

        assert_eq!(status, AggregatedStatus::Delivered);

        Ok(())
    }

    #[tokio::test]
    async fn update_status_reverts_on_failure() {
        let mut order = details(&[(1, None), (2, Some("DELIVERED"))]);
        let before = order.clone();
        let mut api = MockOrdersApi::new();

        api.expect_update_detail_status()
            .returning(|_, _| Err(OrdersApiError::UnexpectedResponse("500".to_string())));

        let result = order
            .update_status(&api, DetailId::new(1), OrderStatus::Cancelled)
            .await;

        assert!(matches!(result, Err(OrdersApiError::UnexpectedResponse(_))));
        assert_eq!(order, before);
        assert_eq!(order.aggregated_status(), AggregatedStatus::Partial);
    }

    #[tokio::test]
    async fn update_status_rejects_unknown_detail_without_calling_api() {
        let mut order = details(&[(1, None)]);
        let mut api = MockOrdersApi::new();

        api.expect_update_detail_status().never();

        let result = order
            .update_status(&api, DetailId::new(99), OrderStatus::Delivered)
            .await;

        assert!(matches!(
            result,
            Err(OrdersApiError::DetailNotFound(id)) if id == DetailId::new(99)
        ));
    }

    #[tokio::test]
    async fn summaries_report_fetch_failures() {
        let mut api = MockOrdersApi::new();

        api.expect_order_details()
            .withf(|id| *id == OrderId::new(1))
            .returning(|_| Ok(details(&[(1, Some("DELIVERED")), (2, Some("cancelled"))]).details));
        api.expect_order_details()
            .withf(|id| *id == OrderId::new(2))
            .returning(|_| Err(OrdersApiError::UnexpectedResponse("503".to_string())));

        let summaries = summarize_orders(&api, [OrderId::new(1), OrderId::new(2)]).await;

        assert_eq!(summaries.len(), 2);
        assert_eq!(
            summaries.first().and_then(OrderSummary::aggregated_status),
            Some(AggregatedStatus::Partial)
        );

        let failed = summaries.get(1);

        assert_eq!(failed.map(|summary| summary.order_id), Some(OrderId::new(2)));
        assert!(
            matches!(
                failed.map(|summary| &summary.status),
                Some(Err(OrdersApiError::UnexpectedResponse(_)))
            ),
            "a failed fetch is reported, not shown as pending"
        );
    }
}
