//! Order API client.

use async_trait::async_trait;
use mockall::automock;
use reqwest::{Client, Response};
use serde::{
    Deserialize,
    de::{DeserializeOwned, IgnoredAny},
};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::{
    config::ApiConfig,
    orders::{
        errors::OrdersApiError,
        models::{DetailId, NewOrder, OrderDetail, OrderId, OrderReceipt},
        status::OrderStatus,
    },
};

/// The external order store.
#[automock]
#[async_trait]
pub trait OrdersApi: Send + Sync {
    /// Submit a new order.
    async fn submit_order(&self, order: &NewOrder) -> Result<OrderReceipt, OrdersApiError>;

    /// Fetch the lines of an order.
    async fn order_details(&self, order_id: OrderId) -> Result<Vec<OrderDetail>, OrdersApiError>;

    /// Change the status of one order line.
    async fn update_detail_status(
        &self,
        detail_id: DetailId,
        status: OrderStatus,
    ) -> Result<(), OrdersApiError>;
}

/// REST client for the order API.
#[derive(Debug, Clone)]
pub struct HttpOrdersApi {
    base_url: String,
    http: Client,
}

impl HttpOrdersApi {
    /// Create a client for the configured API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, OrdersApiError> {
        let http = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            base_url: config.base_url().to_string(),
            http,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    #[serde(default)]
    details: Vec<OrderDetail>,
}

#[async_trait]
impl OrdersApi for HttpOrdersApi {
    async fn submit_order(&self, order: &NewOrder) -> Result<OrderReceipt, OrdersApiError> {
        let url = format!("{}/api/orders", self.base_url);

        let response = self.http.post(&url).json(order).send().await?;
        let receipt: OrderReceipt = read_body(response, "submit order").await?;

        info!(order_id = %receipt.order_id, lines = order.items.len(), "order submitted");

        Ok(receipt)
    }

    async fn order_details(&self, order_id: OrderId) -> Result<Vec<OrderDetail>, OrdersApiError> {
        let url = format!("{}/api/orders/{order_id}/details", self.base_url);

        let response = self.http.get(&url).send().await?;
        let parsed: DetailsResponse = read_body(response, "order details").await?;

        Ok(parsed.details)
    }

    async fn update_detail_status(
        &self,
        detail_id: DetailId,
        status: OrderStatus,
    ) -> Result<(), OrdersApiError> {
        let url = format!("{}/api/orders/details/{detail_id}/status", self.base_url);

        let body = json!({ "status": status });

        let response = self.http.put(&url).json(&body).send().await?;
        read_body::<IgnoredAny>(response, "update detail status").await?;

        Ok(())
    }
}

/// Check the status and `ok` flag of an API response and decode its body.
async fn read_body<T: DeserializeOwned>(
    response: Response,
    request: &str,
) -> Result<T, OrdersApiError> {
    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        error!(request, %status, "order API request failed");

        return Err(OrdersApiError::UnexpectedResponse(format!(
            "{request} request failed with status {status}: {text}"
        )));
    }

    let body: Value = response.json().await?;

    decode_body(body, request)
}

fn decode_body<T: DeserializeOwned>(body: Value, request: &str) -> Result<T, OrdersApiError> {
    if body.get("ok").and_then(Value::as_bool) == Some(false) {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(request)
            .to_string();

        error!(request, reason = %message, "order API rejected request");

        return Err(OrdersApiError::Rejected(message));
    }

    serde_json::from_value(body).map_err(OrdersApiError::Decode)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use testresult::TestResult;

    use super::*;

    #[test]
    fn rejected_bodies_surface_their_message() {
        let result: Result<OrderReceipt, _> = decode_body(
            json!({ "ok": false, "message": "items are empty" }),
            "submit order",
        );

        assert!(matches!(
            result,
            Err(OrdersApiError::Rejected(message)) if message == "items are empty"
        ));
    }

    #[test]
    fn accepted_bodies_decode() -> TestResult {
        let receipt: OrderReceipt = decode_body(
            json!({ "ok": true, "order_id": 4, "total_qty": 5.5, "total_amount": 99000 }),
            "submit order",
        )?;

        assert_eq!(receipt.order_id, OrderId::new(4));
        assert_eq!(receipt.total_qty, Decimal::new(55, 1));
        assert_eq!(receipt.total_amount, Some(Decimal::from(99_000)));

        Ok(())
    }

    #[test]
    fn malformed_bodies_are_decode_errors() {
        let result: Result<OrderReceipt, _> = decode_body(json!({ "ok": true }), "submit order");

        assert!(matches!(result, Err(OrdersApiError::Decode(_))));
    }

    #[test]
    fn details_default_to_empty() -> TestResult {
        let parsed: DetailsResponse = decode_body(json!({ "ok": true }), "order details")?;

        assert!(parsed.details.is_empty());

        Ok(())
    }

    #[test]
    fn client_builds_from_config() -> TestResult {
        let config = ApiConfig {
            api_base_url: "http://localhost:3001/".to_string(),
            request_timeout_seconds: 5,
        };

        let api = HttpOrdersApi::new(&config)?;

        assert_eq!(api.base_url, "http://localhost:3001");

        Ok(())
    }
}
