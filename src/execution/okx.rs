//! OKX-style signed REST executor (Scheme B). Grounded on
//! `original_source/pkg/execution/okx_executor.go`: the sign string is
//! `timestamp + method + "/api/v5" + path (+ "?" + query for GET) + body`,
//! HMAC-SHA256'd and base64-encoded, sent via four `OK-ACCESS-*` headers.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use super::executor::{
    consolidate_fill, ExecutorError, LocalOrderId, Order, OrderBook, OrderBookLevel, OrderSide, OrderStatus,
    OrderType, PlaceOrderRequest, VenueExecutor,
};

type HmacSha256 = Hmac<Sha256>;

const API_V5_PREFIX: &str = "/api/v5";

pub struct OkxExecutor {
    api_key: String,
    api_secret: String,
    passphrase: String,
    base_url: String,
    http: reqwest::Client,
}

impl OkxExecutor {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self::with_base_url(api_key, api_secret, passphrase, "https://www.okx.com")
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        passphrase: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            passphrase: passphrase.into(),
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    fn iso_timestamp() -> String {
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    }

    fn sign(&self, sign_string: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes()).expect("hmac accepts any key length");
        mac.update(sign_string.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    async fn signed_request(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &str,
        body: &str,
    ) -> Result<serde_json::Value, ExecutorError> {
        let timestamp = Self::iso_timestamp();
        let path_with_query = if query.is_empty() {
            path.to_string()
        } else {
            format!("{path}?{query}")
        };
        let sign_string = format!("{}{}{}{}{}", timestamp, method.as_str(), API_V5_PREFIX, path_with_query, body);
        let signature = self.sign(&sign_string);

        let url = format!("{}{}{}", self.base_url, API_V5_PREFIX, path_with_query);
        let mut request = self
            .http
            .request(method, &url)
            .header("OK-ACCESS-KEY", &self.api_key)
            .header("OK-ACCESS-SIGN", signature)
            .header("OK-ACCESS-TIMESTAMP", timestamp)
            .header("OK-ACCESS-PASSPHRASE", &self.passphrase);
        if !body.is_empty() {
            request = request.header("Content-Type", "application/json").body(body.to_string());
        }

        let resp = request.send().await.map_err(|e| ExecutorError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ExecutorError::Protocol(text));
        }
        resp.json().await.map_err(|e| ExecutorError::Transport(e.to_string()))
    }
}

fn local_order_id(venue_symbol: &str, exchange_order_id: impl ToString) -> LocalOrderId {
    LocalOrderId {
        venue: "okx".to_string(),
        venue_symbol: venue_symbol.to_string(),
        exchange_order_id: exchange_order_id.to_string(),
    }
}

fn first_data_item(body: &serde_json::Value) -> Result<&serde_json::Value, ExecutorError> {
    body.get("data")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| ExecutorError::Protocol("empty data array in response".to_string()))
}

#[async_trait]
impl VenueExecutor for OkxExecutor {
    fn venue(&self) -> &str {
        "okx"
    }

    async fn place_order(&self, request: PlaceOrderRequest) -> Result<Order, ExecutorError> {
        if request.amount <= 0.0 {
            return Err(ExecutorError::Validation("amount must be positive".to_string()));
        }
        if request.venue_symbol.trim().is_empty() {
            return Err(ExecutorError::Validation("venue_symbol must not be blank".to_string()));
        }
        if matches!(request.order_type, OrderType::Limit) && request.price <= 0.0 {
            return Err(ExecutorError::Validation("price must be positive for a limit order".to_string()));
        }
        let side = match request.side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        };
        let ord_type = match request.order_type {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
        };
        let mut payload = json!({
            "instId": request.venue_symbol,
            "tdMode": "cash",
            "side": side,
            "ordType": ord_type,
            "sz": request.amount.to_string(),
            "clOrdId": request.client_order_id,
        });
        if matches!(request.order_type, OrderType::Limit) {
            payload["px"] = json!(request.price.to_string());
        }
        let body = payload.to_string();

        let resp = self
            .signed_request(reqwest::Method::POST, "/trade/order", "", &body)
            .await?;
        let item = first_data_item(&resp)?;
        let exchange_order_id = item
            .get("ordId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ExecutorError::Protocol("missing ordId in response".to_string()))?
            .to_string();

        Ok(Order {
            id: local_order_id(&request.venue_symbol, exchange_order_id),
            venue: "okx".to_string(),
            venue_symbol: request.venue_symbol,
            side: request.side,
            order_type: request.order_type,
            price: request.price,
            amount: request.amount,
            filled_amount: 0.0,
            average_price: 0.0,
            fee: 0.0,
            fee_currency: String::new(),
            status: OrderStatus::Pending,
            error_message: None,
        })
    }

    async fn cancel_order(&self, order_id: &LocalOrderId) -> Result<(), ExecutorError> {
        let body = json!({
            "instId": order_id.venue_symbol,
            "ordId": order_id.exchange_order_id,
        })
        .to_string();
        self.signed_request(reqwest::Method::POST, "/trade/cancel-order", "", &body)
            .await?;
        Ok(())
    }

    async fn query_order(&self, order_id: &LocalOrderId) -> Result<Order, ExecutorError> {
        let query = format!("instId={}&ordId={}", order_id.venue_symbol, order_id.exchange_order_id);
        let resp = self
            .signed_request(reqwest::Method::GET, "/trade/order", &query, "")
            .await?;
        let item = first_data_item(&resp)?;
        let status = item
            .get("state")
            .and_then(|v| v.as_str())
            .map(OrderStatus::from_venue_str)
            .unwrap_or(OrderStatus::Pending);
        let side = match item.get("side").and_then(|v| v.as_str()) {
            Some("sell") => OrderSide::Sell,
            _ => OrderSide::Buy,
        };
        let order_type = match item.get("ordType").and_then(|v| v.as_str()) {
            Some("market") => OrderType::Market,
            _ => OrderType::Limit,
        };
        let amount = item.get("sz").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or(0.0);
        let filled_amount = item.get("accFillSz").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or(0.0);
        let status = consolidate_fill(amount, filled_amount, status);
        Ok(Order {
            id: order_id.clone(),
            venue: "okx".to_string(),
            venue_symbol: order_id.venue_symbol.clone(),
            side,
            order_type,
            price: item.get("px").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or(0.0),
            amount,
            filled_amount,
            average_price: item.get("avgPx").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or(0.0),
            fee: 0.0,
            fee_currency: String::new(),
            status,
            error_message: None,
        })
    }

    async fn get_order_book(&self, venue_symbol: &str, depth: usize) -> Result<OrderBook, ExecutorError> {
        let url = format!(
            "{}{}/market/books?instId={}&sz={}",
            self.base_url,
            API_V5_PREFIX,
            venue_symbol,
            depth.min(400)
        );
        let resp: serde_json::Value = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        let item = first_data_item(&resp)?;
        let parse_levels = |key: &str| -> Vec<OrderBookLevel> {
            item.get(key)
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|level| {
                            let level = level.as_array()?;
                            let price = level.first()?.as_str()?.parse().ok()?;
                            let amount = level.get(1)?.as_str()?.parse().ok()?;
                            Some(OrderBookLevel { price, amount })
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(OrderBook {
            venue: "okx".to_string(),
            venue_symbol: venue_symbol.to_string(),
            bids: parse_levels("bids"),
            asks: parse_levels("asks"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_base64() {
        let executor = OkxExecutor::new("key", "secret", "pass");
        let a = executor.sign("2024-01-01T00:00:00.000ZGET/api/v5/trade/order");
        let b = executor.sign("2024-01-01T00:00:00.000ZGET/api/v5/trade/order");
        assert_eq!(a, b);
        assert!(BASE64.decode(&a).is_ok());
    }

    #[tokio::test]
    async fn place_order_rejects_non_positive_amount() {
        let executor = OkxExecutor::new("key", "secret", "pass");
        let request = PlaceOrderRequest {
            venue_symbol: "BTC-USDT".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            price: 0.0,
            amount: 0.0,
            client_order_id: "c1".to_string(),
        };
        assert!(executor.place_order(request).await.is_err());
    }

    #[tokio::test]
    async fn place_order_rejects_non_positive_price_on_limit_order() {
        let executor = OkxExecutor::new("key", "secret", "pass");
        let request = PlaceOrderRequest {
            venue_symbol: "BTC-USDT".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            price: 0.0,
            amount: 1.0,
            client_order_id: "c1".to_string(),
        };
        assert!(executor.place_order(request).await.is_err());
    }

    #[tokio::test]
    async fn place_order_rejects_blank_venue_symbol() {
        let executor = OkxExecutor::new("key", "secret", "pass");
        let request = PlaceOrderRequest {
            venue_symbol: "  ".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            price: 0.0,
            amount: 1.0,
            client_order_id: "c1".to_string(),
        };
        assert!(executor.place_order(request).await.is_err());
    }
}
