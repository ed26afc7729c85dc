//! Binance-style signed REST executor (Scheme A). Grounded on
//! `original_source/pkg/execution/binance_executor.go`: query-string
//! parameters are hex-HMAC-SHA256 signed and sent with an `X-MBX-APIKEY`
//! header.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::form_urlencoded;

use super::executor::{
    consolidate_fill, unix_millis, ExecutorError, LocalOrderId, Order, OrderBook, OrderSide, OrderStatus, OrderType,
    PlaceOrderRequest, VenueExecutor,
};

type HmacSha256 = Hmac<Sha256>;

pub struct BinanceExecutor {
    api_key: String,
    api_secret: String,
    base_url: String,
    http: reqwest::Client,
}

impl BinanceExecutor {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self::with_base_url(api_key, api_secret, "https://api.binance.com")
    }

    pub fn with_base_url(api_key: impl Into<String>, api_secret: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes()).expect("hmac accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn build_query(&self, params: &[(&str, String)]) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in params {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }

    async fn signed_request(&self, method: reqwest::Method, path: &str, mut params: Vec<(&str, String)>) -> Result<serde_json::Value, ExecutorError> {
        let timestamp = unix_millis().to_string();
        params.push(("timestamp", timestamp));
        let query = self.build_query(&params);
        let signature = self.sign(&query);
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        let resp = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExecutorError::Protocol(body));
        }
        resp.json().await.map_err(|e| ExecutorError::Transport(e.to_string()))
    }
}

fn local_order_id(venue_symbol: &str, exchange_order_id: impl ToString) -> LocalOrderId {
    LocalOrderId {
        venue: "binance".to_string(),
        venue_symbol: venue_symbol.to_string(),
        exchange_order_id: exchange_order_id.to_string(),
    }
}

#[async_trait]
impl VenueExecutor for BinanceExecutor {
    fn venue(&self) -> &str {
        "binance"
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
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        let order_type = match request.order_type {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        };
        let mut params = vec![
            ("symbol", request.venue_symbol.clone()),
            ("side", side.to_string()),
            ("type", order_type.to_string()),
            ("quantity", request.amount.to_string()),
            ("newClientOrderId", request.client_order_id.clone()),
        ];
        if matches!(request.order_type, OrderType::Limit) {
            params.push(("timeInForce", "GTC".to_string()));
            params.push(("price", request.price.to_string()));
        }

        let body = self
            .signed_request(reqwest::Method::POST, "/api/v3/order", params)
            .await?;
        let exchange_order_id = body
            .get("orderId")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| ExecutorError::Protocol("missing orderId in response".to_string()))?;
        let status = body
            .get("status")
            .and_then(|v| v.as_str())
            .map(OrderStatus::from_venue_str)
            .unwrap_or(OrderStatus::Pending);

        Ok(Order {
            id: local_order_id(&request.venue_symbol, exchange_order_id),
            venue: "binance".to_string(),
            venue_symbol: request.venue_symbol,
            side: request.side,
            order_type: request.order_type,
            price: request.price,
            amount: request.amount,
            filled_amount: 0.0,
            average_price: 0.0,
            fee: 0.0,
            fee_currency: String::new(),
            status,
            error_message: None,
        })
    }

    async fn cancel_order(&self, order_id: &LocalOrderId) -> Result<(), ExecutorError> {
        let params = vec![
            ("symbol", order_id.venue_symbol.clone()),
            ("orderId", order_id.exchange_order_id.clone()),
        ];
        self.signed_request(reqwest::Method::DELETE, "/api/v3/order", params)
            .await?;
        Ok(())
    }

    async fn query_order(&self, order_id: &LocalOrderId) -> Result<Order, ExecutorError> {
        let params = vec![
            ("symbol", order_id.venue_symbol.clone()),
            ("orderId", order_id.exchange_order_id.clone()),
        ];
        let body = self
            .signed_request(reqwest::Method::GET, "/api/v3/order", params)
            .await?;
        let status = body
            .get("status")
            .and_then(|v| v.as_str())
            .map(OrderStatus::from_venue_str)
            .unwrap_or(OrderStatus::Pending);
        let side = match body.get("side").and_then(|v| v.as_str()) {
            Some("SELL") => OrderSide::Sell,
            _ => OrderSide::Buy,
        };
        let order_type = match body.get("type").and_then(|v| v.as_str()) {
            Some("MARKET") => OrderType::Market,
            _ => OrderType::Limit,
        };
        let amount = body.get("origQty").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or(0.0);
        let filled_amount = body.get("executedQty").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or(0.0);
        let status = consolidate_fill(amount, filled_amount, status);
        Ok(Order {
            id: order_id.clone(),
            venue: "binance".to_string(),
            venue_symbol: order_id.venue_symbol.clone(),
            side,
            order_type,
            price: body.get("price").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or(0.0),
            amount,
            filled_amount,
            average_price: 0.0,
            fee: 0.0,
            fee_currency: String::new(),
            status,
            error_message: None,
        })
    }

    async fn get_order_book(&self, venue_symbol: &str, depth: usize) -> Result<OrderBook, ExecutorError> {
        let url = format!("{}/api/v3/depth?symbol={}&limit={}", self.base_url, venue_symbol, depth.min(1000));
        let resp: serde_json::Value = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        let parse_levels = |key: &str| -> Vec<super::executor::OrderBookLevel> {
            resp.get(key)
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|level| {
                            let level = level.as_array()?;
                            let price = level.first()?.as_str()?.parse().ok()?;
                            let amount = level.get(1)?.as_str()?.parse().ok()?;
                            Some(super::executor::OrderBookLevel { price, amount })
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(OrderBook {
            venue: "binance".to_string(),
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
    fn signature_is_deterministic_hex() {
        let executor = BinanceExecutor::new("key", "secret");
        let a = executor.sign("symbol=BTCUSDT&timestamp=1");
        let b = executor.sign("symbol=BTCUSDT&timestamp=1");
        assert_eq!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn place_order_rejects_non_positive_amount() {
        let executor = BinanceExecutor::new("key", "secret");
        let request = PlaceOrderRequest {
            venue_symbol: "BTCUSDT".to_string(),
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
        let executor = BinanceExecutor::new("key", "secret");
        let request = PlaceOrderRequest {
            venue_symbol: "BTCUSDT".to_string(),
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
        let executor = BinanceExecutor::new("key", "secret");
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
