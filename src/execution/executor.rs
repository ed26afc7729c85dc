//! Venue executor contract and order data model. Grounded on
//! `original_source/pkg/execution/executor.go`.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("invalid order request: {0}")]
    Validation(String),
    #[error("venue protocol error: {0}")]
    Protocol(String),
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "market"),
            OrderType::Limit => write!(f, "limit"),
        }
    }
}

/// Mirrors the original's order status string constants exactly, so venue
/// responses map onto this enum without a lossy translation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Canceled,
    Failed,
}

impl OrderStatus {
    pub fn from_venue_str(s: &str) -> Self {
        match s {
            "NEW" | "open" | "live" => OrderStatus::Open,
            "PARTIALLY_FILLED" | "partially_filled" => OrderStatus::PartiallyFilled,
            "FILLED" | "filled" => OrderStatus::Filled,
            "CANCELED" | "CANCELLED" | "canceled" => OrderStatus::Canceled,
            "REJECTED" | "EXPIRED" | "failed" => OrderStatus::Failed,
            _ => OrderStatus::Pending,
        }
    }
}

/// `<venue>:<venue_symbol>:<exchange_order_id>`, the local order id grammar
/// confirmed by `original_source/pkg/execution/binance_executor.go`'s
/// `strings.Split(orderID, ":")` parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalOrderId {
    pub venue: String,
    pub venue_symbol: String,
    pub exchange_order_id: String,
}

impl fmt::Display for LocalOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.venue, self.venue_symbol, self.exchange_order_id)
    }
}

impl FromStr for LocalOrderId {
    type Err = ExecutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            return Err(ExecutorError::Validation(format!("malformed order id {s:?}")));
        }
        Ok(Self {
            venue: parts[0].to_string(),
            venue_symbol: parts[1].to_string(),
            exchange_order_id: parts[2].to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub venue_symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: f64,
    pub amount: f64,
    pub client_order_id: String,
}

#[derive(Debug, Clone)]
pub struct Order {
    pub id: LocalOrderId,
    pub venue: String,
    pub venue_symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: f64,
    pub amount: f64,
    pub filled_amount: f64,
    pub average_price: f64,
    pub fee: f64,
    pub fee_currency: String,
    pub status: OrderStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderBookLevel {
    pub price: f64,
    pub amount: f64,
}

#[derive(Debug, Clone)]
pub struct OrderBook {
    pub venue: String,
    pub venue_symbol: String,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

#[async_trait]
pub trait VenueExecutor: Send + Sync {
    fn venue(&self) -> &str;
    async fn place_order(&self, request: PlaceOrderRequest) -> Result<Order, ExecutorError>;
    async fn cancel_order(&self, order_id: &LocalOrderId) -> Result<(), ExecutorError>;
    async fn query_order(&self, order_id: &LocalOrderId) -> Result<Order, ExecutorError>;
    async fn get_order_book(&self, venue_symbol: &str, depth: usize) -> Result<OrderBook, ExecutorError>;
}

/// Forces `status` to `Filled` when the venue's reported fill already
/// covers the full order amount, regardless of what status string the
/// venue itself declared — some venues lag their own status field behind
/// the fill amount on the same response.
pub(crate) fn consolidate_fill(amount: f64, filled_amount: f64, status: OrderStatus) -> OrderStatus {
    if filled_amount >= amount && amount > 0.0 {
        OrderStatus::Filled
    } else {
        status
    }
}

pub(crate) fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis()
}
