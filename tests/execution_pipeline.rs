//! Scan engine output fed into the execution worker pool end-to-end: a
//! scanned opportunity is submitted, the settlement-free dispatch path
//! validates its venue executor wiring (without ever placing an order), and
//! the pool's stats invariant (`total_executed == success + failed +
//! canceled`) holds throughout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arbx_core::cache::{Quote, QuoteCache};
use arbx_core::engine::{EngineConfig, FeeSchedule, ScanEngine};
use arbx_core::execution::executor::{
    ExecutorError, LocalOrderId, Order, OrderBook, PlaceOrderRequest, VenueExecutor,
};
use arbx_core::execution::pool::{ExecutionStatus, WorkerPool};
use arbx_core::symbol::Symbol;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A venue executor stand-in that never talks to a real REST endpoint; it
/// only counts how many times each hook was invoked so the test can assert
/// the pool's settlement-free wiring reaches it without ever calling
/// `place_order`.
struct RecordingExecutor {
    venue: String,
    order_book_calls: AtomicUsize,
    place_order_calls: AtomicUsize,
}

impl RecordingExecutor {
    fn new(venue: &str) -> Self {
        Self {
            venue: venue.to_string(),
            order_book_calls: AtomicUsize::new(0),
            place_order_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VenueExecutor for RecordingExecutor {
    fn venue(&self) -> &str {
        &self.venue
    }

    async fn place_order(&self, _request: PlaceOrderRequest) -> Result<Order, ExecutorError> {
        self.place_order_calls.fetch_add(1, Ordering::SeqCst);
        Err(ExecutorError::Protocol("not implemented in test double".to_string()))
    }

    async fn cancel_order(&self, _order_id: &LocalOrderId) -> Result<(), ExecutorError> {
        Ok(())
    }

    async fn query_order(&self, _order_id: &LocalOrderId) -> Result<Order, ExecutorError> {
        Err(ExecutorError::Protocol("not implemented in test double".to_string()))
    }

    async fn get_order_book(&self, _venue_symbol: &str, _depth: usize) -> Result<OrderBook, ExecutorError> {
        self.order_book_calls.fetch_add(1, Ordering::SeqCst);
        Ok(OrderBook {
            venue: self.venue.clone(),
            venue_symbol: _venue_symbol.to_string(),
            bids: vec![],
            asks: vec![],
        })
    }
}

fn default_fees() -> FeeSchedule {
    let mut fees = FeeSchedule::new();
    fees.set("binance", 0.001, 0.001);
    fees.set("okx", 0.001, 0.001);
    fees
}

#[tokio::test]
async fn scanned_opportunity_executes_settlement_free_and_touches_both_executors() {
    let symbol: Symbol = "BTC/USDT".parse().unwrap();
    let cache = QuoteCache::new(Duration::from_secs(30));
    cache.set(Quote::new("binance", symbol.clone(), 43000.0, 43010.0, 43005.0, 1_000_000.0));
    cache.set(Quote::new("okx", symbol.clone(), 44000.0, 44010.0, 44005.0, 1_000_000.0));

    let engine = ScanEngine::new(EngineConfig {
        trading_fees: default_fees(),
        ..EngineConfig::default()
    });
    let opportunities = engine.scan(&[symbol], &cache);
    assert_eq!(opportunities.len(), 1);
    let opportunity = opportunities[0].clone();

    let binance_executor = Arc::new(RecordingExecutor::new("binance"));
    let okx_executor = Arc::new(RecordingExecutor::new("okx"));
    let mut executors: HashMap<String, Arc<dyn VenueExecutor>> = HashMap::new();
    executors.insert("binance".to_string(), binance_executor.clone());
    executors.insert("okx".to_string(), okx_executor.clone());

    let pool = Arc::new(WorkerPool::new(4).with_executors(executors));
    pool.start();
    let pool_for_loop = Arc::clone(&pool);
    let dispatch_handle = tokio::spawn(async move { pool_for_loop.run_dispatch_loop().await });

    let result = pool
        .execute(opportunity.clone(), 1000.0, CancellationToken::new())
        .await
        .expect("execution should complete");

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.actual_profit, opportunity.net_profit);

    assert!(binance_executor.order_book_calls.load(Ordering::SeqCst) >= 1);
    assert!(okx_executor.order_book_calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(binance_executor.place_order_calls.load(Ordering::SeqCst), 0, "settlement-free: no order is placed");
    assert_eq!(okx_executor.place_order_calls.load(Ordering::SeqCst), 0, "settlement-free: no order is placed");

    let stats = pool.status();
    assert_eq!(stats.total_executed, stats.total_success + stats.total_failed + stats.total_canceled);
    assert_eq!(stats.total_success, 1);
    assert!(stats.total_profit > 0.0);

    dispatch_handle.abort();
}

#[test]
fn local_order_id_round_trips_through_display_and_parse() {
    let id = LocalOrderId {
        venue: "binance".to_string(),
        venue_symbol: "BTCUSDT".to_string(),
        exchange_order_id: "998877".to_string(),
    };
    let rendered = id.to_string();
    let parsed: LocalOrderId = rendered.parse().unwrap();
    assert_eq!(parsed, id);
}
