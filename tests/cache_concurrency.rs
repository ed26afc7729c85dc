//! Scenario 6 from the spec's testable properties: many concurrent writers
//! hammering the same cache key must never produce a torn read, and a TTL
//! set at one instant must be visible through the whole TTL window and gone
//! after it, observed purely through the public `QuoteCache` API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arbx_core::cache::{Quote, QuoteCache};
use arbx_core::symbol::Symbol;

fn btc_usdt() -> Symbol {
    "BTC/USDT".parse().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_writers_never_produce_a_torn_read() {
    let cache = Arc::new(QuoteCache::new(Duration::from_secs(30)));
    let known_values: Vec<f64> = (0..1000).map(|i| i as f64).collect();
    let symbol = btc_usdt();

    let mut writers = Vec::new();
    for _ in 0..10 {
        let cache = Arc::clone(&cache);
        let symbol = symbol.clone();
        let values = known_values.clone();
        writers.push(tokio::spawn(async move {
            for v in values {
                cache.set(Quote::new("binance", symbol.clone(), v, v + 0.5, v, 1.0));
            }
        }));
    }

    let stop = Arc::new(AtomicBool::new(false));
    let reader = {
        let cache = Arc::clone(&cache);
        let symbol = symbol.clone();
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            let mut observations = 0usize;
            while !stop.load(Ordering::Relaxed) {
                if let Some(quote) = cache.get("binance", &symbol) {
                    assert!(quote.bid_price >= 0.0 && quote.bid_price < 1000.0, "torn read: {}", quote.bid_price);
                    observations += 1;
                }
                tokio::task::yield_now().await;
            }
            observations
        })
    };

    for writer in writers {
        writer.await.unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    let observations = reader.await.unwrap();
    assert!(observations > 0, "reader should have observed at least one value");

    let final_value = cache.get("binance", &symbol).unwrap();
    assert_eq!(final_value.bid_price, 999.0);
}

#[tokio::test]
async fn ttl_window_holds_then_expires() {
    let cache = QuoteCache::new(Duration::from_millis(100));
    let symbol = btc_usdt();
    cache.set(Quote::new("binance", symbol.clone(), 100.0, 100.5, 100.2, 10.0));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(cache.get("binance", &symbol).is_some(), "quote should still be live at 50ms of a 100ms TTL");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(cache.get("binance", &symbol).is_none(), "quote should have expired by 150ms of a 100ms TTL");
}

#[test]
fn set_batch_and_get_batch_round_trip_across_symbols() {
    let cache = QuoteCache::new(Duration::from_secs(30));
    let btc = btc_usdt();
    let eth: Symbol = "ETH/USDT".parse().unwrap();
    cache.set_batch(vec![
        Quote::new("binance", btc.clone(), 43000.0, 43010.0, 43005.0, 1.0),
        Quote::new("binance", eth.clone(), 2200.0, 2201.0, 2200.5, 1.0),
    ]);

    let results = cache.get_batch(&[
        ("binance".to_string(), btc.clone()),
        ("binance".to_string(), eth.clone()),
        ("binance".to_string(), "SOL/USDT".parse().unwrap()),
    ]);
    assert!(results[0].is_some());
    assert!(results[1].is_some());
    assert!(results[2].is_none(), "unknown symbol should be silently omitted as None");
}
