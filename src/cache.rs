//! Freshness-bounded quote cache shared by every venue adapter and read by
//! the scan engine. Ported from the teacher's `DashMap`-backed price cache,
//! generalized from `(token, venue)` keys to `(venue_id, symbol)` keys and
//! given a per-entry TTL with lazy expiry plus a background sweeper, the way
//! the original Go `MemoryPriceCache` does.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::symbol::Symbol;

/// A single top-of-book quote observed from one venue.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub venue_id: String,
    pub symbol: Symbol,
    pub bid_price: f64,
    pub ask_price: f64,
    pub last_price: f64,
    pub volume_24h: f64,
    pub observed_at: Instant,
    /// False when the venue reported a crossed book (bid > ask); the quote
    /// is still stored (callers may want to observe it) but the engine must
    /// skip it when scanning.
    pub valid: bool,
}

impl Quote {
    pub fn new(
        venue_id: impl Into<String>,
        symbol: Symbol,
        bid_price: f64,
        ask_price: f64,
        last_price: f64,
        volume_24h: f64,
    ) -> Self {
        let valid = bid_price > 0.0 && ask_price > 0.0 && bid_price <= ask_price;
        Self {
            venue_id: venue_id.into(),
            symbol,
            bid_price,
            ask_price,
            last_price,
            volume_24h,
            observed_at: Instant::now(),
            valid,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    quote: Quote,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

type CacheKey = (String, Symbol);

/// Concurrent, TTL-bounded quote cache keyed by `(venue_id, symbol)`.
pub struct QuoteCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    update_count: AtomicU64,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            update_count: AtomicU64::new(0),
        }
    }

    pub fn set(&self, quote: Quote) {
        let key = (quote.venue_id.clone(), quote.symbol.clone());
        let entry = CacheEntry {
            expires_at: quote.observed_at + self.ttl,
            quote,
        };
        self.entries.insert(key, entry);
        self.update_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_batch(&self, quotes: impl IntoIterator<Item = Quote>) {
        for quote in quotes {
            self.set(quote);
        }
    }

    /// Lazily expires the entry on read: a stale entry is removed and `None`
    /// is returned rather than serving a quote older than the TTL.
    pub fn get(&self, venue_id: &str, symbol: &Symbol) -> Option<Quote> {
        let key = (venue_id.to_string(), symbol.clone());
        let now = Instant::now();
        match self.entries.get(&key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.quote.clone()),
            Some(_) => {
                drop(self.entries.remove(&key));
                None
            }
            None => None,
        }
    }

    pub fn get_batch(&self, keys: &[(String, Symbol)]) -> Vec<Option<Quote>> {
        keys.iter().map(|(v, s)| self.get(v, s)).collect()
    }

    /// Returns every live quote under `venue_id`, per spec §4.1's
    /// `get_all(venue)` contract.
    pub fn get_all(&self, venue_id: &str) -> Vec<Quote> {
        let now = Instant::now();
        let mut stale = Vec::new();
        let mut out = Vec::new();
        for entry in self.entries.iter() {
            let (venue, _) = entry.key();
            if venue != venue_id {
                continue;
            }
            if entry.value().is_expired(now) {
                stale.push(entry.key().clone());
            } else {
                out.push(entry.value().quote.clone());
            }
        }
        for key in stale {
            self.entries.remove(&key);
        }
        out
    }

    /// Returns every live quote for `symbol` across all venues. Not part of
    /// the spec's cache contract (§4.1's `get_all` is venue-keyed); this
    /// exists purely so the scan engine can gather a symbol's quotes across
    /// venues without scanning the cache itself.
    pub fn get_all_for_symbol(&self, symbol: &Symbol) -> Vec<Quote> {
        let now = Instant::now();
        let mut stale = Vec::new();
        let mut out = Vec::new();
        for entry in self.entries.iter() {
            let (_, sym) = entry.key();
            if sym != symbol {
                continue;
            }
            if entry.value().is_expired(now) {
                stale.push(entry.key().clone());
            } else {
                out.push(entry.value().quote.clone());
            }
        }
        for key in stale {
            self.entries.remove(&key);
        }
        out
    }

    /// Removes every entry belonging to `venue_id`, mirroring the original
    /// cache's `ClearExchange` prefix-delete.
    pub fn clear_venue(&self, venue_id: &str) {
        self.entries.retain(|(v, _), _| v != venue_id);
    }

    pub fn update_count(&self) -> u64 {
        self.update_count.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawns a background task that sweeps expired entries on a fixed
    /// interval, so memory does not grow unboundedly from venues that have
    /// gone quiet. Unlike the teacher's cleanup task, the first tick is not
    /// skipped: there is no reason to delay the first sweep.
    pub fn spawn_eviction_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let before = cache.entries.len();
                cache.entries.retain(|_, entry| !entry.is_expired(now));
                let removed = before - cache.entries.len();
                if removed > 0 {
                    debug!(removed, remaining = cache.entries.len(), "swept expired quotes");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym() -> Symbol {
        "BTC/USDT".parse().unwrap()
    }

    #[test]
    fn set_then_get_roundtrips() {
        let cache = QuoteCache::new(Duration::from_secs(5));
        let quote = Quote::new("binance", sym(), 100.0, 100.5, 100.2, 10.0);
        cache.set(quote.clone());
        let fetched = cache.get("binance", &sym()).unwrap();
        assert_eq!(fetched.bid_price, quote.bid_price);
        assert_eq!(cache.update_count(), 1);
    }

    #[test]
    fn missing_key_returns_none() {
        let cache = QuoteCache::new(Duration::from_secs(5));
        assert!(cache.get("binance", &sym()).is_none());
    }

    #[test]
    fn expired_entry_is_evicted_lazily() {
        let cache = QuoteCache::new(Duration::from_millis(1));
        cache.set(Quote::new("binance", sym(), 100.0, 100.5, 100.2, 10.0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("binance", &sym()).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn crossed_book_is_flagged_invalid_but_stored() {
        let cache = QuoteCache::new(Duration::from_secs(5));
        cache.set(Quote::new("binance", sym(), 101.0, 100.0, 100.5, 10.0));
        let fetched = cache.get("binance", &sym()).unwrap();
        assert!(!fetched.valid);
    }

    #[test]
    fn clear_venue_only_removes_that_venue() {
        let cache = QuoteCache::new(Duration::from_secs(5));
        cache.set(Quote::new("binance", sym(), 100.0, 100.5, 100.2, 10.0));
        cache.set(Quote::new("okx", sym(), 99.0, 99.5, 99.2, 10.0));
        cache.clear_venue("binance");
        assert!(cache.get("binance", &sym()).is_none());
        assert!(cache.get("okx", &sym()).is_some());
    }

    #[test]
    fn get_all_returns_one_entry_per_symbol_under_that_venue() {
        let cache = QuoteCache::new(Duration::from_secs(5));
        let eth: Symbol = "ETH/USDT".parse().unwrap();
        cache.set(Quote::new("binance", sym(), 100.0, 100.5, 100.2, 10.0));
        cache.set(Quote::new("binance", eth, 2200.0, 2201.0, 2200.5, 10.0));
        cache.set(Quote::new("okx", sym(), 99.0, 99.5, 99.2, 10.0));
        let all = cache.get_all("binance");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn get_all_is_unaffected_by_other_venues() {
        let cache = QuoteCache::new(Duration::from_secs(5));
        cache.set(Quote::new("binance", sym(), 100.0, 100.5, 100.2, 10.0));
        cache.set(Quote::new("okx", sym(), 99.0, 99.5, 99.2, 10.0));
        cache.clear_venue("binance");
        assert!(cache.get_all("binance").is_empty());
        assert_eq!(cache.get_all("okx").len(), 1);
    }

    #[test]
    fn get_all_for_symbol_returns_one_entry_per_venue() {
        let cache = QuoteCache::new(Duration::from_secs(5));
        cache.set(Quote::new("binance", sym(), 100.0, 100.5, 100.2, 10.0));
        cache.set(Quote::new("okx", sym(), 99.0, 99.5, 99.2, 10.0));
        let all = cache.get_all_for_symbol(&sym());
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn sweeper_removes_stale_entries_in_background() {
        let cache = Arc::new(QuoteCache::new(Duration::from_millis(5)));
        cache.set(Quote::new("binance", sym(), 100.0, 100.5, 100.2, 10.0));
        let handle = cache.spawn_eviction_sweeper(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.len(), 0);
        handle.abort();
    }
}
