//! Adapter registry: owns every configured venue adapter and fans its quotes
//! into the shared cache. Grounded on the wiring pattern in
//! `original_source/cmd/monitor/main.go` (multiple adapters feeding one
//! cache) and the teacher's `rpc::client::RpcLoadBalancer` for the
//! parallel-connect-and-track-health shape, generalized into an explicit,
//! dependency-injected type rather than a global (REDESIGN FLAGS item 2).

use std::sync::Arc;

use tracing::{error, info};

use crate::cache::QuoteCache;
use crate::symbol::Symbol;
use crate::venue::VenueAdapter;

pub struct AdapterRegistry {
    cache: Arc<QuoteCache>,
    adapters: Vec<Arc<dyn VenueAdapter>>,
}

impl AdapterRegistry {
    pub fn new(cache: Arc<QuoteCache>) -> Self {
        Self {
            cache,
            adapters: Vec::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn VenueAdapter>) {
        self.adapters.push(adapter);
    }

    pub fn venues(&self) -> impl Iterator<Item = &str> {
        self.adapters.iter().map(|a| a.name())
    }

    /// Connects every adapter and subscribes each to `symbols`, writing
    /// every normalized quote into the shared cache. A single adapter's
    /// connect failure is logged and does not prevent the others from
    /// starting.
    pub async fn start_all(&self, symbols: &[Symbol]) {
        let futures = self.adapters.iter().map(|adapter| {
            let adapter = Arc::clone(adapter);
            let cache = Arc::clone(&self.cache);
            let symbols = symbols.to_vec();
            async move {
                if let Err(e) = adapter.connect().await {
                    error!(venue = adapter.name(), error = %e, "failed to connect venue adapter");
                    return;
                }
                let handler_cache = Arc::clone(&cache);
                let handler: Arc<dyn Fn(crate::cache::Quote) + Send + Sync> =
                    Arc::new(move |quote| handler_cache.set(quote));
                if let Err(e) = adapter.subscribe_ticker(&symbols, handler).await {
                    error!(venue = adapter.name(), error = %e, "failed to subscribe venue adapter");
                    return;
                }
                info!(venue = adapter.name(), symbols = symbols.len(), "venue adapter streaming");
            }
        });
        futures::future::join_all(futures).await;
    }

    pub async fn stop_all(&self) {
        for adapter in &self.adapters {
            if let Err(e) = adapter.disconnect().await {
                error!(venue = adapter.name(), error = %e, "failed to disconnect venue adapter");
            }
        }
    }

    /// REST-probes every adapter; returns the subset of venue names that
    /// failed to respond.
    pub async fn health_check(&self) -> Vec<String> {
        let mut unhealthy = Vec::new();
        for adapter in &self.adapters {
            if adapter.ping().await.is_err() {
                unhealthy.push(adapter.name().to_string());
            }
        }
        unhealthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::binance::BinanceAdapter;
    use std::time::Duration;

    #[tokio::test]
    async fn register_tracks_venue_names() {
        let cache = Arc::new(QuoteCache::new(Duration::from_secs(5)));
        let mut registry = AdapterRegistry::new(cache);
        registry.register(Arc::new(BinanceAdapter::new()));
        let names: Vec<&str> = registry.venues().collect();
        assert_eq!(names, vec!["binance"]);
    }
}
