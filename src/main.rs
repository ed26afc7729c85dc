// Use mimalloc for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use arbx_core::cache::QuoteCache;
use arbx_core::config::{self, credentials_by_venue, Config};
use arbx_core::engine::{OpportunityStore, ScanEngine};
use arbx_core::execution::pool::WorkerPool;
use arbx_core::execution::{binance::BinanceExecutor, executor::VenueExecutor, okx::OkxExecutor};
use arbx_core::monitor::Monitor;
use arbx_core::registry::AdapterRegistry;
use arbx_core::scheduler::ScanScheduler;
use arbx_core::venue::{binance::BinanceAdapter, okx::OkxAdapter};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenv::dotenv().ok();

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("═══════════════════════════════════════════");
    info!("    CROSS-VENUE ARBITRAGE SCANNER v0.1.0");
    info!("═══════════════════════════════════════════");

    let config = Config::load_or_default();
    let symbols = config.symbols()?;

    info!("Configuration loaded");
    info!("  Symbols: {}", config.strategy.symbols.join(", "));
    info!("  Min profit rate: {}", config.strategy.min_profit_rate);
    info!("  Scan interval: {}ms", config.strategy.scan_interval_ms);

    let cache = Arc::new(QuoteCache::new(Duration::from_millis(config.strategy.cache_ttl_ms)));
    let _sweeper = cache.spawn_eviction_sweeper(Duration::from_millis(config.strategy.cache_sweep_interval_ms));

    let mut registry = AdapterRegistry::new(Arc::clone(&cache));
    let credentials = credentials_by_venue(&config);
    if credentials.get("binance").map(|c| c.enabled).unwrap_or(false) {
        registry.register(Arc::new(BinanceAdapter::new()));
    }
    if credentials.get("okx").map(|c| c.enabled).unwrap_or(false) {
        registry.register(Arc::new(OkxAdapter::new()));
    }
    let registry = Arc::new(registry);

    info!("Connecting venue adapters: {}", registry.venues().collect::<Vec<_>>().join(", "));
    registry.start_all(&symbols).await;

    let engine = Arc::new(ScanEngine::new(config.engine_config()));
    let store = Arc::new(OpportunityStore::new());

    let executors: HashMap<String, Arc<dyn VenueExecutor>> = build_executors(&credentials);

    let pool = Arc::new(
        WorkerPool::with_min_workers(config.execution.min_workers, config.execution.max_workers)
            .with_watchdog(Duration::from_millis(config.execution.watchdog_ms))
            .with_executors(executors),
    );
    pool.start();
    let dispatch_handle = tokio::spawn(Arc::clone(&pool).run_dispatch_loop());

    let monitor = Arc::new(Monitor::new(
        config.monitoring.telegram_bot_token.clone(),
        config.monitoring.telegram_chat_id.clone(),
    ));
    monitor.send_startup_message().await;

    let scheduler = Arc::new(ScanScheduler::new(
        Arc::clone(&engine),
        Arc::clone(&cache),
        Arc::clone(&store),
        Arc::clone(&pool),
        Arc::clone(&monitor),
        symbols.clone(),
        Duration::from_millis(config.strategy.scan_interval_ms),
    ));

    let cancellation = CancellationToken::new();
    let scheduler_for_run = Arc::clone(&scheduler);
    let scheduler_cancellation = cancellation.clone();
    let scheduler_handle = tokio::spawn(async move { scheduler_for_run.run(scheduler_cancellation).await });

    let registry_for_health = Arc::clone(&registry);
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            let unhealthy = registry_for_health.health_check().await;
            if !unhealthy.is_empty() {
                warn!(venues = ?unhealthy, "venue health check failed");
            }
        }
    });

    let monitor_for_summary = Arc::clone(&monitor);
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(300));
        loop {
            ticker.tick().await;
            monitor_for_summary.log_summary().await;
        }
    });

    info!("═══════════════════════════════════════════");
    info!("Scan scheduler started — listening for opportunities");
    info!("═══════════════════════════════════════════");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    cancellation.cancel();
    scheduler_handle.abort();
    dispatch_handle.abort();
    pool.stop();
    registry.stop_all().await;
    monitor.log_summary().await;

    Ok(())
}

/// Builds the venue executor map from configured credentials, used purely
/// to validate the execution pool's dispatch wiring (§4.5's
/// settlement-free contract never places a real order through these).
fn build_executors(credentials: &HashMap<String, config::VenueCredentials>) -> HashMap<String, Arc<dyn VenueExecutor>> {
    let mut executors: HashMap<String, Arc<dyn VenueExecutor>> = HashMap::new();
    if let Some(creds) = credentials.get("binance") {
        if creds.enabled {
            executors.insert(
                "binance".to_string(),
                Arc::new(BinanceExecutor::new(creds.api_key.clone(), creds.api_secret.clone())),
            );
        }
    }
    if let Some(creds) = credentials.get("okx") {
        if creds.enabled {
            executors.insert(
                "okx".to_string(),
                Arc::new(OkxExecutor::new(
                    creds.api_key.clone(),
                    creds.api_secret.clone(),
                    creds.passphrase.clone(),
                )),
            );
        }
    }
    executors
}
