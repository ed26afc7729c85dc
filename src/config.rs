use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::{EngineConfig, FeeSchedule};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub venues: VenueConfig,
    pub strategy: StrategyConfig,
    pub execution: ExecutionConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueCredentials {
    pub api_key: String,
    pub api_secret: String,
    #[serde(default)]
    pub passphrase: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    pub binance: VenueCredentials,
    pub okx: VenueCredentials,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    pub symbols: Vec<String>,
    pub min_profit_rate: f64,
    pub min_profit_amount: f64,
    pub max_risk_score: f64,
    pub opportunity_ttl_ms: u64,
    #[serde(default)]
    pub trading_fees: Vec<VenueFee>,
    pub slippage_rate: f64,
    pub gas_fee: f64,
    pub trade_notional: f64,
    pub trusted_venues: Vec<String>,
    pub scan_interval_ms: u64,
    pub cache_ttl_ms: u64,
    pub cache_sweep_interval_ms: u64,
}

/// One `[[strategy.trading_fees]]` TOML entry: a venue's maker/taker rates.
/// A venue absent from this list falls back to the engine's default 0.1%
/// taker rate, per spec §3/§6.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueFee {
    pub venue_id: String,
    pub maker_fee_rate: f64,
    pub taker_fee_rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    pub watchdog_ms: u64,
    pub max_queue_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub log_level: String,
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn load_or_default() -> Self {
        Self::load("config.toml").unwrap_or_else(|_| Self::default())
    }

    /// Builds the scan engine's runtime config from the loaded strategy
    /// section, matching `original_source`'s `DefaultEngineConfig` field for
    /// field where the TOML leaves a value unset. A venue with no
    /// `[[strategy.trading_fees]]` entry falls back to the engine's default
    /// 0.1% taker rate (spec §3/§6).
    pub fn engine_config(&self) -> EngineConfig {
        let mut trading_fees = if self.strategy.trading_fees.is_empty() {
            FeeSchedule::default()
        } else {
            FeeSchedule::new()
        };
        for fee in &self.strategy.trading_fees {
            trading_fees.set(fee.venue_id.clone(), fee.maker_fee_rate, fee.taker_fee_rate);
        }
        EngineConfig {
            min_profit_rate: self.strategy.min_profit_rate,
            min_profit_amount: self.strategy.min_profit_amount,
            max_risk_score: self.strategy.max_risk_score,
            opportunity_ttl: Duration::from_millis(self.strategy.opportunity_ttl_ms),
            trading_fees,
            slippage_rate: self.strategy.slippage_rate,
            gas_fee: self.strategy.gas_fee,
            trade_notional: self.strategy.trade_notional,
            trusted_venues: self.strategy.trusted_venues.iter().cloned().collect(),
        }
    }

    pub fn symbols(&self) -> eyre::Result<Vec<crate::symbol::Symbol>> {
        self.strategy
            .symbols
            .iter()
            .map(|s| s.parse().map_err(|e: crate::symbol::SymbolParseError| eyre::eyre!(e)))
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            venues: VenueConfig {
                binance: VenueCredentials {
                    api_key: std::env::var("BINANCE_API_KEY").unwrap_or_default(),
                    api_secret: std::env::var("BINANCE_API_SECRET").unwrap_or_default(),
                    passphrase: String::new(),
                    enabled: true,
                },
                okx: VenueCredentials {
                    api_key: std::env::var("OKX_API_KEY").unwrap_or_default(),
                    api_secret: std::env::var("OKX_API_SECRET").unwrap_or_default(),
                    passphrase: std::env::var("OKX_PASSPHRASE").unwrap_or_default(),
                    enabled: true,
                },
            },
            strategy: StrategyConfig {
                symbols: vec!["BTC/USDT".into(), "ETH/USDT".into()],
                min_profit_rate: 0.005,
                min_profit_amount: 10.0,
                max_risk_score: 50.0,
                opportunity_ttl_ms: 5_000,
                trading_fees: Vec::new(),
                slippage_rate: 0.001,
                gas_fee: 0.0,
                trade_notional: 1000.0,
                trusted_venues: vec!["binance".into(), "okx".into()],
                scan_interval_ms: 500,
                cache_ttl_ms: 3_000,
                cache_sweep_interval_ms: 10_000,
            },
            execution: ExecutionConfig {
                min_workers: 5,
                max_workers: 20,
                watchdog_ms: 30_000,
                max_queue_size: 1000,
            },
            monitoring: MonitoringConfig {
                telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
                telegram_chat_id: std::env::var("TELEGRAM_CHAT_ID").ok(),
                log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
            },
        }
    }
}

/// Venue credentials keyed by venue id, for wiring executors without
/// repeating the `Config` struct's field access at every call site.
pub fn credentials_by_venue(config: &Config) -> HashMap<String, VenueCredentials> {
    let mut map = HashMap::new();
    map.insert("binance".to_string(), config.venues.binance.clone());
    map.insert("okx".to_string(), config.venues.okx.clone());
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_parses_default_symbols() {
        let config = Config::default();
        let symbols = config.symbols().unwrap();
        assert_eq!(symbols.len(), 2);
    }

    #[test]
    fn engine_config_carries_strategy_thresholds() {
        let config = Config::default();
        let engine_config = config.engine_config();
        assert_eq!(engine_config.min_profit_rate, config.strategy.min_profit_rate);
        assert_eq!(engine_config.trusted_venues.len(), 2);
    }

    #[test]
    fn empty_trading_fees_falls_back_to_default_schedule() {
        let config = Config::default();
        let engine_config = config.engine_config();
        assert_eq!(engine_config.trading_fees.taker_fee("binance"), 0.001);
        assert_eq!(engine_config.trading_fees.taker_fee("some-unlisted-venue"), 0.001);
    }

    #[test]
    fn configured_trading_fees_override_unlisted_default() {
        let mut config = Config::default();
        config.strategy.trading_fees = vec![VenueFee {
            venue_id: "okx".to_string(),
            maker_fee_rate: 0.0002,
            taker_fee_rate: 0.0005,
        }];
        let engine_config = config.engine_config();
        assert_eq!(engine_config.trading_fees.taker_fee("okx"), 0.0005);
        assert_eq!(engine_config.trading_fees.taker_fee("binance"), 0.001);
    }
}
