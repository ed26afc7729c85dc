//! Scan engine: enumerates venue pairs per symbol, prices each candidate
//! arbitrage, scores it and filters it into the opportunity store. Grounded
//! on `original_source/pkg/engine/arbitrage.go`, with one deliberate
//! correction: the original sorts prices and only enumerates ascending
//! `i<j` pairs, which silently drops the reverse-direction opportunity
//! whenever it is the more profitable one. This engine evaluates both
//! directions for every unordered venue pair.

pub mod store;

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::cache::{Quote, QuoteCache};
use crate::symbol::Symbol;

pub use store::OpportunityStore;

/// Maker/taker fee rates per venue, falling back to a 0.001 taker rate when
/// a venue has no entry, matching the original's `getFeeRate` default.
#[derive(Debug, Clone)]
pub struct FeeSchedule {
    fees: HashMap<String, (f64, f64)>,
}

impl FeeSchedule {
    pub fn new() -> Self {
        Self { fees: HashMap::new() }
    }

    pub fn set(&mut self, venue_id: impl Into<String>, maker_fee_rate: f64, taker_fee_rate: f64) {
        self.fees.insert(venue_id.into(), (maker_fee_rate, taker_fee_rate));
    }

    pub fn taker_fee(&self, venue_id: &str) -> f64 {
        self.fees.get(venue_id).map(|(_, taker)| *taker).unwrap_or(0.001)
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        let mut fees = Self::new();
        fees.set("binance", 0.001, 0.001);
        fees.set("okx", 0.0008, 0.001);
        fees.set("bybit", 0.001, 0.001);
        fees
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub min_profit_rate: f64,
    pub min_profit_amount: f64,
    pub max_risk_score: f64,
    pub opportunity_ttl: Duration,
    pub trading_fees: FeeSchedule,
    pub slippage_rate: f64,
    pub gas_fee: f64,
    /// Notional size (in quote currency) used to size each candidate trade
    /// when estimating revenue and cost. The original engine calls this
    /// field `MinVolume` and uses it the same way — as the hypothetical
    /// trade size, not a per-quote liquidity floor.
    pub trade_notional: f64,
    /// Venues considered low-counterparty-risk for the risk score.
    pub trusted_venues: HashSet<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_profit_rate: 0.005,
            min_profit_amount: 10.0,
            max_risk_score: 50.0,
            opportunity_ttl: Duration::from_secs(5),
            trading_fees: FeeSchedule::default(),
            slippage_rate: 0.001,
            gas_fee: 0.0,
            trade_notional: 1000.0,
            trusted_venues: ["binance".to_string(), "okx".to_string()].into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArbitrageOpportunity {
    pub id: String,
    pub symbol: Symbol,
    pub buy_venue: String,
    pub sell_venue: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub price_diff: f64,
    pub price_diff_rate: f64,
    pub revenue_rate: f64,
    pub est_revenue: f64,
    pub est_cost: f64,
    pub net_profit: f64,
    pub profit_rate: f64,
    pub risk_score: f64,
    pub score: f64,
    pub discovered_at: Instant,
    pub valid_until: Instant,
}

impl ArbitrageOpportunity {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.valid_until
    }
}

pub struct ScanEngine {
    config: EngineConfig,
    sequence: AtomicU64,
}

impl ScanEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Scans every symbol against the quotes currently in `cache`, returning
    /// the filtered, score-sorted set of profitable opportunities.
    pub fn scan(&self, symbols: &[Symbol], cache: &QuoteCache) -> Vec<ArbitrageOpportunity> {
        let mut found = Vec::new();
        for symbol in symbols {
            let quotes: Vec<Quote> = cache.get_all_for_symbol(symbol).into_iter().filter(|q| q.valid).collect();
            for i in 0..quotes.len() {
                for j in (i + 1)..quotes.len() {
                    if let Some(opp) = self.calculate_opportunity(symbol, &quotes[i], &quotes[j]) {
                        found.push(opp);
                    }
                    if let Some(opp) = self.calculate_opportunity(symbol, &quotes[j], &quotes[i]) {
                        found.push(opp);
                    }
                }
            }
        }
        self.filter_and_sort(found)
    }

    fn calculate_opportunity(&self, symbol: &Symbol, buy: &Quote, sell: &Quote) -> Option<ArbitrageOpportunity> {
        if buy.venue_id == sell.venue_id {
            return None;
        }
        let buy_price = buy.ask_price;
        let sell_price = sell.bid_price;
        if buy_price <= 0.0 || sell_price <= 0.0 {
            return None;
        }

        let price_diff = sell_price - buy_price;
        let price_diff_rate = price_diff / buy_price;
        let revenue_rate = price_diff_rate;

        let notional = self.config.trade_notional;
        let est_revenue = price_diff * (notional / buy_price);
        let buy_fee = self.config.trading_fees.taker_fee(&buy.venue_id);
        let sell_fee = self.config.trading_fees.taker_fee(&sell.venue_id);
        let fees = notional * (buy_fee + sell_fee);
        let slippage_cost = notional * self.config.slippage_rate;
        let est_cost = fees + slippage_cost + self.config.gas_fee;
        let net_profit = est_revenue - est_cost;
        if net_profit <= 0.0 {
            return None;
        }
        let profit_rate = net_profit / notional;

        let risk_score = self.calculate_risk_score(price_diff_rate, &buy.venue_id, &sell.venue_id);
        let score = calculate_score(profit_rate, risk_score, revenue_rate);

        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}_{}_{}_{}", symbol, buy.venue_id, sell.venue_id, seq);
        let discovered_at = Instant::now();

        Some(ArbitrageOpportunity {
            id,
            symbol: symbol.clone(),
            buy_venue: buy.venue_id.clone(),
            sell_venue: sell.venue_id.clone(),
            buy_price,
            sell_price,
            price_diff,
            price_diff_rate,
            revenue_rate,
            est_revenue,
            est_cost,
            net_profit,
            profit_rate,
            risk_score,
            score,
            discovered_at,
            valid_until: discovered_at + self.config.opportunity_ttl,
        })
    }

    fn calculate_risk_score(&self, price_diff_rate: f64, buy_venue: &str, sell_venue: &str) -> f64 {
        let mut score = 0.0;
        if price_diff_rate > 0.01 {
            score += 30.0;
        } else if price_diff_rate > 0.005 {
            score += 15.0;
        }
        if !self.config.trusted_venues.contains(buy_venue) {
            score += 20.0;
        }
        if !self.config.trusted_venues.contains(sell_venue) {
            score += 20.0;
        }
        score.clamp(0.0, 100.0)
    }

    fn filter_and_sort(&self, mut opportunities: Vec<ArbitrageOpportunity>) -> Vec<ArbitrageOpportunity> {
        let now = Instant::now();
        opportunities.retain(|o| {
            o.profit_rate >= self.config.min_profit_rate
                && o.net_profit >= self.config.min_profit_amount
                && o.risk_score <= self.config.max_risk_score
                && !o.is_expired(now)
        });
        opportunities.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.net_profit.partial_cmp(&a.net_profit).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| a.id.cmp(&b.id))
        });
        opportunities
    }
}

fn calculate_score(profit_rate: f64, risk_score: f64, revenue_rate: f64) -> f64 {
    const PROFIT_WEIGHT: f64 = 0.6;
    const RISK_WEIGHT: f64 = 0.3;
    const REVENUE_WEIGHT: f64 = 0.1;
    let normalized_profit = profit_rate * 100.0;
    let normalized_risk = 100.0 - risk_score;
    let normalized_revenue = revenue_rate * 100.0;
    normalized_profit * PROFIT_WEIGHT + normalized_risk * RISK_WEIGHT + normalized_revenue * REVENUE_WEIGHT
}
