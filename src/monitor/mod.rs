//! Run statistics and alerting. Grounded on the teacher's `Monitor`: an
//! `RwLock`-guarded stats snapshot plus a best-effort Telegram webhook,
//! generalized away from `ethers`/wei-denominated DEX profit to the
//! arbitrage-domain `ArbitrageOpportunity` and `ExecutionResult` types.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::engine::ArbitrageOpportunity;
use crate::execution::{ExecutionResult, ExecutionStatus};

#[derive(Debug, Clone)]
pub struct Stats {
    pub opportunities_found: u64,
    pub executions_submitted: u64,
    pub executions_confirmed: u64,
    pub executions_failed: u64,
    pub executions_canceled: u64,
    pub total_profit: f64,
    pub start_time: Instant,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            opportunities_found: 0,
            executions_submitted: 0,
            executions_confirmed: 0,
            executions_failed: 0,
            executions_canceled: 0,
            total_profit: 0.0,
            start_time: Instant::now(),
        }
    }
}

/// Tracks run-wide arbitrage stats and optionally forwards notable events
/// to a Telegram chat, kept as the ambient "alerting" concern the way the
/// teacher wires it through a bare `reqwest::Client`.
pub struct Monitor {
    stats: RwLock<Stats>,
    telegram_bot_token: Option<String>,
    telegram_chat_id: Option<String>,
    http_client: reqwest::Client,
}

impl Monitor {
    pub fn new(telegram_bot_token: Option<String>, telegram_chat_id: Option<String>) -> Self {
        Self {
            stats: RwLock::new(Stats::default()),
            telegram_bot_token,
            telegram_chat_id,
            http_client: reqwest::Client::new(),
        }
    }

    pub async fn record_opportunity(&self, opportunity: &ArbitrageOpportunity) {
        let mut stats = self.stats.write().await;
        stats.opportunities_found += 1;
        info!(
            opportunity_id = %opportunity.id,
            symbol = %opportunity.symbol,
            buy_venue = %opportunity.buy_venue,
            sell_venue = %opportunity.sell_venue,
            net_profit = opportunity.net_profit,
            score = opportunity.score,
            "arbitrage opportunity found"
        );
    }

    pub async fn record_execution(&self, result: &ExecutionResult) {
        let mut stats = self.stats.write().await;
        stats.executions_submitted += 1;

        match result.status {
            ExecutionStatus::Completed => {
                stats.executions_confirmed += 1;
                stats.total_profit += result.actual_profit;
                let msg = format!(
                    "execution confirmed: {} {} -> {} profit={:.4} total={:.4}",
                    result.symbol, result.buy_venue, result.sell_venue, result.actual_profit, stats.total_profit
                );
                info!("{}", msg);
                drop(stats);
                self.send_telegram(&msg).await;
            }
            ExecutionStatus::Canceled => {
                stats.executions_canceled += 1;
                warn!(task_id = result.task_id, "execution canceled");
            }
            ExecutionStatus::Failed => {
                stats.executions_failed += 1;
                let msg = format!(
                    "execution failed: {} {} -> {} reason={}",
                    result.symbol,
                    result.buy_venue,
                    result.sell_venue,
                    result.error_message.as_deref().unwrap_or("unknown")
                );
                warn!("{}", msg);
                drop(stats);
                self.send_telegram(&msg).await;
            }
            ExecutionStatus::Pending | ExecutionStatus::Executing => {}
        }
    }

    pub async fn get_stats(&self) -> Stats {
        self.stats.read().await.clone()
    }

    pub async fn log_summary(&self) {
        let stats = self.stats.read().await;
        let uptime = stats.start_time.elapsed().as_secs();
        let hours = uptime / 3600;
        let minutes = (uptime % 3600) / 60;
        let win_rate = if stats.executions_submitted > 0 {
            (stats.executions_confirmed as f64 / stats.executions_submitted as f64) * 100.0
        } else {
            0.0
        };

        info!("═══════════════════════════════════════════");
        info!("ARBITRAGE BOT STATISTICS");
        info!("═══════════════════════════════════════════");
        info!("Uptime:               {}h {}m", hours, minutes);
        info!("Opportunities found:  {}", stats.opportunities_found);
        info!("Executions submitted: {}", stats.executions_submitted);
        info!("Executions confirmed: {}", stats.executions_confirmed);
        info!("Executions failed:    {}", stats.executions_failed);
        info!("Executions canceled:  {}", stats.executions_canceled);
        info!("Win rate:             {:.1}%", win_rate);
        info!("Total profit:         {:.4}", stats.total_profit);
        info!("═══════════════════════════════════════════");
    }

    async fn send_telegram(&self, message: &str) {
        if let (Some(token), Some(chat_id)) = (&self.telegram_bot_token, &self.telegram_chat_id) {
            let url = format!("https://api.telegram.org/bot{}/sendMessage", token);
            let params = serde_json::json!({
                "chat_id": chat_id,
                "text": message,
                "parse_mode": "HTML",
            });
            if let Err(e) = self.http_client.post(&url).json(&params).send().await {
                warn!("failed to send telegram alert: {:?}", e);
            }
        }
    }

    pub async fn send_alert(&self, message: &str) {
        info!("ALERT: {}", message);
        self.send_telegram(&format!("ALERT: {}", message)).await;
    }

    pub async fn send_startup_message(&self) {
        let msg = "arbitrage bot started, monitoring for opportunities";
        info!("{}", msg);
        self.send_telegram(msg).await;
    }
}

pub type SharedMonitor = Arc<Monitor>;
