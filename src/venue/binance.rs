//! Binance-style (Type A: concatenated symbols, e.g. `BTCUSDT`) venue
//! adapter. Grounded on `original_source/pkg/exchange/binance.go`: a
//! combined-stream websocket URL carries every subscribed symbol's
//! `<symbol>@ticker` stream, and the adapter redials that URL whenever the
//! subscription set changes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::cache::Quote;
use crate::symbol::Symbol;
use crate::venue::{
    parse_f64_or_zero, AdapterError, AdapterState, QuoteDispatcher, StateCell, TickerHandler, VenueAdapter,
};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

pub struct BinanceAdapter {
    name: String,
    ws_base: String,
    rest_base: String,
    http: reqwest::Client,
    state: Arc<StateCell>,
    subscribed: Arc<Mutex<HashSet<Symbol>>>,
    handler: Arc<Mutex<Option<TickerHandler>>>,
    socket_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    dispatcher: Arc<QuoteDispatcher>,
}

impl BinanceAdapter {
    pub fn new() -> Self {
        Self::with_bases("wss://stream.binance.com:9443", "https://api.binance.com")
    }

    pub fn with_bases(ws_base: impl Into<String>, rest_base: impl Into<String>) -> Self {
        Self {
            name: "binance".to_string(),
            ws_base: ws_base.into(),
            rest_base: rest_base.into(),
            http: reqwest::Client::new(),
            state: Arc::new(StateCell::new(AdapterState::Disconnected)),
            subscribed: Arc::new(Mutex::new(HashSet::new())),
            handler: Arc::new(Mutex::new(None)),
            socket_task: Arc::new(Mutex::new(None)),
            dispatcher: Arc::new(QuoteDispatcher::new()),
        }
    }

    /// `BTC/USDT` -> `btcusdt` (stream names are lowercase).
    pub fn to_venue_form(symbol: &Symbol) -> String {
        format!("{}{}", symbol.base(), symbol.quote()).to_lowercase()
    }

    /// `btcusdt` -> `BTC/USDT`. Binance symbols have no separator, so this
    /// relies on the quote currency being one of a small known set, the same
    /// heuristic the original's `formatBinanceSymbol` uses (longest known
    /// quote suffix wins).
    pub fn from_venue_form(raw: &str) -> Option<Symbol> {
        const QUOTES: &[&str] = &["USDT", "BUSD", "USDC", "BTC", "ETH", "BNB"];
        let upper = raw.to_uppercase();
        for quote in QUOTES {
            if let Some(base) = upper.strip_suffix(quote) {
                if !base.is_empty() {
                    return Symbol::new(base, *quote).ok();
                }
            }
        }
        None
    }

    fn combined_stream_url(&self, symbols: &[Symbol]) -> String {
        let streams: Vec<String> = symbols
            .iter()
            .map(|s| format!("{}@ticker", Self::to_venue_form(s)))
            .collect();
        format!("{}/stream?streams={}", self.ws_base, streams.join("/"))
    }

    fn reconnect_stream(&self) {
        let symbols: Vec<Symbol> = self.subscribed.lock().iter().cloned().collect();
        if symbols.is_empty() {
            return;
        }
        if let Some(old) = self.socket_task.lock().take() {
            old.abort();
        }
        let url = self.combined_stream_url(&symbols);
        let name = self.name.clone();
        let state = Arc::clone(&self.state);
        let handler = Arc::clone(&self.handler);
        let dispatcher = Arc::clone(&self.dispatcher);
        let task = tokio::spawn(async move {
            state.set(AdapterState::Connecting);
            let (socket, _) = match tokio_tungstenite::connect_async(&url).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(venue = %name, error = %e, "binance websocket connect failed");
                    state.set(AdapterState::Disconnected);
                    return;
                }
            };
            state.set(AdapterState::Streaming);
            let (mut write, mut read) = socket.split();
            let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
            loop {
                tokio::select! {
                    _ = keepalive.tick() => {
                        if write.send(Message::Ping(Vec::new())).await.is_err() {
                            break;
                        }
                    }
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => handle_message(&name, &handler, &dispatcher, &text),
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(venue = %name, error = %e, "binance websocket read error");
                                break;
                            }
                        }
                    }
                }
            }
            state.set(AdapterState::Disconnected);
        });
        *self.socket_task.lock() = Some(task);
    }
}

impl Default for BinanceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses and dispatches one text frame. Dispatch is fire-and-forget onto
/// the per-symbol delivery channel — this function never awaits the
/// handler, so a slow handler cannot stall the read loop above it.
fn handle_message(venue: &str, handler: &Mutex<Option<TickerHandler>>, dispatcher: &QuoteDispatcher, text: &str) {
    let Ok(envelope) = serde_json::from_str::<StreamEnvelope>(text) else {
        debug!(venue, "unparseable binance message, dropping");
        return;
    };
    let Some(symbol) = BinanceAdapter::from_venue_form(&envelope.data.symbol) else {
        return;
    };
    let quote = Quote::new(
        venue.to_string(),
        symbol,
        parse_f64_or_zero(&envelope.data.best_bid),
        parse_f64_or_zero(&envelope.data.best_ask),
        parse_f64_or_zero(&envelope.data.last_price),
        parse_f64_or_zero(&envelope.data.volume),
    );
    if let Some(handler) = handler.lock().as_ref() {
        dispatcher.dispatch(quote, handler);
    }
}

#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    #[allow(dead_code)]
    stream: Option<String>,
    data: TickerPayload,
}

#[derive(Debug, Deserialize)]
struct TickerPayload {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "b")]
    best_bid: String,
    #[serde(rename = "a")]
    best_ask: String,
    #[serde(rename = "c")]
    last_price: String,
    #[serde(rename = "v")]
    volume: String,
}

#[derive(Debug, Deserialize)]
struct RestTicker {
    #[allow(dead_code)]
    symbol: String,
    price: String,
    #[serde(rename = "bidPrice")]
    bid_price: String,
    #[serde(rename = "askPrice")]
    ask_price: String,
}

#[async_trait]
impl VenueAdapter for BinanceAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), AdapterError> {
        if self.state.get() != AdapterState::Disconnected {
            return Err(AdapterError::AlreadyConnected);
        }
        self.state.set(AdapterState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        if let Some(task) = self.socket_task.lock().take() {
            task.abort();
        }
        self.state.set(AdapterState::Disconnected);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !matches!(self.state.get(), AdapterState::Disconnected)
    }

    fn state(&self) -> AdapterState {
        self.state.get()
    }

    async fn subscribe_ticker(&self, symbols: &[Symbol], handler: TickerHandler) -> Result<(), AdapterError> {
        *self.handler.lock() = Some(handler);
        {
            let mut subscribed = self.subscribed.lock();
            subscribed.extend(symbols.iter().cloned());
        }
        self.reconnect_stream();
        Ok(())
    }

    async fn unsubscribe_ticker(&self, symbols: &[Symbol]) -> Result<(), AdapterError> {
        let mut subscribed = self.subscribed.lock();
        for symbol in symbols {
            subscribed.remove(symbol);
        }
        Ok(())
    }

    async fn get_ticker(&self, symbol: &Symbol) -> Result<Quote, AdapterError> {
        let url = format!(
            "{}/api/v3/ticker/price?symbol={}",
            self.rest_base,
            Self::to_venue_form(symbol).to_uppercase()
        );
        let resp: RestTicker = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        Ok(Quote::new(
            self.name.clone(),
            symbol.clone(),
            parse_f64_or_zero(&resp.bid_price),
            parse_f64_or_zero(&resp.ask_price),
            parse_f64_or_zero(&resp.price),
            0.0,
        ))
    }

    async fn get_tickers(&self, symbols: &[Symbol]) -> Result<Vec<Quote>, AdapterError> {
        let mut out = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            out.push(self.get_ticker(symbol).await?);
        }
        Ok(out)
    }

    async fn ping(&self) -> Result<(), AdapterError> {
        let url = format!("{}/api/v3/ping", self.rest_base);
        self.http
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_venue_form_lowercases_and_concatenates() {
        let sym: Symbol = "BTC/USDT".parse().unwrap();
        assert_eq!(BinanceAdapter::to_venue_form(&sym), "btcusdt");
    }

    #[test]
    fn from_venue_form_round_trips_known_quotes() {
        let sym = BinanceAdapter::from_venue_form("BTCUSDT").unwrap();
        assert_eq!(sym.base(), "BTC");
        assert_eq!(sym.quote(), "USDT");
    }

    #[test]
    fn from_venue_form_rejects_unknown_quote() {
        assert!(BinanceAdapter::from_venue_form("XYZZY").is_none());
    }

    #[tokio::test]
    async fn connect_then_connect_again_errors() {
        let adapter = BinanceAdapter::new();
        adapter.connect().await.unwrap();
        assert!(matches!(adapter.connect().await, Err(AdapterError::AlreadyConnected)));
    }
}
