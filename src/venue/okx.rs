//! OKX-style (Type B: dash symbols, e.g. `BTC-USDT`) venue adapter.
//! Grounded on `original_source/pkg/exchange/okx.go`: a single long-lived
//! public websocket connection carries subscription control frames
//! (`{"op":"subscribe","args":[...]}`) over the `tickers` channel, unlike
//! Binance's URL-embedded combined streams.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::cache::Quote;
use crate::symbol::Symbol;
use crate::venue::{
    parse_f64_or_zero, AdapterError, AdapterState, QuoteDispatcher, StateCell, TickerHandler, VenueAdapter,
};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

pub struct OkxAdapter {
    name: String,
    ws_url: String,
    rest_base: String,
    http: reqwest::Client,
    state: Arc<StateCell>,
    subscribed: Arc<Mutex<HashSet<Symbol>>>,
    handler: Arc<Mutex<Option<TickerHandler>>>,
    socket_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    control_tx: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
    dispatcher: Arc<QuoteDispatcher>,
}

impl OkxAdapter {
    pub fn new() -> Self {
        Self::with_bases("wss://ws.okx.com:8443/ws/v5/public", "https://www.okx.com")
    }

    pub fn with_bases(ws_url: impl Into<String>, rest_base: impl Into<String>) -> Self {
        Self {
            name: "okx".to_string(),
            ws_url: ws_url.into(),
            rest_base: rest_base.into(),
            http: reqwest::Client::new(),
            state: Arc::new(StateCell::new(AdapterState::Disconnected)),
            subscribed: Arc::new(Mutex::new(HashSet::new())),
            handler: Arc::new(Mutex::new(None)),
            socket_task: Arc::new(Mutex::new(None)),
            control_tx: Arc::new(Mutex::new(None)),
            dispatcher: Arc::new(QuoteDispatcher::new()),
        }
    }

    /// `BTC/USDT` -> `BTC-USDT`.
    pub fn to_venue_form(symbol: &Symbol) -> String {
        format!("{}-{}", symbol.base(), symbol.quote())
    }

    /// `BTC-USDT` -> `BTC/USDT`.
    pub fn from_venue_form(raw: &str) -> Option<Symbol> {
        let (base, quote) = raw.split_once('-')?;
        Symbol::new(base, quote).ok()
    }

    fn subscribe_frame(symbols: &[Symbol]) -> String {
        let args: Vec<_> = symbols
            .iter()
            .map(|s| json!({"channel": "tickers", "instId": Self::to_venue_form(s)}))
            .collect();
        json!({"op": "subscribe", "args": args}).to_string()
    }

    fn ensure_connected(&self) {
        if !matches!(self.state.get(), AdapterState::Disconnected) {
            return;
        }
        let url = self.ws_url.clone();
        let name = self.name.clone();
        let state = Arc::clone(&self.state);
        let handler = Arc::clone(&self.handler);
        let dispatcher = Arc::clone(&self.dispatcher);
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        *self.control_tx.lock() = Some(tx);
        let task = tokio::spawn(async move {
            state.set(AdapterState::Connecting);
            let (socket, _) = match tokio_tungstenite::connect_async(&url).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(venue = %name, error = %e, "okx websocket connect failed");
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
                        if write.send(Message::Text("ping".to_string())).await.is_err() {
                            break;
                        }
                    }
                    frame = rx.recv() => {
                        match frame {
                            Some(frame) => {
                                if write.send(Message::Text(frame)).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => handle_message(&name, &handler, &dispatcher, &text),
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(venue = %name, error = %e, "okx websocket read error");
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

impl Default for OkxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses and dispatches every item in one push frame. Each quote is
/// enqueued onto its symbol's delivery channel rather than handed to the
/// handler inline, so a slow handler cannot stall this read loop.
fn handle_message(venue: &str, handler: &Mutex<Option<TickerHandler>>, dispatcher: &QuoteDispatcher, text: &str) {
    if text == "pong" {
        return;
    }
    let Ok(envelope) = serde_json::from_str::<PushEnvelope>(text) else {
        debug!(venue, "unparseable okx message, dropping");
        return;
    };
    for item in envelope.data {
        let Some(symbol) = OkxAdapter::from_venue_form(&item.inst_id) else {
            continue;
        };
        let quote = Quote::new(
            venue.to_string(),
            symbol,
            parse_f64_or_zero(&item.bid_px),
            parse_f64_or_zero(&item.ask_px),
            parse_f64_or_zero(&item.last),
            parse_f64_or_zero(&item.vol_24h),
        );
        if let Some(handler) = handler.lock().as_ref() {
            dispatcher.dispatch(quote, handler);
        }
    }
}

#[derive(Debug, Deserialize)]
struct PushEnvelope {
    #[serde(default)]
    data: Vec<TickerPayload>,
}

#[derive(Debug, Deserialize)]
struct TickerPayload {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "bidPx")]
    bid_px: String,
    #[serde(rename = "askPx")]
    ask_px: String,
    last: String,
    #[serde(rename = "vol24h")]
    vol_24h: String,
}

#[derive(Debug, Deserialize)]
struct RestTickerResponse {
    data: Vec<TickerPayload>,
}

#[async_trait]
impl VenueAdapter for OkxAdapter {
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
        *self.control_tx.lock() = None;
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
        self.ensure_connected();
        let frame = Self::subscribe_frame(symbols);
        if let Some(tx) = self.control_tx.lock().as_ref() {
            let _ = tx.send(frame);
        }
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
            "{}/api/v5/market/ticker?instId={}",
            self.rest_base,
            Self::to_venue_form(symbol)
        );
        let resp: RestTickerResponse = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        let item = resp
            .data
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::Transport("empty ticker response".to_string()))?;
        Ok(Quote::new(
            self.name.clone(),
            symbol.clone(),
            parse_f64_or_zero(&item.bid_px),
            parse_f64_or_zero(&item.ask_px),
            parse_f64_or_zero(&item.last),
            parse_f64_or_zero(&item.vol_24h),
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
        let url = format!("{}/api/v5/public/status", self.rest_base);
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
    fn to_venue_form_dashes() {
        let sym: Symbol = "BTC/USDT".parse().unwrap();
        assert_eq!(OkxAdapter::to_venue_form(&sym), "BTC-USDT");
    }

    #[test]
    fn from_venue_form_round_trips() {
        let sym = OkxAdapter::from_venue_form("BTC-USDT").unwrap();
        assert_eq!(sym.base(), "BTC");
        assert_eq!(sym.quote(), "USDT");
    }

    #[test]
    fn from_venue_form_rejects_missing_dash() {
        assert!(OkxAdapter::from_venue_form("BTCUSDT").is_none());
    }

    #[tokio::test]
    async fn connect_then_connect_again_errors() {
        let adapter = OkxAdapter::new();
        adapter.connect().await.unwrap();
        assert!(matches!(adapter.connect().await, Err(AdapterError::AlreadyConnected)));
    }
}
