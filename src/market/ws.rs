//! Websocket ticker client with REST snapshot fallback
//!
//! Connects, reads `{"symbol": "...", "price": "..."}` ticks into a
//! price cache, reconnects with exponential backoff on failure. While
//! disconnected, a REST snapshot refreshes the cache so `latest_price`
//! keeps serving slightly-stale values instead of failing.

use super::{MarketError, PriceFeed};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// One price tick on the wire.
#[derive(Deserialize)]
struct Tick {
    symbol: String,
    /// Price as string, exchange convention
    price: String,
}

pub struct WsTicker {
    ws_url: String,
    rest_snapshot_url: String,
    max_backoff: Duration,
    prices: DashMap<String, Decimal>,
    connected: AtomicBool,
    http: reqwest::Client,
}

impl WsTicker {
    pub fn new(ws_url: &str, rest_snapshot_url: &str, max_backoff: Duration) -> Arc<Self> {
        Arc::new(Self {
            ws_url: ws_url.to_string(),
            rest_snapshot_url: rest_snapshot_url.to_string(),
            max_backoff,
            prices: DashMap::new(),
            connected: AtomicBool::new(false),
            http: reqwest::Client::new(),
        })
    }

    /// Main run loop - connects, reads ticks, reconnects on failure.
    /// Spawn this; it never returns.
    pub async fn run(self: Arc<Self>) {
        let mut backoff = Duration::from_secs(1);

        loop {
            info!(url = %self.ws_url, "Connecting to ticker WS");
            match connect_async(&self.ws_url).await {
                Ok((ws_stream, _response)) => {
                    self.connected.store(true, Ordering::Relaxed);
                    backoff = Duration::from_secs(1);
                    info!("Ticker WS connected");

                    let (_write, mut read) = ws_stream.split();
                    while let Some(msg) = read.next().await {
                        match msg {
                            Ok(Message::Text(text)) => self.handle_tick(&text),
                            Ok(Message::Ping(_)) => {
                                // tungstenite auto-responds with pong
                            }
                            Ok(Message::Close(_)) => {
                                warn!("Ticker WS closed by server");
                                break;
                            }
                            Err(e) => {
                                warn!(error = %e, "Ticker WS error");
                                break;
                            }
                            _ => {}
                        }
                    }
                    self.connected.store(false, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(error = %e, backoff_secs = backoff.as_secs(), "Ticker WS connect failed");
                }
            }

            // Disconnected: refresh the cache over REST so consumers
            // keep getting (stale-ish) prices
            if let Err(e) = self.rest_snapshot().await {
                debug!(error = %e, "REST snapshot failed");
            }

            sleep(backoff).await;
            backoff = (backoff * 2).min(self.max_backoff);
        }
    }

    fn handle_tick(&self, text: &str) {
        let tick: Tick = match serde_json::from_str(text) {
            Ok(t) => t,
            Err(_) => return, // not a tick frame
        };
        match Decimal::from_str(&tick.price) {
            Ok(price) if price > Decimal::ZERO => {
                self.prices.insert(tick.symbol, price);
            }
            _ => debug!(symbol = %tick.symbol, raw = %tick.price, "Unparseable tick price"),
        }
    }

    async fn rest_snapshot(&self) -> Result<(), MarketError> {
        if self.rest_snapshot_url.is_empty() {
            return Ok(());
        }
        let ticks: Vec<Tick> = self
            .http
            .get(&self.rest_snapshot_url)
            .send()
            .await
            .map_err(|e| MarketError::Feed(e.to_string()))?
            .json()
            .await
            .map_err(|e| MarketError::Feed(e.to_string()))?;
        for tick in ticks {
            if let Ok(price) = Decimal::from_str(&tick.price) {
                if price > Decimal::ZERO {
                    self.prices.insert(tick.symbol, price);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PriceFeed for WsTicker {
    async fn latest_price(&self, symbol: &str) -> Result<Decimal, MarketError> {
        self.prices
            .get(symbol)
            .map(|entry| *entry.value())
            .ok_or_else(|| MarketError::NoPrice(symbol.to_string()))
    }

    fn is_live(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_serves_after_tick() {
        let ticker = WsTicker::new("ws://unused", "", Duration::from_secs(1));
        ticker.handle_tick(r#"{"symbol":"BTC-EUR","price":"41234.56"}"#);

        let price = ticker.latest_price("BTC-EUR").await.unwrap();
        assert_eq!(price, Decimal::from_str("41234.56").unwrap());
        assert!(!ticker.is_live()); // never connected, cache still serves
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_no_price() {
        let ticker = WsTicker::new("ws://unused", "", Duration::from_secs(1));
        let err = ticker.latest_price("ETH-EUR").await.unwrap_err();
        assert!(matches!(err, MarketError::NoPrice(_)));
    }

    #[tokio::test]
    async fn test_garbage_frames_ignored() {
        let ticker = WsTicker::new("ws://unused", "", Duration::from_secs(1));
        ticker.handle_tick("not json");
        ticker.handle_tick(r#"{"symbol":"BTC-EUR","price":"-5"}"#);
        assert!(ticker.latest_price("BTC-EUR").await.is_err());
    }
}
