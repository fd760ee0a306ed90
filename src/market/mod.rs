//! Market data feeds
//!
//! The third-party market data feed is an external collaborator: the
//! trading bot only needs `latest_price` for its symbol. Two
//! implementations ship: a websocket ticker with REST snapshot fallback
//! ([`ws`]) and a seeded random-walk feed ([`sim`]) for the demo binary
//! and tests.

pub mod sim;
pub mod ws;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("No price available for {0}")]
    NoPrice(String),
    #[error("Feed error: {0}")]
    Feed(String),
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Latest known price for a symbol, in euros.
    async fn latest_price(&self, symbol: &str) -> Result<Decimal, MarketError>;

    /// Is the feed currently receiving live data? A false here only
    /// degrades freshness; cached prices keep serving.
    fn is_live(&self) -> bool;
}
