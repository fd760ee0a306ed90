//! Seeded random-walk price feed for the demo binary and tests.

use super::{MarketError, PriceFeed};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::HashMap;
use std::sync::Mutex;

/// Deterministic under a fixed seed; each `latest_price` call advances
/// the walk one step.
pub struct SimulatedFeed {
    state: Mutex<SimState>,
    /// Max step size per call, in basis points of the current price
    step_bps: u32,
}

struct SimState {
    rng: StdRng,
    prices: HashMap<String, f64>,
}

impl SimulatedFeed {
    pub fn new(seed: u64) -> Self {
        Self {
            state: Mutex::new(SimState {
                rng: StdRng::seed_from_u64(seed),
                prices: HashMap::new(),
            }),
            step_bps: 50,
        }
    }

    /// Pin a starting price for a symbol.
    pub fn set_price(&self, symbol: &str, price: f64) {
        let mut state = self.state.lock().expect("BUG: sim feed lock poisoned");
        state.prices.insert(symbol.to_string(), price);
    }
}

#[async_trait]
impl PriceFeed for SimulatedFeed {
    async fn latest_price(&self, symbol: &str) -> Result<Decimal, MarketError> {
        let mut state = self.state.lock().expect("BUG: sim feed lock poisoned");
        let step_bps = self.step_bps as f64;
        let step = state.rng.gen_range(-step_bps..=step_bps) / 10_000.0;
        let price = state
            .prices
            .entry(symbol.to_string())
            .or_insert(50_000.0);
        *price *= 1.0 + step;
        // Walks never reach zero in practice; the clamp guards the mock
        *price = price.max(0.01);

        Decimal::from_f64(*price)
            .map(|p| p.round_dp(2))
            .ok_or_else(|| MarketError::Feed(format!("non-finite sim price for {}", symbol)))
    }

    fn is_live(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_walk_is_deterministic_under_seed() {
        let a = SimulatedFeed::new(42);
        let b = SimulatedFeed::new(42);
        for _ in 0..10 {
            assert_eq!(
                a.latest_price("BTC-EUR").await.unwrap(),
                b.latest_price("BTC-EUR").await.unwrap()
            );
        }
    }

    #[tokio::test]
    async fn test_prices_stay_positive() {
        let feed = SimulatedFeed::new(7);
        feed.set_price("BTC-EUR", 0.02);
        for _ in 0..100 {
            let price = feed.latest_price("BTC-EUR").await.unwrap();
            assert!(price > Decimal::ZERO);
        }
    }
}
