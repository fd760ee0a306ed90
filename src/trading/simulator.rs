//! The trading bot
//!
//! Each cycle: read the authoritative balance, stake a bounded fraction,
//! price the stake at market, insert a buy, then insert a sell whose
//! total applies the fixed profit formula. Both balance effects flow
//! through the store's trade-insert delta path; the bot never writes a
//! balance. Cycles are skipped, never queued, when the account is below
//! the activation threshold or the per-trade minimum.

use crate::backend::store::TradeStore;
use crate::config::BotConfig;
use crate::core_types::{ACTIVATION_THRESHOLD_CENTS, Cents, UserId};
use crate::credit::aggregator::{BalanceAggregator, CreditError};
use crate::events::{EventBus, PlatformEvent};
use crate::market::{MarketError, PriceFeed};
use crate::models::{TradeExecution, TradeSide};
use crate::money;
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Credit error: {0}")]
    Credit(#[from] CreditError),
    #[error("Market error: {0}")]
    Market(#[from] MarketError),
    #[error("Store error: {0}")]
    Store(#[from] crate::backend::store::StoreError),
    #[error("Money error: {0}")]
    Money(#[from] money::MoneyError),
}

/// The fixed profit formula, integer-exact:
/// `sell_total = buy_total + round(buy_total * rate_bps / 10_000)`,
/// round-half-up, widened through i128 so large totals cannot overflow
/// the intermediate product.
pub fn apply_profit(buy_total: Cents, rate_bps: u32) -> Cents {
    let profit = ((buy_total as i128) * (rate_bps as i128) + 5_000) / 10_000;
    buy_total + profit as Cents
}

/// Stake for one cycle: `balance * stake_bps / 10_000`, capped.
fn stake_for(balance: Cents, stake_bps: u32, max_stake: Cents) -> Cents {
    let stake = ((balance as i128) * (stake_bps as i128) / 10_000) as Cents;
    stake.min(max_stake)
}

pub struct TradeSimulator {
    trades: Arc<dyn TradeStore>,
    aggregator: BalanceAggregator,
    feed: Arc<dyn PriceFeed>,
    bus: EventBus,
    config: BotConfig,
    user_id: UserId,
}

/// Outcome of one bot cycle, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Buy and sell were written; the sell total is reported
    Traded { buy_cents: Cents, sell_cents: Cents },
    /// Balance below activation threshold or per-trade minimum
    Skipped,
}

impl TradeSimulator {
    pub fn new(
        trades: Arc<dyn TradeStore>,
        aggregator: BalanceAggregator,
        feed: Arc<dyn PriceFeed>,
        bus: EventBus,
        config: BotConfig,
        user_id: UserId,
    ) -> Self {
        Self {
            trades,
            aggregator,
            feed,
            bus,
            config,
            user_id,
        }
    }

    /// Spawn the interval task. Stops cleanly via the returned handle
    /// (shutdown watch), never mid-cycle.
    pub fn spawn(self) -> BotHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        BotHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(user_id = %self.user_id, symbol = %self.config.symbol, "Trading bot started");
        loop {
            let wait = self.cycle_wait();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            match self.run_cycle().await {
                Ok(CycleOutcome::Traded {
                    buy_cents,
                    sell_cents,
                }) => {
                    debug!(user_id = %self.user_id, buy_cents, sell_cents, "Bot cycle traded");
                }
                Ok(CycleOutcome::Skipped) => {
                    debug!(user_id = %self.user_id, "Bot cycle skipped");
                }
                Err(e) => {
                    // Next cycle retries; persistent store errors keep
                    // the balance untouched by construction
                    warn!(user_id = %self.user_id, error = %e, "Bot cycle failed");
                }
            }
        }
        info!(user_id = %self.user_id, "Trading bot stopped");
    }

    /// Cadence with jitter so a fleet of bots does not thunder in step.
    fn cycle_wait(&self) -> Duration {
        let jitter = if self.config.jitter_secs > 0 {
            rand::thread_rng().gen_range(0..=self.config.jitter_secs)
        } else {
            0
        };
        Duration::from_secs(self.config.cadence_secs + jitter)
    }

    /// One buy/sell cycle against the authoritative balance.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, BotError> {
        let balance = self.aggregator.current_balance(self.user_id).await?;
        if balance < ACTIVATION_THRESHOLD_CENTS || balance < self.config.min_trade_cents {
            return Ok(CycleOutcome::Skipped);
        }

        let stake = stake_for(balance, self.config.stake_bps, self.config.max_stake_cents);
        if stake < self.config.min_trade_cents {
            return Ok(CycleOutcome::Skipped);
        }

        let price = self.feed.latest_price(&self.config.symbol).await?;
        if price <= Decimal::ZERO {
            return Err(BotError::Market(MarketError::NoPrice(
                self.config.symbol.clone(),
            )));
        }

        // Quantity derived from the stake; totals stay integer-exact
        let quantity = (money::cents_to_euros(stake) / price).round_dp(8);

        let buy = TradeExecution::new(
            self.user_id,
            &self.config.symbol,
            TradeSide::Buy,
            quantity,
            price,
            stake,
        );
        self.trades.insert(buy).await?;
        self.bus.publish(PlatformEvent::TradeExecuted {
            user_id: self.user_id,
            side: TradeSide::Buy,
            total_cents: stake,
        });

        let sell_total = apply_profit(stake, self.config.profit_rate_bps);
        // Record price implied by the profitable exit
        let sell_price = if quantity > Decimal::ZERO {
            (money::cents_to_euros(sell_total) / quantity).round_dp(2)
        } else {
            price
        };
        let sell = TradeExecution::new(
            self.user_id,
            &self.config.symbol,
            TradeSide::Sell,
            quantity,
            sell_price,
            sell_total,
        );
        self.trades.insert(sell).await?;
        self.bus.publish(PlatformEvent::TradeExecuted {
            user_id: self.user_id,
            side: TradeSide::Sell,
            total_cents: sell_total,
        });

        Ok(CycleOutcome::Traded {
            buy_cents: stake,
            sell_cents: sell_total,
        })
    }
}

/// Running bot. `stop()` for a clean shutdown; dropping aborts.
pub struct BotHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl BotHandle {
    /// Signal the bot to stop after the current cycle.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for BotHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::store::CreditStore;
    use crate::market::sim::SimulatedFeed;

    fn bot_config() -> BotConfig {
        BotConfig {
            symbol: "BTC-EUR".into(),
            cadence_secs: 1,
            jitter_secs: 0,
            min_trade_cents: 1_000,
            stake_bps: 1_000,
            max_stake_cents: 50_000,
            profit_rate_bps: 180,
        }
    }

    fn simulator(backend: &Arc<MemoryBackend>, user_id: UserId) -> TradeSimulator {
        TradeSimulator::new(
            backend.clone(),
            BalanceAggregator::new(backend.clone(), Duration::from_secs(5)),
            Arc::new(SimulatedFeed::new(42)),
            EventBus::default(),
            bot_config(),
            user_id,
        )
    }

    #[test]
    fn test_profit_formula_rounds_half_up() {
        // 10000 * 180bps = 180.00 -> 10180
        assert_eq!(apply_profit(10_000, 180), 10_180);
        // 333 * 180 / 10000 = 5.994 -> 6
        assert_eq!(apply_profit(333, 180), 339);
        // 27 * 180 / 10000 = 0.486 -> 0
        assert_eq!(apply_profit(27, 180), 27);
        // Zero rate: sell equals buy
        assert_eq!(apply_profit(10_000, 0), 10_000);
    }

    #[test]
    fn test_stake_bounded() {
        assert_eq!(stake_for(30_000, 1_000, 50_000), 3_000);
        assert_eq!(stake_for(10_000_000, 1_000, 50_000), 50_000); // cap
    }

    #[tokio::test]
    async fn test_cycle_skips_below_activation() {
        let backend = MemoryBackend::new();
        let user_id = backend.seed_user("a@b.c", "pw");
        backend.apply_delta(user_id, 10_000).await.unwrap();

        let outcome = simulator(&backend, user_id).run_cycle().await.unwrap();
        assert_eq!(outcome, CycleOutcome::Skipped);
        assert!(backend.list_recent(user_id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_writes_buy_sell_and_net_profit() {
        let backend = MemoryBackend::new();
        let user_id = backend.seed_user("a@b.c", "pw");
        backend.apply_delta(user_id, 30_000).await.unwrap();

        let outcome = simulator(&backend, user_id).run_cycle().await.unwrap();
        let CycleOutcome::Traded {
            buy_cents,
            sell_cents,
        } = outcome
        else {
            panic!("expected a trade");
        };
        assert_eq!(buy_cents, 3_000); // 10% of 30000
        assert_eq!(sell_cents, apply_profit(3_000, 180));

        let trades = backend.list_recent(user_id, 10).await.unwrap();
        assert_eq!(trades.len(), 2);

        // Balance moved only through the trade-insert delta path
        let balance = CreditStore::fetch(backend.as_ref(), user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            balance.amount_cents(),
            30_000 - buy_cents + sell_cents
        );
    }

    #[tokio::test]
    async fn test_bot_stops_cleanly() {
        let backend = MemoryBackend::new();
        let user_id = backend.seed_user("a@b.c", "pw");

        let handle = simulator(&backend, user_id).spawn();
        handle.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
    }
}
