//! Live trade history
//!
//! Keeps a watch channel holding the user's most recent executions,
//! re-fetched on realtime insert notifications. Unlike the balance
//! feed, this one runs a backup poll ticker alongside the realtime
//! subscription: the history list is pure display state, so a missed
//! event costs nothing but staleness, and the ticker bounds how stale
//! it can get.

use crate::backend::realtime::{ChangeStream, WatchedTable};
use crate::backend::store::TradeStore;
use crate::config::CreditConfig;
use crate::core_types::UserId;
use crate::credit::notifier::{ChangeNotifier, RefreshTrigger};
use crate::events::EventBus;
use crate::models::TradeExecution;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const HISTORY_LIMIT: usize = 50;

pub struct TradeHistoryFeed;

impl TradeHistoryFeed {
    /// Wire a user's history feed. Reuses the credit feed's timing
    /// knobs; the poll interval doubles as the backup ticker period.
    pub fn spawn(
        trades: Arc<dyn TradeStore>,
        changes: Arc<dyn ChangeStream>,
        user_id: UserId,
        config: &CreditConfig,
        bus: EventBus,
    ) -> TradeHistoryHandle {
        let poll = Duration::from_secs(config.poll_interval_secs);
        let (state_tx, state_rx) = watch::channel(Vec::new());
        let (trigger_tx, trigger_rx) = mpsc::channel(16);

        let notifier_task = ChangeNotifier::for_tables(
            changes,
            user_id,
            vec![WatchedTable::TradeSimulations],
            Duration::from_millis(config.debounce_ms),
            poll,
            Some(poll),
            bus,
        )
        .spawn(trigger_tx);

        let worker = HistoryWorker {
            trades,
            user_id,
            state_tx,
        };
        let worker_task = tokio::spawn(worker.run(trigger_rx));

        TradeHistoryHandle {
            state_rx,
            worker_task,
            notifier_task,
        }
    }
}

/// Live handle to a user's trade history. Dropping it tears the feed
/// down.
pub struct TradeHistoryHandle {
    state_rx: watch::Receiver<Vec<TradeExecution>>,
    worker_task: JoinHandle<()>,
    notifier_task: JoinHandle<()>,
}

impl TradeHistoryHandle {
    pub fn state(&self) -> watch::Receiver<Vec<TradeExecution>> {
        self.state_rx.clone()
    }

    /// Snapshot, most recent first.
    pub fn current(&self) -> Vec<TradeExecution> {
        self.state_rx.borrow().clone()
    }

    pub fn shutdown(&self) {
        self.worker_task.abort();
        self.notifier_task.abort();
    }
}

impl Drop for TradeHistoryHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct HistoryWorker {
    trades: Arc<dyn TradeStore>,
    user_id: UserId,
    state_tx: watch::Sender<Vec<TradeExecution>>,
}

impl HistoryWorker {
    async fn run(self, mut trigger_rx: mpsc::Receiver<RefreshTrigger>) {
        self.fetch_and_publish().await;
        while let Some(trigger) = trigger_rx.recv().await {
            debug!(user_id = %self.user_id, ?trigger, "Refreshing trade history");
            self.fetch_and_publish().await;
        }
    }

    async fn fetch_and_publish(&self) {
        match self.trades.list_recent(self.user_id, HISTORY_LIMIT).await {
            Ok(trades) => {
                let _ = self.state_tx.send(trades);
            }
            Err(e) => {
                // Keep the last good list; the next trigger retries
                warn!(user_id = %self.user_id, error = %e, "Trade history fetch failed");
            }
        }
    }
}
