//! Balance view controller
//!
//! Exposes `{ balance, loading }` to presentation code through a watch
//! channel, refreshed automatically from notifier triggers and manually
//! via `refresh()`. Every update replaces the balance atomically (one
//! watch send); consumers never observe partial state.
//!
//! Failure policy (deliberate, see the error taxonomy): an aggregation
//! failure publishes a toast-grade event and falls back to a balance of
//! 0 rather than blocking the UI - under-reporting beats hanging.
//!
//! Cancellation: when the handle is dropped or `shutdown()` runs while a
//! fetch is in flight, that fetch's completion is discarded. The worker
//! checks a liveness flag before every publish, so no update-after-
//! teardown can leak out.

use crate::backend::realtime::ChangeStream;
use crate::backend::store::CreditStore;
use crate::config::CreditConfig;
use crate::core_types::{Cents, UserId};
use crate::credit::aggregator::BalanceAggregator;
use crate::credit::notifier::{ChangeNotifier, RefreshTrigger};
use crate::events::{EventBus, PlatformEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// What the presentation layer sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditState {
    pub balance: Option<Cents>,
    pub loading: bool,
}

impl CreditState {
    fn initial() -> Self {
        Self {
            balance: None,
            loading: true,
        }
    }

    /// Balance to gate on; `None` while still loading.
    pub fn settled_balance(&self) -> Option<Cents> {
        if self.loading { None } else { self.balance }
    }
}

pub struct CreditFeed;

impl CreditFeed {
    /// Wire a user's balance feed: aggregator + notifier + worker task.
    /// Everything torn down by dropping the returned handle.
    pub fn spawn(
        credits: Arc<dyn CreditStore>,
        changes: Arc<dyn ChangeStream>,
        user_id: UserId,
        config: &CreditConfig,
        bus: EventBus,
    ) -> CreditHandle {
        let aggregator = BalanceAggregator::new(
            credits,
            Duration::from_secs(config.fetch_timeout_secs),
        );

        let (state_tx, state_rx) = watch::channel(CreditState::initial());
        let (trigger_tx, trigger_rx) = mpsc::channel(16);
        let (refresh_tx, refresh_rx) = mpsc::channel(4);

        let notifier_task = ChangeNotifier::credit_feed(
            changes,
            user_id,
            Duration::from_millis(config.debounce_ms),
            Duration::from_secs(config.poll_interval_secs),
            bus.clone(),
        )
        .spawn(trigger_tx);

        let alive = Arc::new(AtomicBool::new(true));
        let worker = FeedWorker {
            aggregator,
            user_id,
            state_tx,
            bus,
            alive: alive.clone(),
        };
        let worker_task = tokio::spawn(worker.run(trigger_rx, refresh_rx));

        CreditHandle {
            state_rx,
            refresh_tx,
            alive,
            worker_task,
            notifier_task,
        }
    }
}

/// Live handle to a user's balance feed: observable state plus a manual
/// `refresh()`. Dropping it tears the whole feed down.
pub struct CreditHandle {
    state_rx: watch::Receiver<CreditState>,
    refresh_tx: mpsc::Sender<()>,
    alive: Arc<AtomicBool>,
    worker_task: JoinHandle<()>,
    notifier_task: JoinHandle<()>,
}

impl CreditHandle {
    /// A receiver for observing state changes (`changed().await`).
    pub fn state(&self) -> watch::Receiver<CreditState> {
        self.state_rx.clone()
    }

    /// Snapshot of the current state.
    pub fn current(&self) -> CreditState {
        self.state_rx.borrow().clone()
    }

    /// Request a manual re-fetch. Best-effort: a full queue means a
    /// refresh is already pending, which is the same outcome.
    pub async fn refresh(&self) {
        let _ = self.refresh_tx.try_send(());
    }

    /// Tear the feed down. Any in-flight fetch completion is discarded.
    pub fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.worker_task.abort();
        self.notifier_task.abort();
    }
}

impl Drop for CreditHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct FeedWorker {
    aggregator: BalanceAggregator,
    user_id: UserId,
    state_tx: watch::Sender<CreditState>,
    bus: EventBus,
    alive: Arc<AtomicBool>,
}

impl FeedWorker {
    async fn run(
        self,
        mut trigger_rx: mpsc::Receiver<RefreshTrigger>,
        mut refresh_rx: mpsc::Receiver<()>,
    ) {
        // First aggregation resolves the loading state
        self.fetch_and_publish().await;

        loop {
            tokio::select! {
                trigger = trigger_rx.recv() => {
                    match trigger {
                        Some(t) => {
                            debug!(user_id = %self.user_id, trigger = ?t, "Balance re-fetch");
                            self.fetch_and_publish().await;
                        }
                        None => break, // notifier gone
                    }
                }
                refresh = refresh_rx.recv() => {
                    match refresh {
                        Some(()) => self.fetch_and_publish().await,
                        None => break, // handle gone
                    }
                }
            }
        }
    }

    async fn fetch_and_publish(&self) {
        let result = self.aggregator.current_balance(self.user_id).await;

        // Liveness gate AFTER the await: a fetch resolving past teardown
        // must not mutate observable state
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }

        let state = match result {
            Ok(balance) => {
                self.bus.publish(PlatformEvent::BalanceRefreshed {
                    user_id: self.user_id,
                    balance_cents: balance,
                });
                CreditState {
                    balance: Some(balance),
                    loading: false,
                }
            }
            Err(e) => {
                // Fail-safe default: show 0 instead of blocking the UI
                self.bus.publish(PlatformEvent::CreditError {
                    user_id: self.user_id,
                    message: e.to_string(),
                });
                CreditState {
                    balance: Some(0),
                    loading: false,
                }
            }
        };
        let _ = self.state_tx.send(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::store::StoreError;
    use crate::models::BalanceRecord;
    use async_trait::async_trait;

    fn test_config() -> CreditConfig {
        CreditConfig {
            debounce_ms: 20,
            poll_interval_secs: 60,
            fetch_timeout_secs: 5,
        }
    }

    async fn wait_settled(rx: &mut watch::Receiver<CreditState>) -> CreditState {
        loop {
            let state = rx.borrow().clone();
            if !state.loading {
                return state;
            }
            rx.changed().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_initial_then_settled_state() {
        let backend = MemoryBackend::new();
        let user_id = backend.seed_user("a@b.c", "pw");
        backend.apply_delta(user_id, 27_000).await.unwrap();

        let feed = CreditFeed::spawn(
            backend.clone(),
            backend.clone(),
            user_id,
            &test_config(),
            EventBus::default(),
        );

        let mut rx = feed.state();
        let state = wait_settled(&mut rx).await;
        assert_eq!(state.balance, Some(27_000));
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_zero_with_toast() {
        let backend = MemoryBackend::new();
        let user_id = backend.seed_user("a@b.c", "pw");
        backend.set_credit_ops_failing(true);

        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let feed = CreditFeed::spawn(
            backend.clone(),
            backend.clone(),
            user_id,
            &test_config(),
            bus,
        );

        let mut rx = feed.state();
        let state = wait_settled(&mut rx).await;
        assert_eq!(state.balance, Some(0)); // fail-safe default

        loop {
            match events.recv().await.unwrap() {
                PlatformEvent::CreditError { user_id: id, .. } => {
                    assert_eq!(id, user_id);
                    break;
                }
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_manual_refresh_recovers_from_fault() {
        let backend = MemoryBackend::new();
        let user_id = backend.seed_user("a@b.c", "pw");
        backend.apply_delta(user_id, 10_000).await.unwrap();
        backend.set_credit_ops_failing(true);

        let feed = CreditFeed::spawn(
            backend.clone(),
            backend.clone(),
            user_id,
            &test_config(),
            EventBus::default(),
        );
        let mut rx = feed.state();
        let state = wait_settled(&mut rx).await;
        assert_eq!(state.balance, Some(0));

        // Clearing the fault produces no change event; the manual
        // refresh is the only trigger here (poll is a minute away)
        backend.set_credit_ops_failing(false);
        feed.refresh().await;

        loop {
            rx.changed().await.unwrap();
            if rx.borrow().balance == Some(10_000) {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_notification_replaces_balance() {
        let backend = MemoryBackend::new();
        let user_id = backend.seed_user("a@b.c", "pw");

        let feed = CreditFeed::spawn(
            backend.clone(),
            backend.clone(),
            user_id,
            &test_config(),
            EventBus::default(),
        );
        let mut rx = feed.state();
        wait_settled(&mut rx).await;

        backend.apply_delta(user_id, 30_000).await.unwrap();

        // Eventually consistent: wait for the post-event re-fetch
        loop {
            rx.changed().await.unwrap();
            if rx.borrow().balance == Some(30_000) {
                break;
            }
        }
    }

    /// Delays every read so teardown can land mid-flight.
    struct SlowCreditStore {
        inner: Arc<MemoryBackend>,
        delay: Duration,
    }

    #[async_trait]
    impl CreditStore for SlowCreditStore {
        async fn fetch(&self, user_id: UserId) -> Result<Option<BalanceRecord>, StoreError> {
            tokio::time::sleep(self.delay).await;
            CreditStore::fetch(self.inner.as_ref(), user_id).await
        }

        async fn init_zero(&self, user_id: UserId) -> Result<bool, StoreError> {
            CreditStore::init_zero(self.inner.as_ref(), user_id).await
        }

        async fn apply_delta(
            &self,
            user_id: UserId,
            delta_cents: Cents,
        ) -> Result<BalanceRecord, StoreError> {
            self.inner.apply_delta(user_id, delta_cents).await
        }
    }

    #[tokio::test]
    async fn test_teardown_discards_in_flight_fetch() {
        let backend = MemoryBackend::new();
        let user_id = backend.seed_user("a@b.c", "pw");
        backend.apply_delta(user_id, 10_000).await.unwrap();

        let slow = Arc::new(SlowCreditStore {
            inner: backend.clone(),
            delay: Duration::from_millis(100),
        });
        let feed = CreditFeed::spawn(
            slow,
            backend.clone(),
            user_id,
            &test_config(),
            EventBus::default(),
        );
        let rx = feed.state();

        // Tear down while the initial fetch is still sleeping
        tokio::time::sleep(Duration::from_millis(20)).await;
        feed.shutdown();

        // Give the in-flight fetch time to resolve, then assert nothing
        // observable changed
        tokio::time::sleep(Duration::from_millis(200)).await;
        let state = rx.borrow().clone();
        assert_eq!(state, CreditState::initial());
    }
}
