//! Change notifier integration - the "resilient subscription"
//!
//! Converts the backend's push-based row-change stream into re-fetch
//! triggers. A trigger means "re-read authoritative state", nothing more:
//! events carry no values, arrive in no guaranteed order, and are
//! delivered at least once. Bursts within the debounce window coalesce
//! into one trigger.
//!
//! One capability, two modes (and automatic demotion between them):
//! - realtime: subscriptions on the watched tables, debounced
//! - polling: periodic triggers, either as an always-on backup
//!   (`force_poll`) or as the fallback the notifier demotes itself to
//!   when the realtime channel cannot be established or drops mid-stream
//!
//! A broken websocket therefore degrades freshness, never correctness.
//!
//! The credit feed watches three per-user sources: `user_credits` (all
//! kinds), `payments` (updates, i.e. completion decisions) and
//! `trade_simulations` (inserts). Other consumers (trade history, admin
//! desks) watch their own table sets through the same machinery.

use crate::backend::realtime::{
    ChangeEvent, ChangeKind, ChangeStream, ChangeSubscription, SubscriptionError, UserScope,
    WatchedTable,
};
use crate::core_types::UserId;
use crate::events::{EventBus, PlatformEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Why a re-fetch is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// One or more change events arrived (coalesced)
    Notified,
    /// Poll tick (backup timer or demoted mode)
    Poll,
}

pub struct ChangeNotifier {
    changes: Arc<dyn ChangeStream>,
    user_id: UserId,
    tables: Vec<WatchedTable>,
    debounce: Duration,
    poll_interval: Duration,
    /// When set, a poll ticker runs ALONGSIDE realtime as a resilience
    /// floor (the generalized backup-timer pattern)
    force_poll: Option<Duration>,
    bus: EventBus,
}

impl ChangeNotifier {
    /// The credit feed's three balance-affecting sources.
    pub fn credit_feed(
        changes: Arc<dyn ChangeStream>,
        user_id: UserId,
        debounce: Duration,
        poll_interval: Duration,
        bus: EventBus,
    ) -> Self {
        Self::for_tables(
            changes,
            user_id,
            vec![
                WatchedTable::UserCredits,
                WatchedTable::Payments,
                WatchedTable::TradeSimulations,
            ],
            debounce,
            poll_interval,
            None,
            bus,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn for_tables(
        changes: Arc<dyn ChangeStream>,
        user_id: UserId,
        tables: Vec<WatchedTable>,
        debounce: Duration,
        poll_interval: Duration,
        force_poll: Option<Duration>,
        bus: EventBus,
    ) -> Self {
        Self {
            changes,
            user_id,
            tables,
            debounce,
            poll_interval,
            force_poll,
            bus,
        }
    }

    /// Spawn the notifier task. It runs until the trigger receiver is
    /// dropped or the task is aborted; subscriptions are torn down with
    /// it (their drop guards abort the forwarding tasks).
    pub fn spawn(self, trigger_tx: mpsc::Sender<RefreshTrigger>) -> JoinHandle<()> {
        tokio::spawn(self.run(trigger_tx))
    }

    async fn run(self, trigger_tx: mpsc::Sender<RefreshTrigger>) {
        let reason = match self.subscribe_all().await {
            Ok(subs) => {
                debug!(user_id = %self.user_id, tables = ?self.tables,
                       "Realtime subscriptions established");
                match self.realtime_loop(subs, &trigger_tx).await {
                    LoopExit::ConsumerGone => return,
                    LoopExit::StreamDropped => "realtime channel dropped".to_string(),
                }
            }
            Err(e) => format!("subscription setup failed: {}", e),
        };

        warn!(user_id = %self.user_id, "{} - demoting to polling re-fetch", reason);
        self.bus.publish(PlatformEvent::SubscriptionDemoted {
            user_id: self.user_id,
            reason,
        });
        self.polling_loop(&trigger_tx).await;
    }

    async fn subscribe_all(&self) -> Result<Vec<ChangeSubscription>, SubscriptionError> {
        let scope = UserScope::User(self.user_id);
        let mut subs = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            subs.push(self.changes.subscribe(*table, scope).await?);
        }
        Ok(subs)
    }

    /// Is this event one of the shapes we re-fetch on?
    fn is_relevant(event: &ChangeEvent) -> bool {
        match event.table {
            WatchedTable::UserCredits => true,
            WatchedTable::Payments => event.kind == ChangeKind::Update,
            WatchedTable::TradeSimulations => event.kind == ChangeKind::Insert,
            WatchedTable::Withdrawals => true,
        }
    }

    async fn realtime_loop(
        &self,
        mut subs: Vec<ChangeSubscription>,
        trigger_tx: &mpsc::Sender<RefreshTrigger>,
    ) -> LoopExit {
        let mut backup = self
            .force_poll
            .map(|interval| {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker
            });
        if let Some(ticker) = backup.as_mut() {
            ticker.reset(); // skip the immediate first tick
        }

        loop {
            let event = {
                // mpsc recv is cancel-safe: re-polling every iteration
                // loses nothing
                let next_change = async {
                    let nexts: Vec<_> = subs.iter_mut().map(|s| Box::pin(s.next())).collect();
                    futures::future::select_all(nexts).await.0
                };
                match backup.as_mut() {
                    Some(ticker) => {
                        tokio::select! {
                            ev = next_change => ev,
                            _ = ticker.tick() => {
                                if trigger_tx.send(RefreshTrigger::Poll).await.is_err() {
                                    return LoopExit::ConsumerGone;
                                }
                                continue;
                            }
                        }
                    }
                    None => next_change.await,
                }
            };

            let Some(event) = event else {
                return LoopExit::StreamDropped;
            };
            if !Self::is_relevant(&event) {
                continue;
            }

            // Coalesce the burst: wait out the debounce window, drain
            // whatever else queued up, then trigger ONCE
            tokio::time::sleep(self.debounce).await;
            for sub in subs.iter_mut() {
                while sub.try_next().is_some() {}
            }
            if trigger_tx.send(RefreshTrigger::Notified).await.is_err() {
                return LoopExit::ConsumerGone;
            }
        }
    }

    async fn polling_loop(&self, trigger_tx: &mpsc::Sender<RefreshTrigger>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await; // first tick completes immediately
        loop {
            ticker.tick().await;
            if trigger_tx.send(RefreshTrigger::Poll).await.is_err() {
                return;
            }
        }
    }
}

enum LoopExit {
    /// Trigger receiver dropped - the owning controller is gone
    ConsumerGone,
    /// Backend closed the change stream
    StreamDropped,
}
