//! Session engine - wires a signed-in user to the moving parts
//!
//! One task owns the session lifecycle: on sign-in it spawns the credit
//! feed, the access-control watcher and (once the account activates)
//! the trading bot; on sign-out it tears all of that down
//! unconditionally. Teardown is by ownership: every spawned piece lives
//! inside the `ActiveSession` value, so dropping it cannot leave a
//! dangling task or subscription behind.
//!
//! The gating latch is per session: a fresh `AccessController` is built
//! for every sign-in, so a returning user gets one redirect again.

use crate::affiliate::AffiliateService;
use crate::backend::Backend;
use crate::backend::auth::{AuthClient, SessionEvent};
use crate::config::AppConfig;
use crate::core_types::{ACTIVATION_THRESHOLD_CENTS, UserId};
use crate::credit::controller::{CreditFeed, CreditHandle};
use crate::credit::gating::{AccessController, AccessDecision, AppRoute};
use crate::events::{EventBus, PlatformEvent};
use crate::market::PriceFeed;
use crate::trading::{BotHandle, TradeSimulator};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct SessionEngine {
    backend: Backend,
    prices: Arc<dyn PriceFeed>,
    affiliates: Arc<AffiliateService>,
    bus: EventBus,
    config: AppConfig,
}

impl SessionEngine {
    pub fn new(
        backend: Backend,
        prices: Arc<dyn PriceFeed>,
        affiliates: Arc<AffiliateService>,
        bus: EventBus,
        config: AppConfig,
    ) -> Self {
        Self {
            backend,
            prices,
            affiliates,
            bus,
            config,
        }
    }

    /// Start the engine task. An already signed-in user is picked up
    /// immediately; afterwards the task follows session events.
    pub fn spawn(self) -> EngineHandle {
        let (route_tx, route_rx) = watch::channel(AppRoute::Landing);
        let events = self.backend.auth.subscribe_sessions();
        let task = tokio::spawn(self.run(events, route_rx));
        EngineHandle { route_tx, task }
    }

    async fn run(
        self,
        mut events: broadcast::Receiver<SessionEvent>,
        route_rx: watch::Receiver<AppRoute>,
    ) {
        let mut active: Option<ActiveSession> = None;

        if let Some(session) = self.backend.auth.current_user().await {
            info!(user_id = %session.user_id, "Resuming existing session");
            active = Some(self.activate(session.user_id, route_rx.clone()));
        }

        loop {
            match events.recv().await {
                Ok(SessionEvent::SignedIn(session)) => {
                    // A sign-in over a live session replaces it wholesale
                    drop(active.take());
                    info!(user_id = %session.user_id, email = %session.email, "Session started");
                    active = Some(self.activate(session.user_id, route_rx.clone()));
                }
                Ok(SessionEvent::SignedOut { user_id }) => {
                    info!(user_id = %user_id, "Session ended, tearing down");
                    drop(active.take());
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // Resync from the auth client rather than guess
                    warn!(missed, "Session event stream lagged");
                    drop(active.take());
                    if let Some(session) = self.backend.auth.current_user().await {
                        active = Some(self.activate(session.user_id, route_rx.clone()));
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn activate(&self, user_id: UserId, route_rx: watch::Receiver<AppRoute>) -> ActiveSession {
        let credit = CreditFeed::spawn(
            self.backend.credits.clone(),
            self.backend.changes.clone(),
            user_id,
            &self.config.credit,
            self.bus.clone(),
        );

        let watcher = SessionWatcher {
            user_id,
            controller: AccessController::new(ACTIVATION_THRESHOLD_CENTS),
            state_rx: credit.state(),
            route_rx,
            bot_seed: BotSeed {
                trades: self.backend.trades.clone(),
                credits: self.backend.credits.clone(),
                prices: self.prices.clone(),
                config: self.config.clone(),
            },
            affiliates: self.affiliates.clone(),
            bus: self.bus.clone(),
        };
        let watcher_task = tokio::spawn(watcher.run());

        ActiveSession {
            _credit: credit,
            watcher_task,
        }
    }
}

/// Everything spawned for one signed-in user. Dropping it aborts the
/// watcher (and with it the bot handle it owns) and shuts the credit
/// feed down.
struct ActiveSession {
    _credit: CreditHandle,
    watcher_task: JoinHandle<()>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.watcher_task.abort();
    }
}

/// Handle to the running engine. `navigate` simulates the user moving
/// between routes; the watcher re-evaluates gating on every move.
pub struct EngineHandle {
    route_tx: watch::Sender<AppRoute>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    pub fn navigate(&self, route: AppRoute) {
        let _ = self.route_tx.send(route);
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// What the watcher needs to start a bot once the account activates.
struct BotSeed {
    trades: Arc<dyn crate::backend::store::TradeStore>,
    credits: Arc<dyn crate::backend::store::CreditStore>,
    prices: Arc<dyn PriceFeed>,
    config: AppConfig,
}

struct SessionWatcher {
    user_id: UserId,
    controller: AccessController,
    state_rx: watch::Receiver<crate::credit::controller::CreditState>,
    route_rx: watch::Receiver<AppRoute>,
    bot_seed: BotSeed,
    affiliates: Arc<AffiliateService>,
    bus: EventBus,
}

impl SessionWatcher {
    async fn run(mut self) {
        let mut bot: Option<BotHandle> = None;
        let mut activation_settled = false;

        loop {
            self.evaluate(&mut bot, &mut activation_settled).await;
            tokio::select! {
                changed = self.state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = self.route_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        // bot handle drops here, stopping the interval task
    }

    async fn evaluate(&mut self, bot: &mut Option<BotHandle>, activation_settled: &mut bool) {
        let Some(balance) = self.state_rx.borrow().settled_balance() else {
            return;
        };
        let route = *self.route_rx.borrow();

        let decision = self.controller.evaluate(balance, route);
        if decision != AccessDecision::Stay {
            debug!(user_id = %self.user_id, ?route, ?decision, "Redirect issued");
            self.bus.publish(PlatformEvent::RedirectIssued {
                user_id: self.user_id,
                decision,
            });
        }

        if balance >= ACTIVATION_THRESHOLD_CENTS {
            if bot.is_none() {
                info!(user_id = %self.user_id, "Account activated, starting trading bot");
                *bot = Some(self.start_bot());
            }
            if !*activation_settled {
                *activation_settled = true;
                // Idempotent: claimed flags make a repeat call a no-op
                if let Err(e) = self.affiliates.settle_on_activation(self.user_id).await {
                    warn!(user_id = %self.user_id, error = %e, "Affiliate settlement failed");
                }
            }
        }
    }

    fn start_bot(&self) -> BotHandle {
        use crate::credit::aggregator::BalanceAggregator;
        use std::time::Duration;

        let aggregator = BalanceAggregator::new(
            self.bot_seed.credits.clone(),
            Duration::from_secs(self.bot_seed.config.credit.fetch_timeout_secs),
        );
        TradeSimulator::new(
            self.bot_seed.trades.clone(),
            aggregator,
            self.bot_seed.prices.clone(),
            self.bus.clone(),
            self.bot_seed.config.bot.clone(),
            self.user_id,
        )
        .spawn()
    }
}
