//! Internal event broadcast - tokio::broadcast channel for cross-component
//! events.
//!
//! The presentation layer (out of scope here) is the intended consumer:
//! toasts, redirect handling, live dashboards. Tests subscribe to assert
//! side-effects without reaching into component internals.

use crate::core_types::{Cents, UserId};
use crate::credit::gating::AccessDecision;
use crate::models::{TradeSide, WithdrawalStatus};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Platform-wide events for alerting, UI updates, and monitoring.
#[derive(Debug, Clone, Serialize)]
pub enum PlatformEvent {
    /// The credit feed published a fresh authoritative balance.
    BalanceRefreshed { user_id: UserId, balance_cents: Cents },
    /// A balance fetch failed; the feed fell back to the safe default.
    CreditError { user_id: UserId, message: String },
    /// The gating policy issued a redirect (acted on at most once per pair).
    RedirectIssued {
        user_id: UserId,
        decision: AccessDecision,
    },
    /// The realtime channel dropped; the notifier demoted itself to polling.
    SubscriptionDemoted { user_id: UserId, reason: String },
    /// The trading bot executed a simulated trade.
    TradeExecuted {
        user_id: UserId,
        side: TradeSide,
        total_cents: Cents,
    },
    /// An admin decided a payment.
    PaymentDecided {
        payment_id: Uuid,
        user_id: UserId,
        completed: bool,
    },
    /// An admin decided a withdrawal.
    WithdrawalDecided {
        withdrawal_id: Uuid,
        user_id: UserId,
        status: WithdrawalStatus,
    },
    /// An affiliate bonus was paid out (one event per paid side).
    AffiliateBonusPaid {
        invitation_id: Uuid,
        beneficiary: UserId,
        amount_cents: Cents,
    },
    /// An outbound user notification was dispatched.
    NotificationSent { user_id: UserId, subject: String },
}

/// Broadcast bus. Cheap to clone; publishing with no subscribers is fine.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. A send error only means no one is listening,
    /// which is not a failure.
    pub fn publish(&self, event: PlatformEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
