//! Realtime change stream interface
//!
//! The backend pushes row-level "something changed" events scoped by table
//! and user. Events are a TRIGGER to re-read authoritative state, never a
//! carrier of it: no ordering is guaranteed and delivery is at-least-once,
//! so consumers must re-fetch, never apply deltas from the payload
//! (which is why [`ChangeEvent`] carries no row values at all).

use crate::core_types::UserId;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Failed to establish subscription: {0}")]
    Setup(String),
    #[error("Subscription channel dropped")]
    Dropped,
}

/// The three logical sources that affect a user's balance, plus the
/// withdrawal table watched by admin desks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchedTable {
    UserCredits,
    Payments,
    TradeSimulations,
    Withdrawals,
}

impl WatchedTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchedTable::UserCredits => "user_credits",
            WatchedTable::Payments => "payments",
            WatchedTable::TradeSimulations => "trade_simulations",
            WatchedTable::Withdrawals => "withdrawals",
        }
    }
}

/// Server-side filter for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserScope {
    /// Only rows belonging to this user
    User(UserId),
    /// All rows (admin desks)
    All,
}

impl UserScope {
    #[inline]
    pub fn matches(&self, user_id: UserId) -> bool {
        match self {
            UserScope::User(id) => *id == user_id,
            UserScope::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row changed. Notification only - holds no authoritative values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: WatchedTable,
    pub kind: ChangeKind,
    pub user_id: UserId,
}

/// An active subscription. Dropping it tears the subscription down -
/// the forwarding task is aborted, so no dangling subscriptions survive
/// their owner.
pub struct ChangeSubscription {
    rx: mpsc::Receiver<ChangeEvent>,
    forward_task: JoinHandle<()>,
}

impl ChangeSubscription {
    pub fn new(rx: mpsc::Receiver<ChangeEvent>, forward_task: JoinHandle<()>) -> Self {
        Self { rx, forward_task }
    }

    /// Next change event. `None` means the channel dropped (backend side);
    /// callers should treat that as [`SubscriptionError::Dropped`] and
    /// demote to polling.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Non-blocking drain step, used to coalesce event bursts within a
    /// debounce window.
    pub fn try_next(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.forward_task.abort();
    }
}

#[async_trait::async_trait]
pub trait ChangeStream: Send + Sync {
    /// Subscribe to row changes on one table, filtered server-side.
    async fn subscribe(
        &self,
        table: WatchedTable,
        scope: UserScope,
    ) -> Result<ChangeSubscription, SubscriptionError>;
}
