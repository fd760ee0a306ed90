//! Credit core: balance derivation and live synchronization
//!
//! The one mechanism everything else leans on. A user's spendable balance
//! lives in the store's `user_credits` row; this module derives it on
//! demand ([`aggregator`]), converts external row-change notifications
//! into re-fetches ([`notifier`]), exposes the latest value to
//! presentation code ([`controller`]), and decides activation gating
//! ([`gating`]).

pub mod aggregator;
pub mod controller;
pub mod gating;
pub mod notifier;

pub use aggregator::{BalanceAggregator, CreditError};
pub use controller::{CreditFeed, CreditHandle, CreditState};
pub use gating::{AccessController, AccessDecision, AppRoute, decide_access};
pub use notifier::{ChangeNotifier, RefreshTrigger};
