//! Altivest - Simulated crypto investment platform core
//!
//! Lead capture, registration, deposit-gated account activation, a
//! simulated trading bot, an affiliate program and an admin back-office,
//! all built around one invariant: the balance is a server-side running
//! total mutated ONLY by atomic deltas coupled to the row transitions
//! that justify them. Clients re-fetch; they never write totals.
//!
//! # Modules
//!
//! - [`core_types`] - UserId, Cents, the activation threshold
//! - [`money`] - integer-cent parsing/formatting, trade total rounding
//! - [`models`] - domain records mirrored from the relational store
//! - [`config`] - YAML-file configuration with per-section defaults
//! - [`events`] - broadcast bus for cross-component events
//! - [`backend`] - collaborator interfaces (auth, stores, realtime,
//!   privileged functions, object storage) + mock and postgres adapters
//! - [`credit`] - balance aggregation, resilient change subscription,
//!   balance view feed, access gating
//! - [`market`] - price feeds (seeded simulation, websocket ticker)
//! - [`trading`] - the simulated bot and the live trade history feed
//! - [`affiliate`] - referral codes and exactly-once bonus settlement
//! - [`onboarding`] - lead capture, registration, funding flows
//! - [`admin`] - operations desks and the CSV ledger export
//! - [`session`] - sign-in/out lifecycle wiring

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod events;
pub mod logging;
pub mod models;
pub mod money;

pub mod backend;
pub mod credit;
pub mod market;
pub mod trading;

pub mod admin;
pub mod affiliate;
pub mod onboarding;
pub mod session;

// Convenient re-exports at crate root
pub use backend::Backend;
pub use config::AppConfig;
pub use core_types::{ACTIVATION_THRESHOLD_CENTS, Cents, UserId};
pub use credit::{
    AccessController, AccessDecision, AppRoute, BalanceAggregator, CreditFeed, CreditHandle,
    CreditState,
};
pub use events::{EventBus, PlatformEvent};
pub use models::{
    BalanceRecord, Lead, Payment, PaymentStatus, TradeExecution, TradeSide, WithdrawalRequest,
    WithdrawalStatus,
};
pub use session::{EngineHandle, SessionEngine};
