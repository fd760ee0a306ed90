//! Simulated trading
//!
//! The "AI trading bot": a per-user interval task that stakes a bounded
//! fraction of the balance, writes a buy and a profit-adjusted sell, and
//! lets the store's trade-insert delta path move the money. No balance
//! value is ever computed client-side. [`history`] feeds the live trade
//! list to the UI through the same resilient subscription capability the
//! credit feed uses.

pub mod history;
pub mod simulator;

pub use history::{TradeHistoryFeed, TradeHistoryHandle};
pub use simulator::{BotError, BotHandle, TradeSimulator, apply_profit};
