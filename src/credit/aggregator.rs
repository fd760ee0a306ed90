//! Balance aggregator
//!
//! Point lookup of the authoritative `user_credits` row, with lazy zero
//! initialization on first access: a missing row is NOT an error, it just
//! means this user never touched the ledger. Initialization is idempotent
//! under concurrent first calls - the store's unique key on `user_id`
//! guarantees at most one row regardless of racing init attempts.
//!
//! The whole lookup/init round-trip is bounded: on expiry the caller gets
//! `LookupFailed` instead of a hung UI.

use crate::backend::store::{CreditStore, StoreError};
use crate::core_types::{Cents, UserId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Credit error taxonomy. `LookupFailed` is recovered by the next
/// notification-triggered re-fetch; `InitializationFailed` is fatal for
/// this session's balance display (the feed falls back to 0).
#[derive(Debug, Error)]
pub enum CreditError {
    #[error("Balance lookup failed: {0}")]
    LookupFailed(String),
    #[error("Zero-balance initialization failed: {0}")]
    InitializationFailed(String),
}

pub struct BalanceAggregator {
    credits: Arc<dyn CreditStore>,
    fetch_timeout: Duration,
}

impl BalanceAggregator {
    pub fn new(credits: Arc<dyn CreditStore>, fetch_timeout: Duration) -> Self {
        Self {
            credits,
            fetch_timeout,
        }
    }

    /// Current spendable balance in cents, non-negative.
    ///
    /// Missing row: init a zero row, then re-read. The re-read (rather
    /// than trusting our own insert) covers the race where a concurrent
    /// writer credited the user between our lookup and our init.
    pub async fn current_balance(&self, user_id: UserId) -> Result<Cents, CreditError> {
        tokio::time::timeout(self.fetch_timeout, self.lookup_or_init(user_id))
            .await
            .map_err(|_| CreditError::LookupFailed("timed out".into()))?
    }

    async fn lookup_or_init(&self, user_id: UserId) -> Result<Cents, CreditError> {
        let existing = self
            .credits
            .fetch(user_id)
            .await
            .map_err(|e| CreditError::LookupFailed(e.to_string()))?;

        if let Some(record) = existing {
            return Ok(record.amount_cents());
        }

        self.credits
            .init_zero(user_id)
            .await
            .map_err(|e| CreditError::InitializationFailed(e.to_string()))?;

        let record = self
            .credits
            .fetch(user_id)
            .await
            .map_err(|e| CreditError::LookupFailed(e.to_string()))?;
        match record {
            Some(record) => Ok(record.amount_cents()),
            // Insert reported success but the re-read found nothing:
            // the store broke its own unique-key contract
            None => Err(CreditError::InitializationFailed(
                StoreError::NotFound.to_string(),
            )),
        }
    }
}
