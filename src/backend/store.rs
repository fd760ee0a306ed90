//! Relational store interfaces, one trait per table concern
//!
//! The store is where the central ledger invariant lives: every balance
//! mutation is an ATOMIC server-side delta, coupled to the row transition
//! that justifies it (payment completion, trade insert, withdrawal
//! completion). No client ever reads a balance, adds to it, and writes the
//! total back - two racing read-modify-write sequences would lose an
//! update.

use crate::core_types::{Cents, UserId};
use crate::models::{
    AffiliateCode, AffiliateInvitation, BalanceRecord, DepositWallet, Lead, LeadStatus, Payment,
    PaymentStatus, TradeExecution, WithdrawalRequest, WithdrawalStatus,
};
use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Row not found")]
    NotFound,
    #[error("Insufficient funds")]
    InsufficientFunds,
    #[error("Status already decided: {0}")]
    AlreadyDecided(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Table `user_credits` - the per-user running balance.
#[async_trait]
pub trait CreditStore: Send + Sync {
    /// Point lookup by user. `Ok(None)` means the row was never
    /// initialized (not an error - see `init_zero`).
    async fn fetch(&self, user_id: UserId) -> Result<Option<BalanceRecord>, StoreError>;

    /// Idempotent insert-if-absent of a zero row (unique key on
    /// `user_id`). Returns whether a row was actually created.
    async fn init_zero(&self, user_id: UserId) -> Result<bool, StoreError>;

    /// Apply a signed delta ATOMICALLY at the storage layer
    /// (`SET amount = amount + :delta`). Fails with `InsufficientFunds`
    /// if the result would be negative, leaving the row untouched.
    async fn apply_delta(
        &self,
        user_id: UserId,
        delta_cents: Cents,
    ) -> Result<BalanceRecord, StoreError>;
}

/// Table `payments`. Completion applies the credit delta atomically with
/// the status flip - the single crediting path for deposits.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: Payment) -> Result<Payment, StoreError>;

    async fn fetch(&self, id: Uuid) -> Result<Payment, StoreError>;

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Payment>, StoreError>;

    async fn list_by_status(&self, status: PaymentStatus) -> Result<Vec<Payment>, StoreError>;

    /// Exactly-once transition Pending -> {Completed, Rejected}.
    /// Completing also credits `amount_cents` to the user, in the same
    /// storage-layer transaction. A second decision attempt fails with
    /// `AlreadyDecided` and has no effect.
    async fn mark_decided(&self, id: Uuid, status: PaymentStatus) -> Result<Payment, StoreError>;
}

/// Table `trade_simulations`. Inserting applies the trade's signed total
/// to the balance atomically with the insert.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Insert an execution and apply its balance delta atomically.
    /// A buy exceeding the current balance fails with
    /// `InsufficientFunds` and inserts nothing.
    async fn insert(&self, trade: TradeExecution) -> Result<TradeExecution, StoreError>;

    /// Most recent executions first.
    async fn list_recent(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<TradeExecution>, StoreError>;
}

/// Table `withdrawals`. Completion debits the balance atomically; an
/// insufficient balance fails the completion and leaves the request
/// Pending (admin retries later or rejects).
#[async_trait]
pub trait WithdrawalStore: Send + Sync {
    async fn insert(&self, request: WithdrawalRequest) -> Result<WithdrawalRequest, StoreError>;

    async fn fetch(&self, id: Uuid) -> Result<WithdrawalRequest, StoreError>;

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<WithdrawalRequest>, StoreError>;

    async fn list_by_status(
        &self,
        status: WithdrawalStatus,
    ) -> Result<Vec<WithdrawalRequest>, StoreError>;

    async fn mark_decided(
        &self,
        id: Uuid,
        status: WithdrawalStatus,
    ) -> Result<WithdrawalRequest, StoreError>;
}

/// Tables `affiliate_codes` and `affiliate_invitations`.
#[async_trait]
pub trait AffiliateStore: Send + Sync {
    /// Create-once: inserting a second code for the same user returns the
    /// existing one unchanged.
    async fn insert_code(&self, user_id: UserId, code: &str) -> Result<AffiliateCode, StoreError>;

    async fn code_for(&self, user_id: UserId) -> Result<Option<AffiliateCode>, StoreError>;

    async fn find_by_code(&self, code: &str) -> Result<Option<AffiliateCode>, StoreError>;

    /// Record an accepted invitation. Fails with `Conflict` if the
    /// invited user already has one (at most one per invited user).
    async fn record_invitation(
        &self,
        invitation: AffiliateInvitation,
    ) -> Result<AffiliateInvitation, StoreError>;

    async fn fetch_for_invited(
        &self,
        invited_user_id: UserId,
    ) -> Result<Option<AffiliateInvitation>, StoreError>;

    async fn list_for_inviter(
        &self,
        inviter_id: UserId,
    ) -> Result<Vec<AffiliateInvitation>, StoreError>;

    /// Compare-and-set `bonus_paid_to_inviter` false -> true.
    /// Returns whether THIS call flipped the flag (claim won).
    async fn claim_inviter_bonus(&self, invitation_id: Uuid) -> Result<bool, StoreError>;

    /// Compare-and-set `bonus_paid_to_invited` false -> true.
    async fn claim_invited_bonus(&self, invitation_id: Uuid) -> Result<bool, StoreError>;
}

/// Table `leads`.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Idempotent on email: a duplicate capture refreshes note/phone and
    /// bumps `updated_at` instead of inserting a second row.
    async fn upsert(&self, lead: Lead) -> Result<Lead, StoreError>;

    async fn list(&self, status: Option<LeadStatus>) -> Result<Vec<Lead>, StoreError>;

    async fn update_status(&self, id: Uuid, status: LeadStatus) -> Result<Lead, StoreError>;
}

/// Table `deposit_wallets`. At most one active wallet per (asset,
/// network): activating a wallet deactivates its predecessor.
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn upsert_wallet(&self, wallet: DepositWallet) -> Result<DepositWallet, StoreError>;

    async fn active_wallet(
        &self,
        asset: &str,
        network: &str,
    ) -> Result<Option<DepositWallet>, StoreError>;

    async fn list_wallets(&self) -> Result<Vec<DepositWallet>, StoreError>;
}
