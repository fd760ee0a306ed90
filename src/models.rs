//! Domain records mirrored from the external relational store
//!
//! Every entity here is OWNED and mutated by the backend-as-a-service; the
//! structs in this module are read-through copies carried by the application.
//! The one piece of enforced logic is `BalanceRecord`: its amount field is
//! private and all mutations go through checked methods, mirroring the
//! discipline the storage layer applies server-side.

use crate::core_types::{Cents, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================
// STATUS ENUMS
// ============================================================

/// Payment (deposit) lifecycle.
///
/// Status IDs are designed for storage as SMALLINT.
/// Terminal states: COMPLETED (1), REJECTED (2). Transitions happen
/// exactly once, Pending -> {Completed, Rejected}, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum PaymentStatus {
    Pending = 0,
    Completed = 1,
    Rejected = 2,
}

impl PaymentStatus {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Rejected)
    }

    /// Get the numeric status ID for SMALLINT storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from a stored status ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(PaymentStatus::Pending),
            1 => Some(PaymentStatus::Completed),
            2 => Some(PaymentStatus::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Rejected => "REJECTED",
        }
    }
}

/// Withdrawal lifecycle. Same transition discipline as [`PaymentStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum WithdrawalStatus {
    Pending = 0,
    Completed = 1,
    Rejected = 2,
}

impl WithdrawalStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WithdrawalStatus::Completed | WithdrawalStatus::Rejected
        )
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(WithdrawalStatus::Pending),
            1 => Some(WithdrawalStatus::Completed),
            2 => Some(WithdrawalStatus::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "PENDING",
            WithdrawalStatus::Completed => "COMPLETED",
            WithdrawalStatus::Rejected => "REJECTED",
        }
    }
}

/// Trade direction. Buys debit the balance by the trade total,
/// sells credit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum TradeSide {
    Buy = 0,
    Sell = 1,
}

impl TradeSide {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TradeSide::Buy),
            1 => Some(TradeSide::Sell),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    /// Sign of this side's effect on the balance (in cents).
    #[inline]
    pub fn balance_sign(&self) -> Cents {
        match self {
            TradeSide::Buy => -1,
            TradeSide::Sell => 1,
        }
    }
}

/// Marketing lead pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum LeadStatus {
    New = 0,
    Contacted = 1,
    Converted = 2,
    Discarded = 3,
}

impl LeadStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(LeadStatus::New),
            1 => Some(LeadStatus::Contacted),
            2 => Some(LeadStatus::Converted),
            3 => Some(LeadStatus::Discarded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "NEW",
            LeadStatus::Contacted => "CONTACTED",
            LeadStatus::Converted => "CONVERTED",
            LeadStatus::Discarded => "DISCARDED",
        }
    }
}

// ============================================================
// LEDGER EVENT RECORDS
// ============================================================

/// A customer deposit awaiting (or past) manual confirmation.
///
/// `reference` is a ULID shown to the user and quoted in the bank/chain
/// transfer; `tx_ref` and `proof_url` are what the user submitted as
/// evidence. Only COMPLETED payments count toward the balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: UserId,
    pub reference: String,
    pub asset: String,
    pub amount_cents: Cents,
    pub tx_ref: Option<String>,
    pub proof_url: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Build a fresh PENDING payment with a new ULID reference.
    pub fn pending(user_id: UserId, asset: &str, amount_cents: Cents) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            reference: ulid::Ulid::new().to_string(),
            asset: asset.to_string(),
            amount_cents,
            tx_ref: None,
            proof_url: None,
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
        }
    }
}

/// A single simulated trade execution.
///
/// `total_cents` is the integer-exact amount the execution moves;
/// `quantity` and `unit_price` are display detail derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeExecution {
    pub id: Uuid,
    pub user_id: UserId,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_cents: Cents,
    pub executed_at: DateTime<Utc>,
}

impl TradeExecution {
    pub fn new(
        user_id: UserId,
        symbol: &str,
        side: TradeSide,
        quantity: Decimal,
        unit_price: Decimal,
        total_cents: Cents,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            symbol: symbol.to_string(),
            side,
            quantity,
            unit_price,
            total_cents,
            executed_at: Utc::now(),
        }
    }

    /// Signed effect of this execution on the balance, in cents.
    #[inline]
    pub fn balance_delta(&self) -> Cents {
        self.side.balance_sign() * self.total_cents
    }
}

/// A customer withdrawal request.
///
/// The balance is debited at COMPLETION, not at request time. The
/// request-time balance check is advisory UX only; the authoritative
/// check happens inside the store's `mark_decided`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub user_id: UserId,
    pub reference: String,
    pub amount_cents: Cents,
    pub destination: String,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl WithdrawalRequest {
    pub fn pending(user_id: UserId, amount_cents: Cents, destination: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            reference: ulid::Ulid::new().to_string(),
            amount_cents,
            destination: destination.to_string(),
            status: WithdrawalStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
        }
    }
}

// ============================================================
// BALANCE RECORD (table `user_credits`)
// ============================================================

/// The per-user running balance row.
///
/// # Invariant (ENFORCED at the storage layer):
/// `amount_cents` equals the sum of completed payments, minus completed
/// withdrawals, minus buy totals, plus sell totals - every mutation
/// applied exactly once as an atomic server-side delta. The client NEVER
/// writes a computed total back (lost-update hazard under concurrent
/// writers).
///
/// # Enforcement here:
/// - `amount_cents` is PRIVATE; mutations go through `credit`/`debit`
/// - both are checked: no overflow, no negative result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceRecord {
    user_id: UserId,
    amount_cents: Cents,
    last_updated: DateTime<Utc>,
}

impl BalanceRecord {
    /// A fresh zero-balance row (lazy initialization target).
    pub fn zero(user_id: UserId) -> Self {
        Self {
            user_id,
            amount_cents: 0,
            last_updated: Utc::now(),
        }
    }

    /// Rehydrate a row read from the store. Refuses negative amounts:
    /// a negative stored balance means the storage-layer invariant broke.
    pub fn from_row(
        user_id: UserId,
        amount_cents: Cents,
        last_updated: DateTime<Utc>,
    ) -> Result<Self, &'static str> {
        if amount_cents < 0 {
            return Err("Negative balance row");
        }
        Ok(Self {
            user_id,
            amount_cents,
            last_updated,
        })
    }

    #[inline]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[inline]
    pub fn amount_cents(&self) -> Cents {
        self.amount_cents
    }

    #[inline]
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Apply a signed delta.
    ///
    /// # Errors
    /// - "Balance overflow" on arithmetic overflow
    /// - "Insufficient funds" if the result would be negative
    pub fn apply_delta(&mut self, delta_cents: Cents) -> Result<(), &'static str> {
        let next = self
            .amount_cents
            .checked_add(delta_cents)
            .ok_or("Balance overflow")?;
        if next < 0 {
            return Err("Insufficient funds");
        }
        self.amount_cents = next;
        self.last_updated = Utc::now();
        Ok(())
    }
}

// ============================================================
// AFFILIATE PROGRAM
// ============================================================

/// A user's referral code (`AV-` + 10 uppercase hex). Create-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffiliateCode {
    pub user_id: UserId,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

/// An accepted referral.
///
/// # Invariants:
/// - at most one accepted invitation per `invited_user_id`
/// - bonus flags transition false -> true exactly once, never reverse
///   (claims are a store-side compare-and-set)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffiliateInvitation {
    pub id: Uuid,
    pub inviter_id: UserId,
    pub invited_user_id: UserId,
    pub affiliate_code: String,
    pub invited_at: DateTime<Utc>,
    pub bonus_paid_to_inviter: bool,
    pub bonus_paid_to_invited: bool,
    pub bonus_paid_at: Option<DateTime<Utc>>,
}

impl AffiliateInvitation {
    pub fn new(inviter_id: UserId, invited_user_id: UserId, affiliate_code: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            inviter_id,
            invited_user_id,
            affiliate_code: affiliate_code.to_string(),
            invited_at: Utc::now(),
            bonus_paid_to_inviter: false,
            bonus_paid_to_invited: false,
            bonus_paid_at: None,
        }
    }

    /// Both sides settled - nothing left to pay for this referral.
    #[inline]
    pub fn fully_settled(&self) -> bool {
        self.bonus_paid_to_inviter && self.bonus_paid_to_invited
    }
}

// ============================================================
// MARKETING & OPERATIONS
// ============================================================

/// A captured marketing lead. Idempotent on email: re-capturing the same
/// address refreshes the note instead of inserting a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub note: Option<String>,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(full_name: &str, email: &str, phone: Option<&str>, note: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            full_name: full_name.to_string(),
            email: email.to_lowercase(),
            phone: phone.map(str::to_string),
            note: note.map(str::to_string),
            status: LeadStatus::New,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A platform-owned deposit wallet users pay into. Admin-managed;
/// at most one ACTIVE wallet per (asset, network).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositWallet {
    pub id: Uuid,
    pub asset: String,
    pub network: String,
    pub address: String,
    pub active: bool,
}

impl DepositWallet {
    pub fn new(asset: &str, network: &str, address: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset: asset.to_string(),
            network: network.to_string(),
            address: address.to_string(),
            active: true,
        }
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_id_roundtrip() {
        for s in [
            PaymentStatus::Pending,
            PaymentStatus::Completed,
            PaymentStatus::Rejected,
        ] {
            assert_eq!(PaymentStatus::from_id(s.id()), Some(s));
        }
        assert_eq!(PaymentStatus::from_id(99), None);

        for s in [
            WithdrawalStatus::Pending,
            WithdrawalStatus::Completed,
            WithdrawalStatus::Rejected,
        ] {
            assert_eq!(WithdrawalStatus::from_id(s.id()), Some(s));
        }
    }

    #[test]
    fn test_terminal_states_final() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_balance_record_apply_delta() {
        let mut rec = BalanceRecord::zero(Uuid::new_v4());
        assert_eq!(rec.amount_cents(), 0);

        rec.apply_delta(30_000).unwrap();
        assert_eq!(rec.amount_cents(), 30_000);

        rec.apply_delta(-10_000).unwrap();
        assert_eq!(rec.amount_cents(), 20_000);
    }

    #[test]
    fn test_balance_record_refuses_negative() {
        let mut rec = BalanceRecord::zero(Uuid::new_v4());
        rec.apply_delta(5_000).unwrap();

        assert!(rec.apply_delta(-5_001).is_err());
        assert_eq!(rec.amount_cents(), 5_000); // Unchanged

        // Exact drain is fine
        rec.apply_delta(-5_000).unwrap();
        assert_eq!(rec.amount_cents(), 0);
    }

    #[test]
    fn test_balance_record_rejects_negative_row() {
        assert!(BalanceRecord::from_row(Uuid::new_v4(), -1, Utc::now()).is_err());
        assert!(BalanceRecord::from_row(Uuid::new_v4(), 0, Utc::now()).is_ok());
    }

    #[test]
    fn test_trade_balance_delta_signs() {
        let q = Decimal::from_str("0.5").unwrap();
        let p = Decimal::from_str("200").unwrap();

        let buy = TradeExecution::new(Uuid::new_v4(), "BTC-EUR", TradeSide::Buy, q, p, 10_000);
        assert_eq!(buy.balance_delta(), -10_000);

        let sell = TradeExecution::new(Uuid::new_v4(), "BTC-EUR", TradeSide::Sell, q, p, 12_000);
        assert_eq!(sell.balance_delta(), 12_000);
    }

    #[test]
    fn test_lead_email_normalized() {
        let lead = Lead::new("Ada Example", "Ada@Example.COM", None, None);
        assert_eq!(lead.email, "ada@example.com");
    }
}
