//! Admin back-office
//!
//! Desks for the operations staff: confirm or reject deposits, approve
//! or reject withdrawals, work the lead pipeline, rotate deposit
//! wallets, apply manual balance adjustments. Every money-moving
//! decision goes through the store's exactly-once `mark_decided` (which
//! couples the delta to the status flip) or the privileged `credit-user`
//! RPC; the admin layer itself never computes a balance.

pub mod export;

use crate::backend::functions::{FN_CREDIT_USER, FN_NOTIFY_USER, FunctionError, FunctionsClient};
use crate::backend::store::{
    LeadStore, PaymentStore, StoreError, WalletStore, WithdrawalStore,
};
use crate::core_types::{Cents, UserId};
use crate::events::{EventBus, PlatformEvent};
use crate::models::{
    DepositWallet, Lead, LeadStatus, Payment, PaymentStatus, WithdrawalRequest, WithdrawalStatus,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Function error: {0}")]
    Function(#[from] FunctionError),
}

pub struct AdminService {
    payments: Arc<dyn PaymentStore>,
    withdrawals: Arc<dyn WithdrawalStore>,
    leads: Arc<dyn LeadStore>,
    wallets: Arc<dyn WalletStore>,
    functions: Arc<dyn FunctionsClient>,
    bus: EventBus,
}

impl AdminService {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        withdrawals: Arc<dyn WithdrawalStore>,
        leads: Arc<dyn LeadStore>,
        wallets: Arc<dyn WalletStore>,
        functions: Arc<dyn FunctionsClient>,
        bus: EventBus,
    ) -> Self {
        Self {
            payments,
            withdrawals,
            leads,
            wallets,
            functions,
            bus,
        }
    }

    // ========================================================
    // Payments desk
    // ========================================================

    pub async fn pending_payments(&self) -> Result<Vec<Payment>, AdminError> {
        Ok(self.payments.list_by_status(PaymentStatus::Pending).await?)
    }

    /// Confirm a deposit. The store flips the status and credits the
    /// amount in one transition; a second confirmation attempt fails
    /// with `AlreadyDecided` and credits nothing.
    pub async fn confirm_payment(&self, id: Uuid) -> Result<Payment, AdminError> {
        let payment = self
            .payments
            .mark_decided(id, PaymentStatus::Completed)
            .await?;
        info!(payment_id = %payment.id, user_id = %payment.user_id,
              amount_cents = payment.amount_cents, "Payment confirmed");
        self.bus.publish(PlatformEvent::PaymentDecided {
            payment_id: payment.id,
            user_id: payment.user_id,
            completed: true,
        });
        self.notify(
            payment.user_id,
            &format!("Your deposit {} was confirmed", payment.reference),
        )
        .await;
        Ok(payment)
    }

    pub async fn reject_payment(&self, id: Uuid, note: &str) -> Result<Payment, AdminError> {
        let payment = self
            .payments
            .mark_decided(id, PaymentStatus::Rejected)
            .await?;
        warn!(payment_id = %payment.id, user_id = %payment.user_id, note,
              "Payment rejected");
        self.bus.publish(PlatformEvent::PaymentDecided {
            payment_id: payment.id,
            user_id: payment.user_id,
            completed: false,
        });
        self.notify(
            payment.user_id,
            &format!("Your deposit {} was rejected: {}", payment.reference, note),
        )
        .await;
        Ok(payment)
    }

    // ========================================================
    // Withdrawals desk
    // ========================================================

    pub async fn pending_withdrawals(&self) -> Result<Vec<WithdrawalRequest>, AdminError> {
        Ok(self
            .withdrawals
            .list_by_status(WithdrawalStatus::Pending)
            .await?)
    }

    /// Approve a withdrawal. The store debits and flips the status in
    /// one transition; an insufficient balance fails the call and
    /// leaves the request Pending for a later retry or rejection.
    pub async fn approve_withdrawal(&self, id: Uuid) -> Result<WithdrawalRequest, AdminError> {
        let request = self
            .withdrawals
            .mark_decided(id, WithdrawalStatus::Completed)
            .await?;
        info!(withdrawal_id = %request.id, user_id = %request.user_id,
              amount_cents = request.amount_cents, "Withdrawal approved");
        self.bus.publish(PlatformEvent::WithdrawalDecided {
            withdrawal_id: request.id,
            user_id: request.user_id,
            status: WithdrawalStatus::Completed,
        });
        self.notify(
            request.user_id,
            &format!("Your withdrawal {} is on its way", request.reference),
        )
        .await;
        Ok(request)
    }

    pub async fn reject_withdrawal(
        &self,
        id: Uuid,
        note: &str,
    ) -> Result<WithdrawalRequest, AdminError> {
        let request = self
            .withdrawals
            .mark_decided(id, WithdrawalStatus::Rejected)
            .await?;
        warn!(withdrawal_id = %request.id, user_id = %request.user_id, note,
              "Withdrawal rejected");
        self.bus.publish(PlatformEvent::WithdrawalDecided {
            withdrawal_id: request.id,
            user_id: request.user_id,
            status: WithdrawalStatus::Rejected,
        });
        self.notify(
            request.user_id,
            &format!(
                "Your withdrawal {} was rejected: {}",
                request.reference, note
            ),
        )
        .await;
        Ok(request)
    }

    // ========================================================
    // Leads desk
    // ========================================================

    pub async fn leads(&self, status: Option<LeadStatus>) -> Result<Vec<Lead>, AdminError> {
        Ok(self.leads.list(status).await?)
    }

    pub async fn advance_lead(&self, id: Uuid, status: LeadStatus) -> Result<Lead, AdminError> {
        let lead = self.leads.update_status(id, status).await?;
        info!(lead_id = %lead.id, status = status.as_str(), "Lead status updated");
        Ok(lead)
    }

    // ========================================================
    // Wallets desk
    // ========================================================

    pub async fn set_deposit_wallet(
        &self,
        wallet: DepositWallet,
    ) -> Result<DepositWallet, AdminError> {
        let wallet = self.wallets.upsert_wallet(wallet).await?;
        info!(asset = %wallet.asset, network = %wallet.network,
              address = %wallet.address, "Deposit wallet set");
        Ok(wallet)
    }

    pub async fn deposit_wallets(&self) -> Result<Vec<DepositWallet>, AdminError> {
        Ok(self.wallets.list_wallets().await?)
    }

    // ========================================================
    // Manual adjustment
    // ========================================================

    /// Manual balance adjustment through the privileged RPC - the only
    /// balance path not tied to a row transition. Audit-logged.
    pub async fn credit_user(
        &self,
        user_id: UserId,
        delta_cents: Cents,
        reason: &str,
    ) -> Result<(), AdminError> {
        self.functions
            .invoke(
                FN_CREDIT_USER,
                json!({
                    "user_id": user_id.to_string(),
                    "delta_cents": delta_cents,
                    "reason": reason,
                }),
            )
            .await?;
        info!(user_id = %user_id, delta_cents, reason, "Manual credit applied");
        Ok(())
    }

    /// Notification failures never fail the decision that triggered
    /// them; the money already moved.
    async fn notify(&self, user_id: UserId, subject: &str) {
        match self
            .functions
            .invoke(
                FN_NOTIFY_USER,
                json!({ "user_id": user_id.to_string(), "subject": subject }),
            )
            .await
        {
            Ok(_) => {
                self.bus.publish(PlatformEvent::NotificationSent {
                    user_id,
                    subject: subject.to_string(),
                });
            }
            Err(e) => warn!(user_id = %user_id, error = %e, "Notification dispatch failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::store::CreditStore;

    fn admin(backend: &Arc<MemoryBackend>) -> AdminService {
        AdminService::new(
            backend.clone(),
            backend.clone(),
            backend.clone(),
            backend.clone(),
            backend.clone(),
            EventBus::default(),
        )
    }

    #[tokio::test]
    async fn test_confirm_credits_exactly_once() {
        let backend = MemoryBackend::new();
        let user_id = backend.seed_user("a@b.c", "pw");
        let payment = PaymentStore::insert(
            backend.as_ref(),
            Payment::pending(user_id, "USDT", 30_000),
        )
        .await
        .unwrap();
        let svc = admin(&backend);

        svc.confirm_payment(payment.id).await.unwrap();
        let err = svc.confirm_payment(payment.id).await.unwrap_err();
        assert!(matches!(
            err,
            AdminError::Store(StoreError::AlreadyDecided(_))
        ));

        let balance = CreditStore::fetch(backend.as_ref(), user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(balance.amount_cents(), 30_000);
    }

    #[tokio::test]
    async fn test_insufficient_withdrawal_stays_pending() {
        let backend = MemoryBackend::new();
        let user_id = backend.seed_user("a@b.c", "pw");
        backend.apply_delta(user_id, 5_000).await.unwrap();
        let request = WithdrawalStore::insert(
            backend.as_ref(),
            WithdrawalRequest::pending(user_id, 10_000, "DE89"),
        )
        .await
        .unwrap();
        let svc = admin(&backend);

        let err = svc.approve_withdrawal(request.id).await.unwrap_err();
        assert!(matches!(
            err,
            AdminError::Store(StoreError::InsufficientFunds)
        ));

        // Still pending and available to the desk
        let pending = svc.pending_withdrawals().await.unwrap();
        assert_eq!(pending.len(), 1);

        let balance = CreditStore::fetch(backend.as_ref(), user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(balance.amount_cents(), 5_000);
    }

    #[tokio::test]
    async fn test_approved_withdrawal_debits() {
        let backend = MemoryBackend::new();
        let user_id = backend.seed_user("a@b.c", "pw");
        backend.apply_delta(user_id, 30_000).await.unwrap();
        let request = WithdrawalStore::insert(
            backend.as_ref(),
            WithdrawalRequest::pending(user_id, 10_000, "DE89"),
        )
        .await
        .unwrap();
        let svc = admin(&backend);

        svc.approve_withdrawal(request.id).await.unwrap();
        let balance = CreditStore::fetch(backend.as_ref(), user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(balance.amount_cents(), 20_000);
    }

    #[tokio::test]
    async fn test_lead_desk_advances_status() {
        let backend = MemoryBackend::new();
        let lead = backend
            .upsert(Lead::new("Ada", "ada@example.com", None, None))
            .await
            .unwrap();
        let svc = admin(&backend);

        let updated = svc.advance_lead(lead.id, LeadStatus::Contacted).await.unwrap();
        assert_eq!(updated.status, LeadStatus::Contacted);

        let contacted = svc.leads(Some(LeadStatus::Contacted)).await.unwrap();
        assert_eq!(contacted.len(), 1);
    }

    #[tokio::test]
    async fn test_wallet_rotation_keeps_one_active() {
        let backend = MemoryBackend::new();
        let svc = admin(&backend);

        svc.set_deposit_wallet(DepositWallet::new("USDT", "TRC20", "addr-1"))
            .await
            .unwrap();
        svc.set_deposit_wallet(DepositWallet::new("USDT", "TRC20", "addr-2"))
            .await
            .unwrap();

        let active = backend.active_wallet("USDT", "TRC20").await.unwrap().unwrap();
        assert_eq!(active.address, "addr-2");
    }

    #[tokio::test]
    async fn test_manual_credit_goes_through_rpc() {
        let backend = MemoryBackend::new();
        let user_id = backend.seed_user("a@b.c", "pw");
        let svc = admin(&backend);

        svc.credit_user(user_id, 1_500, "goodwill").await.unwrap();
        let balance = CreditStore::fetch(backend.as_ref(), user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(balance.amount_cents(), 1_500);

        let calls = backend.recorded_invocations();
        assert!(calls.iter().any(|c| c.name == FN_CREDIT_USER));
    }
}
