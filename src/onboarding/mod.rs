//! Onboarding - lead capture, registration, user funding flows
//!
//! Lead capture is the public marketing surface (no account yet).
//! Registration creates the account through the privileged `create-user`
//! RPC and redeems an affiliate code when one is supplied. An account is
//! LOCKED until its balance first reaches the activation threshold;
//! activation is derived from the balance, never stored as a flag.
//!
//! Funding: deposits are user-submitted claims that an admin confirms
//! (the confirmation credits, see the store contract); withdrawals are
//! requests debited only at admin completion. The request-time balance
//! check here is advisory UX, not the authoritative one.

use crate::backend::functions::{
    FN_CREATE_USER, FN_DELETE_USER, FunctionError, FunctionsClient,
};
use crate::backend::storage::{ObjectStore, StorageError};
use crate::backend::store::{
    LeadStore, PaymentStore, StoreError, WalletStore, WithdrawalStore,
};
use crate::config::FundingConfig;
use crate::core_types::{ACTIVATION_THRESHOLD_CENTS, Cents, UserId};
use crate::models::{DepositWallet, Lead, Payment, WithdrawalRequest};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Error)]
pub enum OnboardingError {
    #[error("Invalid input: {0}")]
    Invalid(#[from] validator::ValidationErrors),
    #[error("No active deposit wallet for {asset} on {network}")]
    NoActiveWallet { asset: String, network: String },
    #[error("Amount below the {min_cents} cent minimum")]
    BelowMinimum { min_cents: Cents },
    #[error("Requested amount exceeds the current balance")]
    ExceedsBalance,
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Function error: {0}")]
    Function(#[from] FunctionError),
    #[error("Function returned a malformed response: {0}")]
    BadFunctionResponse(String),
}

// ============================================================
// FORMS
// ============================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LeadForm {
    #[validate(length(min = 2, max = 120))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegistrationForm {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 2, max = 120))]
    pub full_name: String,
    /// Optional referral code entered at signup
    pub affiliate_code: Option<String>,
}

/// Derived from the balance, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    /// Below the activation threshold; trading locked
    Locked,
    Activated,
}

pub fn activation_state(balance_cents: Cents) -> ActivationState {
    if balance_cents >= ACTIVATION_THRESHOLD_CENTS {
        ActivationState::Activated
    } else {
        ActivationState::Locked
    }
}

// ============================================================
// LEAD CAPTURE
// ============================================================

pub struct LeadService {
    leads: Arc<dyn LeadStore>,
}

impl LeadService {
    pub fn new(leads: Arc<dyn LeadStore>) -> Self {
        Self { leads }
    }

    /// Validate and upsert. Re-capturing an email refreshes the note
    /// instead of duplicating the lead.
    pub async fn capture(&self, form: LeadForm) -> Result<Lead, OnboardingError> {
        form.validate()?;
        let lead = Lead::new(
            &form.full_name,
            &form.email,
            form.phone.as_deref(),
            form.note.as_deref(),
        );
        Ok(self.leads.upsert(lead).await?)
    }
}

// ============================================================
// REGISTRATION
// ============================================================

pub struct RegistrationService {
    functions: Arc<dyn FunctionsClient>,
}

impl RegistrationService {
    pub fn new(functions: Arc<dyn FunctionsClient>) -> Self {
        Self { functions }
    }

    /// Create the account through the privileged RPC. Affiliate
    /// redemption is the caller's next step (it needs the returned id
    /// and its failures must not roll back the account).
    pub async fn register(&self, form: &RegistrationForm) -> Result<UserId, OnboardingError> {
        form.validate()?;
        let response = self
            .functions
            .invoke(
                FN_CREATE_USER,
                json!({
                    "email": form.email,
                    "password": form.password,
                    "full_name": form.full_name,
                }),
            )
            .await?;
        parse_user_id(&response)
    }

    /// Remove a rejected or abandoned signup. Admin-only path.
    pub async fn delete_account(&self, user_id: UserId) -> Result<(), OnboardingError> {
        self.functions
            .invoke(FN_DELETE_USER, json!({ "user_id": user_id.to_string() }))
            .await?;
        Ok(())
    }
}

fn parse_user_id(response: &Value) -> Result<UserId, OnboardingError> {
    response
        .get("user_id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| OnboardingError::BadFunctionResponse(response.to_string()))
}

// ============================================================
// FUNDING
// ============================================================

/// What the user needs to make a deposit: where to send funds and the
/// reference to quote.
#[derive(Debug, Clone)]
pub struct DepositInstructions {
    pub wallet: DepositWallet,
    pub reference: String,
}

pub struct FundingService {
    payments: Arc<dyn PaymentStore>,
    withdrawals: Arc<dyn WithdrawalStore>,
    wallets: Arc<dyn WalletStore>,
    objects: Arc<dyn ObjectStore>,
    config: FundingConfig,
}

impl FundingService {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        withdrawals: Arc<dyn WithdrawalStore>,
        wallets: Arc<dyn WalletStore>,
        objects: Arc<dyn ObjectStore>,
        config: FundingConfig,
    ) -> Self {
        Self {
            payments,
            withdrawals,
            wallets,
            objects,
            config,
        }
    }

    /// Active wallet for the pair plus a fresh payment reference.
    pub async fn deposit_instructions(
        &self,
        asset: &str,
        network: &str,
    ) -> Result<DepositInstructions, OnboardingError> {
        let wallet = self
            .wallets
            .active_wallet(asset, network)
            .await?
            .ok_or_else(|| OnboardingError::NoActiveWallet {
                asset: asset.to_string(),
                network: network.to_string(),
            })?;
        Ok(DepositInstructions {
            wallet,
            reference: ulid::Ulid::new().to_string(),
        })
    }

    /// Record a user's deposit claim as a Pending payment. Nothing is
    /// credited here; only admin confirmation credits.
    pub async fn submit_payment(
        &self,
        user_id: UserId,
        asset: &str,
        amount_cents: Cents,
        tx_ref: &str,
        proof: Option<(&str, Vec<u8>, &str)>,
    ) -> Result<Payment, OnboardingError> {
        let mut payment = Payment::pending(user_id, asset, amount_cents);
        payment.tx_ref = Some(tx_ref.to_string());
        if let Some((filename, bytes, content_type)) = proof {
            let path = format!("payment-proofs/{}/{}", payment.id, filename);
            let url = self.objects.upload(&path, bytes, content_type).await?;
            payment.proof_url = Some(url);
        }
        Ok(self.payments.insert(payment).await?)
    }

    /// Insert a Pending withdrawal after advisory checks. The balance
    /// is NOT debited here; the authoritative check and debit happen at
    /// admin completion.
    pub async fn request_withdrawal(
        &self,
        user_id: UserId,
        amount_cents: Cents,
        destination: &str,
        current_balance_cents: Cents,
    ) -> Result<WithdrawalRequest, OnboardingError> {
        if amount_cents < self.config.min_withdrawal_cents {
            return Err(OnboardingError::BelowMinimum {
                min_cents: self.config.min_withdrawal_cents,
            });
        }
        if amount_cents > current_balance_cents {
            return Err(OnboardingError::ExceedsBalance);
        }
        let request = WithdrawalRequest::pending(user_id, amount_cents, destination);
        Ok(self.withdrawals.insert(request).await?)
    }
}
