//! Affiliate program
//!
//! Each user can mint one referral code; each new user can redeem at
//! most one code at registration. Bonuses for both sides become payable
//! when the invited account ACTIVATES (first confirmed deposit reaching
//! the threshold), not at registration - unfunded referrals pay nothing.
//!
//! Settlement is idempotent: the paid flags are claimed with a
//! store-side compare-and-set, and only the winning claim invokes the
//! privileged credit function. Losing a claim means another settlement
//! pass already paid that side.

use crate::backend::functions::{FN_CREDIT_USER, FN_NOTIFY_USER, FunctionError, FunctionsClient};
use crate::backend::store::{AffiliateStore, StoreError};
use crate::config::AffiliateConfig;
use crate::core_types::{Cents, UserId};
use crate::events::{EventBus, PlatformEvent};
use crate::models::{AffiliateCode, AffiliateInvitation};
use rand::RngCore;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

const CODE_PREFIX: &str = "AV-";

#[derive(Debug, Error)]
pub enum AffiliateError {
    #[error("Unknown affiliate code: {0}")]
    UnknownCode(String),
    #[error("Cannot redeem your own affiliate code")]
    SelfReferral,
    #[error("User was already referred")]
    AlreadyReferred,
    #[error("Store error: {0}")]
    Store(StoreError),
    #[error("Function error: {0}")]
    Function(#[from] FunctionError),
}

impl From<StoreError> for AffiliateError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => AffiliateError::AlreadyReferred,
            other => AffiliateError::Store(other),
        }
    }
}

pub struct AffiliateService {
    affiliates: Arc<dyn AffiliateStore>,
    functions: Arc<dyn FunctionsClient>,
    bus: EventBus,
    config: AffiliateConfig,
}

impl AffiliateService {
    pub fn new(
        affiliates: Arc<dyn AffiliateStore>,
        functions: Arc<dyn FunctionsClient>,
        bus: EventBus,
        config: AffiliateConfig,
    ) -> Self {
        Self {
            affiliates,
            functions,
            bus,
            config,
        }
    }

    /// The user's referral code, minting one on first call. The store's
    /// create-once insert makes concurrent first calls converge on a
    /// single code.
    pub async fn code_for(&self, user_id: UserId) -> Result<AffiliateCode, AffiliateError> {
        if let Some(existing) = self.affiliates.code_for(user_id).await? {
            return Ok(existing);
        }
        let code = mint_code();
        Ok(self.affiliates.insert_code(user_id, &code).await?)
    }

    /// Redeem a code for a freshly registered user. At most one
    /// referral per invited user; self-referral is rejected before
    /// anything is written.
    pub async fn redeem(
        &self,
        code: &str,
        invited_user_id: UserId,
    ) -> Result<AffiliateInvitation, AffiliateError> {
        let owner = self
            .affiliates
            .find_by_code(code)
            .await?
            .ok_or_else(|| AffiliateError::UnknownCode(code.to_string()))?;
        if owner.user_id == invited_user_id {
            return Err(AffiliateError::SelfReferral);
        }
        let invitation = AffiliateInvitation::new(owner.user_id, invited_user_id, &owner.code);
        Ok(self.affiliates.record_invitation(invitation).await?)
    }

    /// Referrals brought in by a user, for their dashboard.
    pub async fn referrals(
        &self,
        inviter_id: UserId,
    ) -> Result<Vec<AffiliateInvitation>, AffiliateError> {
        Ok(self.affiliates.list_for_inviter(inviter_id).await?)
    }

    /// Pay out any unsettled bonuses for a just-activated account.
    /// Safe to call on every activation signal: each side is paid at
    /// most once, and a user without a referral is a no-op.
    pub async fn settle_on_activation(&self, user_id: UserId) -> Result<(), AffiliateError> {
        let Some(invitation) = self.affiliates.fetch_for_invited(user_id).await? else {
            return Ok(());
        };
        if invitation.fully_settled() {
            return Ok(());
        }

        if self.affiliates.claim_inviter_bonus(invitation.id).await? {
            self.pay(
                invitation.id,
                invitation.inviter_id,
                self.config.inviter_bonus_cents,
                "Your referral activated their account",
            )
            .await?;
        }
        if self.affiliates.claim_invited_bonus(invitation.id).await? {
            self.pay(
                invitation.id,
                invitation.invited_user_id,
                self.config.invited_bonus_cents,
                "Welcome bonus for joining via referral",
            )
            .await?;
        }
        Ok(())
    }

    async fn pay(
        &self,
        invitation_id: Uuid,
        beneficiary: UserId,
        amount_cents: Cents,
        subject: &str,
    ) -> Result<(), AffiliateError> {
        self.functions
            .invoke(
                FN_CREDIT_USER,
                json!({
                    "user_id": beneficiary.to_string(),
                    "delta_cents": amount_cents,
                    "reason": "affiliate-bonus",
                }),
            )
            .await?;
        self.functions
            .invoke(
                FN_NOTIFY_USER,
                json!({
                    "user_id": beneficiary.to_string(),
                    "subject": subject,
                }),
            )
            .await?;
        self.bus.publish(PlatformEvent::AffiliateBonusPaid {
            invitation_id,
            beneficiary,
            amount_cents,
        });
        self.bus.publish(PlatformEvent::NotificationSent {
            user_id: beneficiary,
            subject: subject.to_string(),
        });
        Ok(())
    }
}

/// `AV-` followed by 10 uppercase hex chars (5 random bytes).
fn mint_code() -> String {
    let mut bytes = [0u8; 5];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}{}", CODE_PREFIX, hex::encode(bytes).to_uppercase())
}
