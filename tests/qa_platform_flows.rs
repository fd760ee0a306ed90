//! Platform flow QA - the full customer lifecycle wired through the real
//! services, from lead capture to ledger export.

use altivest::admin::AdminService;
use altivest::admin::export::LedgerExporter;
use altivest::affiliate::AffiliateService;
use altivest::backend::auth::AuthClient;
use altivest::backend::memory::MemoryBackend;
use altivest::backend::store::{CreditStore, WithdrawalStore};
use altivest::config::{AffiliateConfig, AppConfig, FundingConfig};
use altivest::credit::gating::{AccessDecision, AppRoute};
use altivest::market::sim::SimulatedFeed;
use altivest::models::{DepositWallet, LeadStatus, PaymentStatus, WithdrawalStatus};
use altivest::onboarding::{
    FundingService, LeadForm, LeadService, RegistrationForm, RegistrationService,
};
use altivest::session::SessionEngine;
use altivest::{EventBus, PlatformEvent};
use std::sync::Arc;
use std::time::Duration;

struct Platform {
    backend: Arc<MemoryBackend>,
    bus: EventBus,
    leads: LeadService,
    registration: RegistrationService,
    funding: FundingService,
    affiliates: Arc<AffiliateService>,
    admin: AdminService,
}

fn platform() -> Platform {
    let backend = MemoryBackend::new();
    let bus = EventBus::default();
    Platform {
        leads: LeadService::new(backend.clone()),
        registration: RegistrationService::new(backend.clone()),
        funding: FundingService::new(
            backend.clone(),
            backend.clone(),
            backend.clone(),
            backend.clone(),
            FundingConfig::default(),
        ),
        affiliates: Arc::new(AffiliateService::new(
            backend.clone(),
            backend.clone(),
            bus.clone(),
            AffiliateConfig::default(),
        )),
        admin: AdminService::new(
            backend.clone(),
            backend.clone(),
            backend.clone(),
            backend.clone(),
            backend.clone(),
            bus.clone(),
        ),
        backend,
        bus,
    }
}

async fn wait_for(
    rx: &mut tokio::sync::broadcast::Receiver<PlatformEvent>,
    pred: impl Fn(&PlatformEvent) -> bool,
) -> PlatformEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for platform event")
}

#[tokio::test]
async fn qa_tc_full_lifecycle() {
    let p = platform();
    let mut events = p.bus.subscribe();

    // --- Seed: wallet + an established inviter ---
    p.admin
        .set_deposit_wallet(DepositWallet::new(
            "USDT",
            "TRC20",
            &MemoryBackend::demo_address("USDT", "TRC20"),
        ))
        .await
        .unwrap();
    let inviter_id = p.backend.seed_user("inviter@x.y", "pw-pw-pw-pw");
    let invite_code = p.affiliates.code_for(inviter_id).await.unwrap();

    // --- Lead capture -> registration with referral ---
    let lead = p
        .leads
        .capture(LeadForm {
            full_name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            phone: None,
            note: Some("landing page".into()),
        })
        .await
        .unwrap();

    let user_id = p
        .registration
        .register(&RegistrationForm {
            email: "ada@example.com".into(),
            password: "correct-horse".into(),
            full_name: "Ada Lovelace".into(),
            affiliate_code: Some(invite_code.code.clone()),
        })
        .await
        .unwrap();
    p.affiliates.redeem(&invite_code.code, user_id).await.unwrap();
    p.admin
        .advance_lead(lead.id, LeadStatus::Converted)
        .await
        .unwrap();

    // --- Session + gating ---
    let mut config = AppConfig::default();
    config.credit.debounce_ms = 10;
    config.bot.cadence_secs = 1;
    config.bot.jitter_secs = 0;
    let engine = SessionEngine::new(
        p.backend.bundle(),
        Arc::new(SimulatedFeed::new(99)),
        p.affiliates.clone(),
        p.bus.clone(),
        config,
    )
    .spawn();

    p.backend.sign_in("ada@example.com", "correct-horse").await.unwrap();
    engine.navigate(AppRoute::Dashboard);
    wait_for(&mut events, |e| {
        matches!(
            e,
            PlatformEvent::RedirectIssued {
                decision: AccessDecision::RedirectToActivation,
                ..
            }
        )
    })
    .await;
    engine.navigate(AppRoute::Activation);

    // --- Deposit -> admin confirmation -> activation ---
    let instructions = p.funding.deposit_instructions("USDT", "TRC20").await.unwrap();
    assert!(!instructions.wallet.address.is_empty());

    let payment = p
        .funding
        .submit_payment(user_id, "USDT", 30_000, "0xabc", None)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);

    p.admin.confirm_payment(payment.id).await.unwrap();
    wait_for(&mut events, |e| {
        matches!(
            e,
            PlatformEvent::RedirectIssued {
                decision: AccessDecision::RedirectToDashboard,
                ..
            }
        )
    })
    .await;
    engine.navigate(AppRoute::Dashboard);

    // --- Affiliate settlement paid both sides exactly once ---
    wait_for(&mut events, |e| {
        matches!(e, PlatformEvent::AffiliateBonusPaid { .. })
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    let inviter_balance = CreditStore::fetch(p.backend.as_ref(), inviter_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        inviter_balance.amount_cents(),
        AffiliateConfig::default().inviter_bonus_cents
    );

    // --- The bot trades on the activated account ---
    wait_for(&mut events, |e| {
        matches!(e, PlatformEvent::TradeExecuted { .. })
    })
    .await;

    // --- Sign out tears the session down; balance stops moving ---
    p.backend.sign_out().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let settled = CreditStore::fetch(p.backend.as_ref(), user_id)
        .await
        .unwrap()
        .unwrap()
        .amount_cents();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let after = CreditStore::fetch(p.backend.as_ref(), user_id)
        .await
        .unwrap()
        .unwrap()
        .amount_cents();
    assert_eq!(settled, after, "balance moved after sign-out");

    // --- Withdrawal -> approval debits exactly once ---
    let withdrawal = p
        .funding
        .request_withdrawal(user_id, 5_000, "DE89", after)
        .await
        .unwrap();
    p.admin.approve_withdrawal(withdrawal.id).await.unwrap();
    let err = p.admin.approve_withdrawal(withdrawal.id).await;
    assert!(err.is_err(), "second approval must fail");

    let final_balance = CreditStore::fetch(p.backend.as_ref(), user_id)
        .await
        .unwrap()
        .unwrap()
        .amount_cents();
    assert_eq!(final_balance, after - 5_000);

    // --- Ledger export reconciles with the live balance ---
    let exporter = LedgerExporter::new(p.backend.clone(), p.backend.clone(), p.backend.clone());
    let mut csv = Vec::new();
    let (entries, closing) = exporter.export_csv(user_id, &mut csv).await.unwrap();
    assert!(entries >= 3); // deposit + at least one trade pair + withdrawal
    assert_eq!(closing, final_balance);
}

#[tokio::test]
async fn qa_tc_payment_decisions_are_exactly_once() {
    let p = platform();
    let user_id = p.backend.seed_user("a@b.c", "pw");

    let payment = p
        .funding
        .submit_payment(user_id, "USDT", 30_000, "0xabc", None)
        .await
        .unwrap();

    // Concurrent confirmation attempts: exactly one credits
    let (a, b) = tokio::join!(
        p.admin.confirm_payment(payment.id),
        p.admin.confirm_payment(payment.id)
    );
    assert!(a.is_ok() != b.is_ok(), "exactly one decision must win");

    let balance = CreditStore::fetch(p.backend.as_ref(), user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(balance.amount_cents(), 30_000);
}

#[tokio::test]
async fn qa_tc_rejected_payment_cannot_be_completed_later() {
    let p = platform();
    let user_id = p.backend.seed_user("a@b.c", "pw");

    let payment = p
        .funding
        .submit_payment(user_id, "USDT", 30_000, "0xabc", None)
        .await
        .unwrap();
    p.admin.reject_payment(payment.id, "no matching transfer").await.unwrap();

    let err = p.admin.confirm_payment(payment.id).await;
    assert!(err.is_err());
    assert!(CreditStore::fetch(p.backend.as_ref(), user_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn qa_tc_withdrawal_exceeding_balance_stays_pending() {
    let p = platform();
    let user_id = p.backend.seed_user("a@b.c", "pw");
    p.backend.apply_delta(user_id, 10_000).await.unwrap();

    let request = WithdrawalStore::insert(
        p.backend.as_ref(),
        altivest::models::WithdrawalRequest::pending(user_id, 50_000, "DE89"),
    )
    .await
    .unwrap();

    assert!(p.admin.approve_withdrawal(request.id).await.is_err());

    // Untouched: still pending, balance intact, and rejectable
    let pending = WithdrawalStore::list_by_status(p.backend.as_ref(), WithdrawalStatus::Pending)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    let rejected = p
        .admin
        .reject_withdrawal(request.id, "insufficient balance")
        .await
        .unwrap();
    assert_eq!(rejected.status, WithdrawalStatus::Rejected);
    let balance = CreditStore::fetch(p.backend.as_ref(), user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(balance.amount_cents(), 10_000);
}
