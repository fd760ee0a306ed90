//! Altivest demo runner
//!
//! Drives the full platform lifecycle against the in-memory backend:
//!
//! ```text
//! ┌────────┐   ┌──────────┐   ┌─────────┐   ┌─────────┐   ┌──────────┐
//! │  Lead  │──▶│ Register │──▶│ Deposit │──▶│ Confirm │──▶│ Activate │
//! └────────┘   └──────────┘   └─────────┘   └─────────┘   └──────────┘
//!                                                              │
//!              ┌──────────┐   ┌──────────┐   ┌───────────┐     │
//!              │  Export  │◀──│ Withdraw │◀──│ Bot trades│◀────┘
//!              └──────────┘   └──────────┘   └───────────┘
//! ```
//!
//! Every step goes through the same services the platform exposes; the
//! run doubles as an executable smoke test of the whole crate.

use std::sync::Arc;
use std::time::Duration;

use altivest::admin::AdminService;
use altivest::admin::export::LedgerExporter;
use altivest::affiliate::AffiliateService;
use altivest::backend::auth::AuthClient;
use altivest::backend::memory::MemoryBackend;
use altivest::backend::store::CreditStore;
use altivest::credit::gating::{AccessDecision, AppRoute};
use altivest::market::sim::SimulatedFeed;
use altivest::models::{DepositWallet, LeadStatus};
use altivest::money;
use altivest::onboarding::{FundingService, LeadForm, LeadService, RegistrationForm, RegistrationService};
use altivest::session::SessionEngine;
use altivest::{EventBus, PlatformEvent};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut config = altivest::AppConfig::load(&env);
    let _log_guard = altivest::logging::init_logging(&config);

    tracing::info!("Starting Altivest demo in {} mode", env);
    println!("=== Altivest: platform lifecycle demo ({}) ===", env);

    // Fast timings so the demo finishes in seconds
    config.credit.debounce_ms = 20;
    config.bot.cadence_secs = 1;
    config.bot.jitter_secs = 0;

    // ============================================================
    // BACKEND + SERVICES
    // ============================================================

    let backend = MemoryBackend::new();
    let bus = EventBus::default();
    let mut events = bus.subscribe();

    let leads = LeadService::new(backend.clone());
    let registration = RegistrationService::new(backend.clone());
    let funding = FundingService::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        backend.clone(),
        config.funding.clone(),
    );
    let affiliates = Arc::new(AffiliateService::new(
        backend.clone(),
        backend.clone(),
        bus.clone(),
        config.affiliate.clone(),
    ));
    let admin = AdminService::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        backend.clone(),
        backend.clone(),
        bus.clone(),
    );
    let exporter = LedgerExporter::new(backend.clone(), backend.clone(), backend.clone());

    // Seed: deposit wallet, an established inviter account
    admin
        .set_deposit_wallet(DepositWallet::new(
            "USDT",
            "TRC20",
            &MemoryBackend::demo_address("USDT", "TRC20"),
        ))
        .await?;
    let inviter_id = backend.seed_user("inviter@altivest.example", "hunter2-hunter2");
    let invite_code = affiliates.code_for(inviter_id).await?;
    println!("Seeded inviter with referral code {}", invite_code.code);

    // Empty ws_url selects the seeded simulation; a real URL starts the
    // websocket ticker with its reconnect loop
    let prices: Arc<dyn altivest::market::PriceFeed> = if config.market.ws_url.is_empty() {
        Arc::new(SimulatedFeed::new(2024))
    } else {
        let ticker = altivest::market::ws::WsTicker::new(
            &config.market.ws_url,
            &config.market.rest_snapshot_url,
            Duration::from_secs(config.market.reconnect_max_backoff_secs),
        );
        tokio::spawn(ticker.clone().run());
        ticker
    };

    let engine = SessionEngine::new(
        backend.bundle(),
        prices,
        affiliates.clone(),
        bus.clone(),
        config.clone(),
    )
    .spawn();

    // ============================================================
    // LEAD -> REGISTRATION
    // ============================================================

    let lead = leads
        .capture(LeadForm {
            full_name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            phone: Some("+49 151 000000".into()),
            note: Some("came in via the landing page".into()),
        })
        .await?;
    println!("Captured lead {} <{}>", lead.full_name, lead.email);

    let form = RegistrationForm {
        email: "ada@example.com".into(),
        password: "correct-horse-battery".into(),
        full_name: "Ada Lovelace".into(),
        affiliate_code: Some(invite_code.code.clone()),
    };
    let user_id = registration.register(&form).await?;
    if let Some(code) = form.affiliate_code.as_deref() {
        affiliates.redeem(code, user_id).await?;
    }
    admin.advance_lead(lead.id, LeadStatus::Converted).await?;
    println!("Registered user {} (referred)", user_id);

    backend.sign_in("ada@example.com", "correct-horse-battery").await?;
    engine.navigate(AppRoute::Dashboard);

    // Unfunded account on the dashboard: the gate pushes to activation
    wait_for(&mut events, |e| {
        matches!(
            e,
            PlatformEvent::RedirectIssued {
                decision: AccessDecision::RedirectToActivation,
                ..
            }
        )
    })
    .await?;
    engine.navigate(AppRoute::Activation);
    println!("Redirected to the activation flow (account locked)");

    // ============================================================
    // DEPOSIT -> CONFIRMATION -> ACTIVATION
    // ============================================================

    let instructions = funding.deposit_instructions("USDT", "TRC20").await?;
    println!(
        "Deposit instructions: send to {} quoting {}",
        instructions.wallet.address, instructions.reference
    );

    // Amounts enter the system as euro strings and are parsed once
    let deposit_cents = money::parse_euros("300.00")?;
    let payment = funding
        .submit_payment(
            user_id,
            "USDT",
            deposit_cents,
            "0xdeadbeef",
            Some(("receipt.png", vec![0xAA; 64], "image/png")),
        )
        .await?;
    println!(
        "Payment {} submitted for {} EUR, awaiting confirmation",
        payment.reference,
        money::format_euros(payment.amount_cents)
    );

    let pending = admin.pending_payments().await?;
    println!("Admin payments desk: {} pending", pending.len());
    admin.confirm_payment(payment.id).await?;
    println!("✅ Admin confirmed the deposit");

    // The balance refresh crosses the threshold; the gate sends the
    // activated account back to the dashboard
    wait_for(&mut events, |e| {
        matches!(
            e,
            PlatformEvent::RedirectIssued {
                decision: AccessDecision::RedirectToDashboard,
                ..
            }
        )
    })
    .await?;
    engine.navigate(AppRoute::Dashboard);
    println!("✅ Account activated, redirected to the dashboard");

    // ============================================================
    // BOT TRADING
    // ============================================================

    println!("Letting the trading bot run...");
    wait_for(&mut events, |e| {
        matches!(e, PlatformEvent::TradeExecuted { .. })
    })
    .await?;
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    // ============================================================
    // WITHDRAWAL -> APPROVAL -> EXPORT
    // ============================================================

    let balance = CreditStore::fetch(backend.as_ref(), user_id)
        .await?
        .map(|r| r.amount_cents())
        .unwrap_or(0);
    let withdrawal = funding
        .request_withdrawal(
            user_id,
            money::parse_euros("50")?,
            "DE89 3704 0044 0532 0130 00",
            balance,
        )
        .await?;
    admin.approve_withdrawal(withdrawal.id).await?;
    println!("✅ Withdrawal {} approved", withdrawal.reference);

    let mut csv = Vec::new();
    let (entries, closing) = exporter.export_csv(user_id, &mut csv).await?;
    print!("{}", String::from_utf8(csv)?);

    // ============================================================
    // SUMMARY
    // ============================================================

    backend.sign_out().await?;
    let inviter_balance = CreditStore::fetch(backend.as_ref(), inviter_id)
        .await?
        .map(|r| r.amount_cents())
        .unwrap_or(0);

    println!("=== Summary ===");
    println!("Ledger entries exported: {}", entries);
    println!("Closing balance:         {} EUR", money::format_euros(closing));
    println!(
        "Inviter bonus received:  {} EUR",
        money::format_euros(inviter_balance)
    );
    println!("Demo complete.");
    Ok(())
}

/// Wait for a matching platform event, bounded so a wiring bug fails the
/// demo instead of hanging it.
async fn wait_for(
    rx: &mut tokio::sync::broadcast::Receiver<PlatformEvent>,
    pred: impl Fn(&PlatformEvent) -> bool,
) -> anyhow::Result<()> {
    let deadline = Duration::from_secs(10);
    tokio::time::timeout(deadline, async {
        loop {
            let event = rx.recv().await?;
            if pred(&event) {
                return anyhow::Ok(());
            }
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("timed out waiting for platform event"))?
}
