//! In-memory collaborator backend (feature `mock-backend`)
//!
//! This adapter stands in for the whole backend-as-a-service in tests and
//! the demo binary. It models the AUTHORITATIVE side faithfully: all table
//! mutations happen under one lock (the "transaction"), balance deltas are
//! applied atomically with the row transition that justifies them, and
//! every mutation emits a change event on a broadcast feed - values are
//! never carried in the events, matching the realtime contract.
//!
//! MUST be disabled in production builds.

use crate::backend::auth::{AuthClient, AuthError, Session, SessionEvent};
use crate::backend::functions::{
    FN_CREATE_USER, FN_CREDIT_USER, FN_DELETE_USER, FN_NOTIFY_USER, FunctionError, FunctionsClient,
};
use crate::backend::realtime::{
    ChangeEvent, ChangeKind, ChangeStream, ChangeSubscription, SubscriptionError, UserScope,
    WatchedTable,
};
use crate::backend::storage::{ObjectStore, StorageError};
use crate::backend::store::{
    AffiliateStore, CreditStore, LeadStore, PaymentStore, StoreError, TradeStore, WalletStore,
    WithdrawalStore,
};
use crate::backend::Backend;
use crate::core_types::{Cents, UserId};
use crate::models::{
    AffiliateCode, AffiliateInvitation, BalanceRecord, DepositWallet, Lead, LeadStatus, Payment,
    PaymentStatus, TradeExecution, WithdrawalRequest, WithdrawalStatus,
};
use async_trait::async_trait;
use chrono::Utc;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

/// A registered auth user (credentials live here in the mock only).
#[derive(Debug, Clone)]
struct AuthUser {
    email: String,
    password: String,
}

/// All tables behind one lock - a mutation plus its coupled balance delta
/// commit together or not at all, like the real store's transaction.
#[derive(Default)]
struct Tables {
    users: FxHashMap<UserId, AuthUser>,
    credits: FxHashMap<UserId, BalanceRecord>,
    payments: FxHashMap<Uuid, Payment>,
    trades: Vec<TradeExecution>,
    withdrawals: FxHashMap<Uuid, WithdrawalRequest>,
    codes: FxHashMap<UserId, AffiliateCode>,
    invitations: FxHashMap<Uuid, AffiliateInvitation>,
    leads: FxHashMap<Uuid, Lead>,
    wallets: Vec<DepositWallet>,
}

/// A recorded privileged-function call, for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedInvocation {
    pub name: String,
    pub payload: Value,
}

pub struct MemoryBackend {
    tables: Mutex<Tables>,
    changes_tx: broadcast::Sender<ChangeEvent>,
    session_tx: broadcast::Sender<SessionEvent>,
    current_session: Mutex<Option<Session>>,
    invocations: Mutex<Vec<RecordedInvocation>>,
    objects: Mutex<FxHashMap<String, (usize, String)>>,
    /// Fault injection: when set, credit reads/writes fail with a
    /// backend error (drives the LookupFailed and demotion paths).
    fail_credit_ops: AtomicBool,
    /// Fault injection: when set, `subscribe` refuses to establish.
    fail_subscriptions: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        let (changes_tx, _) = broadcast::channel(512);
        let (session_tx, _) = broadcast::channel(32);
        Arc::new(Self {
            tables: Mutex::new(Tables::default()),
            changes_tx,
            session_tx,
            current_session: Mutex::new(None),
            invocations: Mutex::new(Vec::new()),
            objects: Mutex::new(FxHashMap::default()),
            fail_credit_ops: AtomicBool::new(false),
            fail_subscriptions: AtomicBool::new(false),
        })
    }

    /// Bundle this backend into collaborator handles.
    pub fn bundle(self: &Arc<Self>) -> Backend {
        Backend {
            auth: self.clone(),
            credits: self.clone(),
            payments: self.clone(),
            trades: self.clone(),
            withdrawals: self.clone(),
            affiliates: self.clone(),
            leads: self.clone(),
            wallets: self.clone(),
            changes: self.clone(),
            functions: self.clone(),
            objects: self.clone(),
        }
    }

    fn lock_tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().expect("BUG: tables lock poisoned")
    }

    fn emit(&self, table: WatchedTable, kind: ChangeKind, user_id: UserId) {
        // No subscribers is fine
        let _ = self.changes_tx.send(ChangeEvent {
            table,
            kind,
            user_id,
        });
    }

    fn check_credit_fault(&self) -> Result<(), StoreError> {
        if self.fail_credit_ops.load(Ordering::Relaxed) {
            return Err(StoreError::Backend("injected credit fault".into()));
        }
        Ok(())
    }

    /// Fault injection switch for tests.
    pub fn set_credit_ops_failing(&self, failing: bool) {
        self.fail_credit_ops.store(failing, Ordering::Relaxed);
    }

    /// Fault injection switch for tests.
    pub fn set_subscriptions_failing(&self, failing: bool) {
        self.fail_subscriptions.store(failing, Ordering::Relaxed);
    }

    /// Recorded privileged-function calls, oldest first.
    pub fn recorded_invocations(&self) -> Vec<RecordedInvocation> {
        self.invocations
            .lock()
            .expect("BUG: invocations lock poisoned")
            .clone()
    }

    /// Register a user directly (demo seeding path; production goes
    /// through the `create-user` function).
    pub fn seed_user(&self, email: &str, password: &str) -> UserId {
        let user_id = Uuid::new_v4();
        self.lock_tables().users.insert(
            user_id,
            AuthUser {
                email: email.to_lowercase(),
                password: password.to_string(),
            },
        );
        user_id
    }

    /// Deterministic demo wallet address for an (asset, network) pair.
    pub fn demo_address(asset: &str, network: &str) -> String {
        let hash = md5::compute(format!("{}_{}", asset.to_lowercase(), network.to_lowercase()));
        format!("0x{:x}", hash)
    }

    /// Count of balance-affecting rows, for demo summaries.
    pub fn table_counts(&self) -> (usize, usize, usize) {
        let t = self.lock_tables();
        (t.payments.len(), t.trades.len(), t.withdrawals.len())
    }

    /// Apply a delta inside an already-held lock. Shared by the credit
    /// trigger paths (payment completion, trade insert, withdrawal
    /// completion) and `credit-user`.
    fn apply_delta_locked(
        tables: &mut Tables,
        user_id: UserId,
        delta_cents: Cents,
    ) -> Result<BalanceRecord, StoreError> {
        let record = tables
            .credits
            .entry(user_id)
            .or_insert_with(|| BalanceRecord::zero(user_id));
        record
            .apply_delta(delta_cents)
            .map_err(|e| match e {
                "Insufficient funds" => StoreError::InsufficientFunds,
                other => StoreError::Backend(other.to_string()),
            })?;
        Ok(*record)
    }
}

// ============================================================
// CreditStore
// ============================================================

#[async_trait]
impl CreditStore for MemoryBackend {
    async fn fetch(&self, user_id: UserId) -> Result<Option<BalanceRecord>, StoreError> {
        self.check_credit_fault()?;
        Ok(self.lock_tables().credits.get(&user_id).copied())
    }

    async fn init_zero(&self, user_id: UserId) -> Result<bool, StoreError> {
        self.check_credit_fault()?;
        let created = {
            let mut tables = self.lock_tables();
            if tables.credits.contains_key(&user_id) {
                false
            } else {
                tables.credits.insert(user_id, BalanceRecord::zero(user_id));
                true
            }
        };
        if created {
            self.emit(WatchedTable::UserCredits, ChangeKind::Insert, user_id);
        }
        Ok(created)
    }

    async fn apply_delta(
        &self,
        user_id: UserId,
        delta_cents: Cents,
    ) -> Result<BalanceRecord, StoreError> {
        self.check_credit_fault()?;
        let record = {
            let mut tables = self.lock_tables();
            Self::apply_delta_locked(&mut tables, user_id, delta_cents)?
        };
        self.emit(WatchedTable::UserCredits, ChangeKind::Update, user_id);
        Ok(record)
    }
}

// ============================================================
// PaymentStore
// ============================================================

#[async_trait]
impl PaymentStore for MemoryBackend {
    async fn insert(&self, payment: Payment) -> Result<Payment, StoreError> {
        let user_id = payment.user_id;
        {
            let mut tables = self.lock_tables();
            tables.payments.insert(payment.id, payment.clone());
        }
        self.emit(WatchedTable::Payments, ChangeKind::Insert, user_id);
        Ok(payment)
    }

    async fn fetch(&self, id: Uuid) -> Result<Payment, StoreError> {
        self.lock_tables()
            .payments
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Payment>, StoreError> {
        let mut rows: Vec<Payment> = self
            .lock_tables()
            .payments
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.created_at);
        Ok(rows)
    }

    async fn list_by_status(&self, status: PaymentStatus) -> Result<Vec<Payment>, StoreError> {
        let mut rows: Vec<Payment> = self
            .lock_tables()
            .payments
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.created_at);
        Ok(rows)
    }

    async fn mark_decided(&self, id: Uuid, status: PaymentStatus) -> Result<Payment, StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::Conflict("decision must be terminal".into()));
        }
        // Status flip and credit delta commit under the same lock - the
        // "backend trigger" of the real store, and the ONLY crediting
        // path for deposits.
        let payment = {
            let mut tables = self.lock_tables();
            let payment = tables.payments.get(&id).cloned().ok_or(StoreError::NotFound)?;
            if payment.status.is_terminal() {
                return Err(StoreError::AlreadyDecided(payment.status.as_str().into()));
            }
            if status == PaymentStatus::Completed {
                Self::apply_delta_locked(&mut tables, payment.user_id, payment.amount_cents)?;
            }
            let stored = tables
                .payments
                .get_mut(&id)
                .ok_or(StoreError::NotFound)?;
            stored.status = status;
            stored.decided_at = Some(Utc::now());
            stored.clone()
        };
        self.emit(WatchedTable::Payments, ChangeKind::Update, payment.user_id);
        if status == PaymentStatus::Completed {
            self.emit(WatchedTable::UserCredits, ChangeKind::Update, payment.user_id);
        }
        Ok(payment)
    }
}

// ============================================================
// TradeStore
// ============================================================

#[async_trait]
impl TradeStore for MemoryBackend {
    async fn insert(&self, trade: TradeExecution) -> Result<TradeExecution, StoreError> {
        let user_id = trade.user_id;
        {
            let mut tables = self.lock_tables();
            // Delta first: a buy that would overdraw inserts nothing
            Self::apply_delta_locked(&mut tables, user_id, trade.balance_delta())?;
            tables.trades.push(trade.clone());
        }
        self.emit(WatchedTable::TradeSimulations, ChangeKind::Insert, user_id);
        self.emit(WatchedTable::UserCredits, ChangeKind::Update, user_id);
        Ok(trade)
    }

    async fn list_recent(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<TradeExecution>, StoreError> {
        let tables = self.lock_tables();
        let mut rows: Vec<TradeExecution> = tables
            .trades
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        rows.truncate(limit);
        Ok(rows)
    }
}

// ============================================================
// WithdrawalStore
// ============================================================

#[async_trait]
impl WithdrawalStore for MemoryBackend {
    async fn insert(&self, request: WithdrawalRequest) -> Result<WithdrawalRequest, StoreError> {
        let user_id = request.user_id;
        {
            let mut tables = self.lock_tables();
            tables.withdrawals.insert(request.id, request.clone());
        }
        self.emit(WatchedTable::Withdrawals, ChangeKind::Insert, user_id);
        Ok(request)
    }

    async fn fetch(&self, id: Uuid) -> Result<WithdrawalRequest, StoreError> {
        self.lock_tables()
            .withdrawals
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<WithdrawalRequest>, StoreError> {
        let mut rows: Vec<WithdrawalRequest> = self
            .lock_tables()
            .withdrawals
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|w| w.created_at);
        Ok(rows)
    }

    async fn list_by_status(
        &self,
        status: WithdrawalStatus,
    ) -> Result<Vec<WithdrawalRequest>, StoreError> {
        let mut rows: Vec<WithdrawalRequest> = self
            .lock_tables()
            .withdrawals
            .values()
            .filter(|w| w.status == status)
            .cloned()
            .collect();
        rows.sort_by_key(|w| w.created_at);
        Ok(rows)
    }

    async fn mark_decided(
        &self,
        id: Uuid,
        status: WithdrawalStatus,
    ) -> Result<WithdrawalRequest, StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::Conflict("decision must be terminal".into()));
        }
        let request = {
            let mut tables = self.lock_tables();
            let request = tables
                .withdrawals
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound)?;
            if request.status.is_terminal() {
                return Err(StoreError::AlreadyDecided(request.status.as_str().into()));
            }
            if status == WithdrawalStatus::Completed {
                // InsufficientFunds aborts here: the request stays Pending
                Self::apply_delta_locked(&mut tables, request.user_id, -request.amount_cents)?;
            }
            let stored = tables
                .withdrawals
                .get_mut(&id)
                .ok_or(StoreError::NotFound)?;
            stored.status = status;
            stored.decided_at = Some(Utc::now());
            stored.clone()
        };
        self.emit(WatchedTable::Withdrawals, ChangeKind::Update, request.user_id);
        if status == WithdrawalStatus::Completed {
            self.emit(WatchedTable::UserCredits, ChangeKind::Update, request.user_id);
        }
        Ok(request)
    }
}

// ============================================================
// AffiliateStore
// ============================================================

#[async_trait]
impl AffiliateStore for MemoryBackend {
    async fn insert_code(&self, user_id: UserId, code: &str) -> Result<AffiliateCode, StoreError> {
        let mut tables = self.lock_tables();
        if let Some(existing) = tables.codes.get(&user_id) {
            return Ok(existing.clone());
        }
        if tables.codes.values().any(|c| c.code == code) {
            return Err(StoreError::Conflict("affiliate code taken".into()));
        }
        let record = AffiliateCode {
            user_id,
            code: code.to_string(),
            created_at: Utc::now(),
        };
        tables.codes.insert(user_id, record.clone());
        Ok(record)
    }

    async fn code_for(&self, user_id: UserId) -> Result<Option<AffiliateCode>, StoreError> {
        Ok(self.lock_tables().codes.get(&user_id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<AffiliateCode>, StoreError> {
        Ok(self
            .lock_tables()
            .codes
            .values()
            .find(|c| c.code == code)
            .cloned())
    }

    async fn record_invitation(
        &self,
        invitation: AffiliateInvitation,
    ) -> Result<AffiliateInvitation, StoreError> {
        let mut tables = self.lock_tables();
        let duplicate = tables
            .invitations
            .values()
            .any(|i| i.invited_user_id == invitation.invited_user_id);
        if duplicate {
            return Err(StoreError::Conflict(
                "invited user already has an accepted invitation".into(),
            ));
        }
        tables.invitations.insert(invitation.id, invitation.clone());
        Ok(invitation)
    }

    async fn fetch_for_invited(
        &self,
        invited_user_id: UserId,
    ) -> Result<Option<AffiliateInvitation>, StoreError> {
        Ok(self
            .lock_tables()
            .invitations
            .values()
            .find(|i| i.invited_user_id == invited_user_id)
            .cloned())
    }

    async fn list_for_inviter(
        &self,
        inviter_id: UserId,
    ) -> Result<Vec<AffiliateInvitation>, StoreError> {
        let mut rows: Vec<AffiliateInvitation> = self
            .lock_tables()
            .invitations
            .values()
            .filter(|i| i.inviter_id == inviter_id)
            .cloned()
            .collect();
        rows.sort_by_key(|i| i.invited_at);
        Ok(rows)
    }

    async fn claim_inviter_bonus(&self, invitation_id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.lock_tables();
        let inv = tables
            .invitations
            .get_mut(&invitation_id)
            .ok_or(StoreError::NotFound)?;
        if inv.bonus_paid_to_inviter {
            return Ok(false); // CAS lost: already claimed
        }
        inv.bonus_paid_to_inviter = true;
        inv.bonus_paid_at = Some(Utc::now());
        Ok(true)
    }

    async fn claim_invited_bonus(&self, invitation_id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.lock_tables();
        let inv = tables
            .invitations
            .get_mut(&invitation_id)
            .ok_or(StoreError::NotFound)?;
        if inv.bonus_paid_to_invited {
            return Ok(false);
        }
        inv.bonus_paid_to_invited = true;
        inv.bonus_paid_at = Some(Utc::now());
        Ok(true)
    }
}

// ============================================================
// LeadStore / WalletStore
// ============================================================

#[async_trait]
impl LeadStore for MemoryBackend {
    async fn upsert(&self, lead: Lead) -> Result<Lead, StoreError> {
        let mut tables = self.lock_tables();
        let existing_id = tables
            .leads
            .values()
            .find(|l| l.email == lead.email)
            .map(|l| l.id);
        match existing_id {
            Some(id) => {
                let stored = tables.leads.get_mut(&id).ok_or(StoreError::NotFound)?;
                stored.note = lead.note;
                stored.phone = lead.phone;
                stored.updated_at = Utc::now();
                Ok(stored.clone())
            }
            None => {
                tables.leads.insert(lead.id, lead.clone());
                Ok(lead)
            }
        }
    }

    async fn list(&self, status: Option<LeadStatus>) -> Result<Vec<Lead>, StoreError> {
        let mut rows: Vec<Lead> = self
            .lock_tables()
            .leads
            .values()
            .filter(|l| status.is_none_or(|s| l.status == s))
            .cloned()
            .collect();
        rows.sort_by_key(|l| l.created_at);
        Ok(rows)
    }

    async fn update_status(&self, id: Uuid, status: LeadStatus) -> Result<Lead, StoreError> {
        let mut tables = self.lock_tables();
        let lead = tables.leads.get_mut(&id).ok_or(StoreError::NotFound)?;
        lead.status = status;
        lead.updated_at = Utc::now();
        Ok(lead.clone())
    }
}

#[async_trait]
impl WalletStore for MemoryBackend {
    async fn upsert_wallet(&self, wallet: DepositWallet) -> Result<DepositWallet, StoreError> {
        let mut tables = self.lock_tables();
        if wallet.active {
            // At most one active wallet per (asset, network)
            for existing in tables
                .wallets
                .iter_mut()
                .filter(|w| w.asset == wallet.asset && w.network == wallet.network)
            {
                existing.active = false;
            }
        }
        match tables.wallets.iter_mut().find(|w| w.id == wallet.id) {
            Some(existing) => *existing = wallet.clone(),
            None => tables.wallets.push(wallet.clone()),
        }
        Ok(wallet)
    }

    async fn active_wallet(
        &self,
        asset: &str,
        network: &str,
    ) -> Result<Option<DepositWallet>, StoreError> {
        Ok(self
            .lock_tables()
            .wallets
            .iter()
            .find(|w| w.active && w.asset == asset && w.network == network)
            .cloned())
    }

    async fn list_wallets(&self) -> Result<Vec<DepositWallet>, StoreError> {
        Ok(self.lock_tables().wallets.clone())
    }
}

// ============================================================
// ChangeStream
// ============================================================

#[async_trait]
impl ChangeStream for MemoryBackend {
    async fn subscribe(
        &self,
        table: WatchedTable,
        scope: UserScope,
    ) -> Result<ChangeSubscription, SubscriptionError> {
        if self.fail_subscriptions.load(Ordering::Relaxed) {
            return Err(SubscriptionError::Setup("injected subscription fault".into()));
        }
        let mut feed = self.changes_tx.subscribe();
        let (tx, rx) = mpsc::channel(64);
        // Server-side filtering: only matching events reach the consumer
        let forward_task = tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(event) if event.table == table && scope.matches(event.user_id) => {
                        if tx.send(event).await.is_err() {
                            break; // consumer gone
                        }
                    }
                    Ok(_) => {}
                    // Lagged is fine: events are triggers, not state
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(ChangeSubscription::new(rx, forward_task))
    }
}

// ============================================================
// AuthClient
// ============================================================

#[async_trait]
impl AuthClient for MemoryBackend {
    async fn current_user(&self) -> Option<Session> {
        self.current_session
            .lock()
            .expect("BUG: session lock poisoned")
            .clone()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = email.to_lowercase();
        let session = {
            let tables = self.lock_tables();
            let (user_id, _) = tables
                .users
                .iter()
                .find(|(_, u)| u.email == email && u.password == password)
                .ok_or(AuthError::InvalidCredentials)?;
            Session {
                user_id: *user_id,
                email,
            }
        };
        *self
            .current_session
            .lock()
            .expect("BUG: session lock poisoned") = Some(session.clone());
        let _ = self.session_tx.send(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let session = self
            .current_session
            .lock()
            .expect("BUG: session lock poisoned")
            .take()
            .ok_or(AuthError::NotSignedIn)?;
        let _ = self.session_tx.send(SessionEvent::SignedOut {
            user_id: session.user_id,
        });
        Ok(())
    }

    fn subscribe_sessions(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_tx.subscribe()
    }
}

// ============================================================
// FunctionsClient
// ============================================================

fn payload_user_id(payload: &Value) -> Result<UserId, FunctionError> {
    payload
        .get("user_id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| FunctionError::BadRequest("missing or invalid user_id".into()))
}

#[async_trait]
impl FunctionsClient for MemoryBackend {
    async fn invoke(&self, name: &str, payload: Value) -> Result<Value, FunctionError> {
        self.invocations
            .lock()
            .expect("BUG: invocations lock poisoned")
            .push(RecordedInvocation {
                name: name.to_string(),
                payload: payload.clone(),
            });

        match name {
            FN_CREATE_USER => {
                let email = payload
                    .get("email")
                    .and_then(Value::as_str)
                    .ok_or_else(|| FunctionError::BadRequest("missing email".into()))?
                    .to_lowercase();
                let password = payload
                    .get("password")
                    .and_then(Value::as_str)
                    .ok_or_else(|| FunctionError::BadRequest("missing password".into()))?;
                {
                    let tables = self.lock_tables();
                    if tables.users.values().any(|u| u.email == email) {
                        return Err(FunctionError::BadRequest("email already registered".into()));
                    }
                }
                let user_id = self.seed_user(&email, password);
                Ok(json!({ "user_id": user_id.to_string() }))
            }
            FN_DELETE_USER => {
                let user_id = payload_user_id(&payload)?;
                let removed = {
                    let mut tables = self.lock_tables();
                    tables.credits.remove(&user_id);
                    tables.users.remove(&user_id).is_some()
                };
                Ok(json!({ "deleted": removed }))
            }
            FN_CREDIT_USER => {
                let user_id = payload_user_id(&payload)?;
                let delta_cents = payload
                    .get("delta_cents")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| FunctionError::BadRequest("missing delta_cents".into()))?;
                let record = self
                    .apply_delta(user_id, delta_cents)
                    .await
                    .map_err(|e| FunctionError::Backend(e.to_string()))?;
                Ok(json!({ "balance_cents": record.amount_cents() }))
            }
            FN_NOTIFY_USER => {
                // Outbound delivery is external; the mock records and acks
                let _ = payload_user_id(&payload)?;
                Ok(json!({ "delivered": true }))
            }
            other => Err(FunctionError::UnknownFunction(other.to_string())),
        }
    }
}

// ============================================================
// ObjectStore
// ============================================================

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::Rejected("empty upload".into()));
        }
        self.objects
            .lock()
            .expect("BUG: objects lock poisoned")
            .insert(path.to_string(), (bytes.len(), content_type.to_string()));
        Ok(format!("mock://storage/{}", path))
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_payment_completion_credits_exactly_once() {
        let backend = MemoryBackend::new();
        let user_id = backend.seed_user("a@b.c", "pw");

        let payment = PaymentStore::insert(
            backend.as_ref(),
            Payment::pending(user_id, "USDT", 30_000),
        )
        .await
        .unwrap();

        PaymentStore::mark_decided(backend.as_ref(), payment.id, PaymentStatus::Completed)
            .await
            .unwrap();
        let balance = CreditStore::fetch(backend.as_ref(), user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(balance.amount_cents(), 30_000);

        // Second decision attempt: no effect, explicit error
        let err =
            PaymentStore::mark_decided(backend.as_ref(), payment.id, PaymentStatus::Completed)
                .await
                .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyDecided(_)));
        let balance = CreditStore::fetch(backend.as_ref(), user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(balance.amount_cents(), 30_000);
    }

    #[tokio::test]
    async fn test_rejected_payment_never_credits() {
        let backend = MemoryBackend::new();
        let user_id = backend.seed_user("a@b.c", "pw");

        let payment = PaymentStore::insert(
            backend.as_ref(),
            Payment::pending(user_id, "USDT", 10_000),
        )
        .await
        .unwrap();
        PaymentStore::mark_decided(backend.as_ref(), payment.id, PaymentStatus::Rejected)
            .await
            .unwrap();

        assert!(CreditStore::fetch(backend.as_ref(), user_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_overdrawing_buy_inserts_nothing() {
        let backend = MemoryBackend::new();
        let user_id = backend.seed_user("a@b.c", "pw");
        backend.apply_delta(user_id, 5_000).await.unwrap();

        let trade = TradeExecution::new(
            user_id,
            "BTC-EUR",
            crate::models::TradeSide::Buy,
            rust_decimal::Decimal::ONE,
            rust_decimal::Decimal::from(100),
            10_000,
        );
        let err = TradeStore::insert(backend.as_ref(), trade).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientFunds));

        assert!(backend.list_recent(user_id, 10).await.unwrap().is_empty());
        let balance = CreditStore::fetch(backend.as_ref(), user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(balance.amount_cents(), 5_000);
    }

    #[tokio::test]
    async fn test_insufficient_withdrawal_stays_pending() {
        let backend = MemoryBackend::new();
        let user_id = backend.seed_user("a@b.c", "pw");
        backend.apply_delta(user_id, 4_000).await.unwrap();

        let request = WithdrawalStore::insert(
            backend.as_ref(),
            WithdrawalRequest::pending(user_id, 5_000, "DE00 1234"),
        )
        .await
        .unwrap();

        let err = WithdrawalStore::mark_decided(
            backend.as_ref(),
            request.id,
            WithdrawalStatus::Completed,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::InsufficientFunds));

        let stored = WithdrawalStore::fetch(backend.as_ref(), request.id)
            .await
            .unwrap();
        assert_eq!(stored.status, WithdrawalStatus::Pending);
    }

    #[tokio::test]
    async fn test_change_events_scoped_by_table_and_user() {
        let backend = MemoryBackend::new();
        let watched = backend.seed_user("a@b.c", "pw");
        let other = backend.seed_user("x@y.z", "pw");

        let mut sub = backend
            .subscribe(WatchedTable::UserCredits, UserScope::User(watched))
            .await
            .unwrap();

        backend.apply_delta(other, 1_000).await.unwrap();
        backend.apply_delta(watched, 2_000).await.unwrap();

        let event = sub.next().await.unwrap();
        assert_eq!(event.user_id, watched);
        assert_eq!(event.table, WatchedTable::UserCredits);
    }

    #[tokio::test]
    async fn test_bonus_claim_is_compare_and_set() {
        let backend = MemoryBackend::new();
        let inviter = backend.seed_user("inviter@x.y", "pw");
        let invited = backend.seed_user("invited@x.y", "pw");

        let inv = backend
            .record_invitation(AffiliateInvitation::new(inviter, invited, "AV-AAAA"))
            .await
            .unwrap();

        assert!(backend.claim_inviter_bonus(inv.id).await.unwrap());
        assert!(!backend.claim_inviter_bonus(inv.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_one_active_wallet_per_pair() {
        let backend = MemoryBackend::new();
        backend
            .upsert_wallet(DepositWallet::new("USDT", "TRC20", "addr-1"))
            .await
            .unwrap();
        backend
            .upsert_wallet(DepositWallet::new("USDT", "TRC20", "addr-2"))
            .await
            .unwrap();

        let active = backend.active_wallet("USDT", "TRC20").await.unwrap().unwrap();
        assert_eq!(active.address, "addr-2");
        let all = backend.list_wallets().await.unwrap();
        assert_eq!(all.iter().filter(|w| w.active).count(), 1);
    }

    #[tokio::test]
    async fn test_lead_upsert_idempotent_on_email() {
        let backend = MemoryBackend::new();
        backend
            .upsert(Lead::new("Ada", "ada@example.com", None, Some("first")))
            .await
            .unwrap();
        backend
            .upsert(Lead::new("Ada", "Ada@Example.com", None, Some("second")))
            .await
            .unwrap();

        let leads = backend.list(None).await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].note.as_deref(), Some("second"));
    }
}
