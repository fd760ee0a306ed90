//! External collaborator interfaces
//!
//! Everything the backend-as-a-service provides - auth, relational tables,
//! realtime change delivery, privileged serverless functions, object
//! storage - is consumed through the narrow traits in this module. The
//! crate never talks to a concrete backend directly: a [`Backend`] bundle
//! is built once at startup and passed down explicitly (no module-level
//! client globals, no import-time side effects).
//!
//! Two adapters ship with the crate:
//! - [`memory`] (feature `mock-backend`): in-memory backend for tests and
//!   the demo binary, modelling the authoritative store including its
//!   exactly-once credit coupling
//! - [`postgres`]: sqlx/PostgreSQL adapter with atomic SQL deltas and a
//!   LISTEN/NOTIFY change stream

pub mod auth;
pub mod functions;
#[cfg(feature = "mock-backend")]
pub mod memory;
pub mod postgres;
pub mod realtime;
pub mod storage;
pub mod store;

pub use auth::{AuthClient, AuthError, Session, SessionEvent};
pub use functions::{FunctionError, FunctionsClient};
pub use realtime::{
    ChangeEvent, ChangeKind, ChangeStream, ChangeSubscription, SubscriptionError, UserScope,
    WatchedTable,
};
pub use storage::{ObjectStore, StorageError};
pub use store::{
    AffiliateStore, CreditStore, LeadStore, PaymentStore, StoreError, TradeStore, WalletStore,
    WithdrawalStore,
};

use std::sync::Arc;

/// The full set of collaborator handles, injected into every service.
///
/// Cloning is cheap (all `Arc`s). Individual fields can be swapped with
/// decorators in tests (e.g. an invocation-counting `CreditStore`).
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthClient>,
    pub credits: Arc<dyn CreditStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub trades: Arc<dyn TradeStore>,
    pub withdrawals: Arc<dyn WithdrawalStore>,
    pub affiliates: Arc<dyn AffiliateStore>,
    pub leads: Arc<dyn LeadStore>,
    pub wallets: Arc<dyn WalletStore>,
    pub changes: Arc<dyn ChangeStream>,
    pub functions: Arc<dyn FunctionsClient>,
    pub objects: Arc<dyn ObjectStore>,
}
