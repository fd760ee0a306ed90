//! Auth collaborator interface (sessions only - credential storage,
//! token refresh and password policy live entirely in the external
//! service).

use crate::core_types::UserId;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("No active session")]
    NotSignedIn,
    #[error("Auth backend error: {0}")]
    Backend(String),
}

/// An authenticated session as reported by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub email: String,
}

/// Session lifecycle events, broadcast to whoever wires users to the
/// moving parts (see `session::SessionEngine`).
#[derive(Debug, Clone)]
pub enum SessionEvent {
    SignedIn(Session),
    SignedOut { user_id: UserId },
}

#[async_trait]
pub trait AuthClient: Send + Sync {
    /// The currently signed-in user, if any.
    async fn current_user(&self) -> Option<Session>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Subscribe to sign-in/sign-out events.
    fn subscribe_sessions(&self) -> broadcast::Receiver<SessionEvent>;
}
