//! Serverless RPC interface for privileged operations
//!
//! Anything requiring elevated credentials goes through `invoke` with a
//! JSON payload: user creation/deletion, manual crediting (atomic delta
//! server-side), outbound notification dispatch. Function names are
//! constants so call sites and adapters agree.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub const FN_CREATE_USER: &str = "create-user";
pub const FN_DELETE_USER: &str = "delete-user";
pub const FN_CREDIT_USER: &str = "credit-user";
pub const FN_NOTIFY_USER: &str = "notify-user";

#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Function rejected payload: {0}")]
    BadRequest(String),
    #[error("Function backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait FunctionsClient: Send + Sync {
    async fn invoke(&self, name: &str, payload: Value) -> Result<Value, FunctionError>;
}
