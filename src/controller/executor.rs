//! Executes an approved contract request on behalf of the active wallet.
//!
//! Chain access is an external collaborator; the controller only needs the
//! emitted result (e.g. `{"txHash": ...}` for calls, the return value for views).

use crate::access::Wallet;
use crate::request::ContractRequest;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait ContractExecutor: Send + Sync {
    async fn execute(&self, wallet: &Wallet, request: &ContractRequest) -> Result<Value>;
}
