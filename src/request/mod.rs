//! Pending requests: what a page asked for, as stored in the registry.
//!
//! A request is created by the background on receipt of a page message, read by
//! exactly one lifecycle controller, and removed after a terminal outcome.

mod registry;

pub use registry::RequestRegistry;

use crate::core::keys::store;
use crate::error::{GateError, GateResult};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

pub type RequestId = String;

/// Discriminant of [`RequestPayload`]. At most one request per kind is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Connection,
    Contract,
}

impl RequestKind {
    /// Every kind, in the order a surface checks for pending work.
    pub const ALL: [RequestKind; 2] = [RequestKind::Connection, RequestKind::Contract];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Connection => "connection",
            RequestKind::Contract => "contract",
        }
    }

    pub fn store_key(&self) -> &'static str {
        match self {
            RequestKind::Connection => store::PENDING_CONNECTION,
            RequestKind::Contract => store::PENDING_CONTRACT,
        }
    }

    /// Parse a kind name from the wire. Unknown names are a policy error,
    /// never a fallback.
    pub fn parse(value: &str) -> GateResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "connection" | "connect" => Ok(RequestKind::Connection),
            "contract" | "view" | "call" => Ok(RequestKind::Contract),
            other => Err(GateError::Policy(format!("unrecognized request kind '{other}'"))),
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractCallKind {
    View,
    Call,
}

impl ContractCallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractCallKind::View => "view",
            ContractCallKind::Call => "call",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Permission {
    ViewAddress,
    ViewBalance,
    CallContract,
    SignMessage,
}

/// One positional contract argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_: String,
    pub value: Value,
}

impl Param {
    pub fn new(type_: impl Into<String>, value: Value) -> Self {
        Self { name: None, type_: type_.into(), value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub origin: String,
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_icon: Option<String>,
    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
}

impl ConnectionRequest {
    pub fn validate(&self) -> GateResult<()> {
        require("origin", &self.origin)?;
        require("appName", &self.app_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRequest {
    pub origin: String,
    pub contract_address: String,
    pub method_name: String,
    pub kind: ContractCallKind,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,
}

impl ContractRequest {
    pub fn validate(&self) -> GateResult<()> {
        require("origin", &self.origin)?;
        require("contractAddress", &self.contract_address)?;
        require("methodName", &self.method_name)
    }
}

fn require(field: &str, value: &str) -> GateResult<()> {
    if value.trim().is_empty() {
        return Err(GateError::Validation(format!("missing required field '{field}'")));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RequestPayload {
    Connection(ConnectionRequest),
    Contract(ContractRequest),
}

impl RequestPayload {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestPayload::Connection(_) => RequestKind::Connection,
            RequestPayload::Contract(_) => RequestKind::Contract,
        }
    }

    pub fn origin(&self) -> &str {
        match self {
            RequestPayload::Connection(r) => &r.origin,
            RequestPayload::Contract(r) => &r.origin,
        }
    }

    pub fn validate(&self) -> GateResult<()> {
        match self {
            RequestPayload::Connection(r) => r.validate(),
            RequestPayload::Contract(r) => r.validate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequest {
    pub id: RequestId,
    pub created_at: DateTime<Utc>,
    pub payload: RequestPayload,
}

impl PendingRequest {
    pub fn new(payload: RequestPayload) -> Self {
        Self { id: new_request_id(), created_at: Utc::now(), payload }
    }

    pub fn kind(&self) -> RequestKind {
        self.payload.kind()
    }

    pub fn origin(&self) -> &str {
        self.payload.origin()
    }
}

/// Terminal outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestOutcome {
    Approved,
    Rejected,
    Abandoned,
}

impl fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestOutcome::Approved => "approved",
            RequestOutcome::Rejected => "rejected",
            RequestOutcome::Abandoned => "abandoned",
        })
    }
}

pub fn new_request_id() -> RequestId {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
