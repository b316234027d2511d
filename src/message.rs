//! Message channel between bridge, background and surfaces.
//!
//! | Direction | Type | Fields |
//! |-----------|------|--------|
//! | page → bg | `CONNECT_REQUEST` | origin, appName, appIcon?, permissions[] |
//! | page → bg | `CONTRACT_REQUEST` | origin, contractAddress, methodName, kind, params[], description?, gasLimit?, gasPrice? |
//! | surface → bg | `CONNECTION_RESULT` | requestId, origin, approved, address? |
//! | surface → bg | `CONTRACT_RESULT` | requestId, origin, approved, result?, error? |
//! | bg → page | [`PageReply`] | correlationId, resolved payload or rejection |

use crate::error::{GateError, GateResult};
use crate::request::{
    ConnectionRequest, ContractCallKind, ContractRequest, RequestId, RequestKind, RequestOutcome,
    RequestPayload,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub type CorrelationId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageMessage {
    ConnectRequest(ConnectionRequest),
    ContractRequest(ContractRequest),
}

impl PageMessage {
    pub fn kind(&self) -> RequestKind {
        match self {
            PageMessage::ConnectRequest(_) => RequestKind::Connection,
            PageMessage::ContractRequest(_) => RequestKind::Contract,
        }
    }

    pub fn into_payload(self) -> RequestPayload {
        match self {
            PageMessage::ConnectRequest(r) => RequestPayload::Connection(r),
            PageMessage::ContractRequest(r) => RequestPayload::Contract(r),
        }
    }
}

/// A page request tagged with the bridge's correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEnvelope {
    pub correlation_id: CorrelationId,
    pub message: PageMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResult {
    pub request_id: RequestId,
    pub origin: String,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ConnectionResult {
    pub fn to_reply(&self) -> ReplyOutcome {
        if !self.approved {
            return ReplyOutcome::user_rejected();
        }
        match &self.address {
            Some(address) => ReplyOutcome::Resolved { payload: json!({"success": true, "address": address}) },
            None => ReplyOutcome::rejected(&GateError::Execution("approved connection carried no address".into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractResult {
    pub request_id: RequestId,
    pub origin: String,
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContractResult {
    /// Object results are flattened next to `success` and `type`; anything
    /// else is carried under `result`.
    pub fn to_reply(&self, kind: ContractCallKind) -> ReplyOutcome {
        if !self.approved {
            return ReplyOutcome::user_rejected();
        }
        if let Some(error) = &self.error {
            return ReplyOutcome::rejected(&GateError::Execution(error.clone()));
        }
        let mut payload = Map::new();
        payload.insert("success".into(), Value::Bool(true));
        match &self.result {
            Some(Value::Object(fields)) => {
                for (k, v) in fields {
                    payload.insert(k.clone(), v.clone());
                }
            }
            Some(other) => {
                payload.insert("result".into(), other.clone());
            }
            None => {}
        }
        payload.insert("type".into(), Value::String(kind.as_str().into()));
        ReplyOutcome::Resolved { payload: Value::Object(payload) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SurfaceMessage {
    ConnectionResult(ConnectionResult),
    ContractResult(ContractResult),
}

impl SurfaceMessage {
    pub fn request_id(&self) -> &str {
        match self {
            SurfaceMessage::ConnectionResult(r) => &r.request_id,
            SurfaceMessage::ContractResult(r) => &r.request_id,
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            SurfaceMessage::ConnectionResult(_) => RequestKind::Connection,
            SurfaceMessage::ContractResult(_) => RequestKind::Contract,
        }
    }

    pub fn outcome(&self) -> RequestOutcome {
        let approved = match self {
            SurfaceMessage::ConnectionResult(r) => r.approved,
            SurfaceMessage::ContractResult(r) => r.approved,
        };
        if approved {
            RequestOutcome::Approved
        } else {
            RequestOutcome::Rejected
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ReplyOutcome {
    Resolved { payload: Value },
    Rejected { code: String, message: String },
}

impl ReplyOutcome {
    pub fn rejected(err: &GateError) -> Self {
        ReplyOutcome::Rejected { code: err.code().to_string(), message: err.detail() }
    }

    pub fn user_rejected() -> Self {
        Self::rejected(&GateError::Rejected("User rejected the request".into()))
    }

    pub fn into_result(self) -> GateResult<Value> {
        match self {
            ReplyOutcome::Resolved { payload } => Ok(payload),
            ReplyOutcome::Rejected { code, message } => Err(GateError::from_wire(&code, &message)),
        }
    }
}

/// Background's answer to one page request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageReply {
    pub correlation_id: CorrelationId,
    pub outcome: ReplyOutcome,
}
