//! Screen resolution: an ordered table of resolvers evaluated top-down over a
//! single store snapshot.

use crate::request::{ConnectionRequest, ContractRequest, PendingRequest, RequestId, RequestPayload};
use serde::Serialize;

/// Everything screen resolution depends on, read in one pass.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub gated: bool,
    /// Pending requests in priority order.
    pub pending: Vec<PendingRequest>,
    pub active_wallet: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "screen", rename_all = "camelCase")]
pub enum Screen {
    #[serde(rename_all = "camelCase")]
    ConnectionApproval {
        request_id: RequestId,
        request: ConnectionRequest,
        /// The approval screen embeds the unlock step.
        requires_unlock: bool,
    },
    #[serde(rename_all = "camelCase")]
    ContractApproval {
        request_id: RequestId,
        request: ContractRequest,
        requires_unlock: bool,
    },
    Unlock,
    Welcome,
    Dashboard {
        address: String,
    },
}

impl Screen {
    pub fn name(&self) -> &'static str {
        match self {
            Screen::ConnectionApproval { .. } => "connection-approval",
            Screen::ContractApproval { .. } => "contract-approval",
            Screen::Unlock => "unlock",
            Screen::Welcome => "welcome",
            Screen::Dashboard { .. } => "dashboard",
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Screen::ConnectionApproval { request_id, .. } | Screen::ContractApproval { request_id, .. } => {
                Some(request_id)
            }
            _ => None,
        }
    }

    pub fn requires_unlock(&self) -> bool {
        match self {
            Screen::ConnectionApproval { requires_unlock, .. }
            | Screen::ContractApproval { requires_unlock, .. } => *requires_unlock,
            Screen::Unlock => true,
            _ => false,
        }
    }
}

pub type Resolver = fn(&Snapshot) -> Option<Screen>;

/// Evaluated in order; the first resolver that answers wins.
pub const RESOLVERS: &[(&str, Resolver)] = &[
    ("pending-request", approval),
    ("unlock", unlock),
    ("welcome", welcome),
    ("dashboard", dashboard),
];

pub fn resolve(snapshot: &Snapshot) -> Screen {
    for (name, resolver) in RESOLVERS {
        if let Some(screen) = resolver(snapshot) {
            tracing::debug!(resolver = *name, screen = screen.name(), "screen resolved");
            return screen;
        }
    }
    Screen::Welcome
}

fn approval(snapshot: &Snapshot) -> Option<Screen> {
    let request = snapshot.pending.first()?;
    let requires_unlock = snapshot.gated;
    Some(match &request.payload {
        RequestPayload::Connection(r) => Screen::ConnectionApproval {
            request_id: request.id.clone(),
            request: r.clone(),
            requires_unlock,
        },
        RequestPayload::Contract(r) => Screen::ContractApproval {
            request_id: request.id.clone(),
            request: r.clone(),
            requires_unlock,
        },
    })
}

fn unlock(snapshot: &Snapshot) -> Option<Screen> {
    snapshot.gated.then_some(Screen::Unlock)
}

fn welcome(snapshot: &Snapshot) -> Option<Screen> {
    snapshot.active_wallet.is_none().then_some(Screen::Welcome)
}

fn dashboard(snapshot: &Snapshot) -> Option<Screen> {
    snapshot.active_wallet.as_ref().map(|address| Screen::Dashboard { address: address.clone() })
}
