//! Surface Policy: which window a request kind opens, and the thin adapters
//! each surface hands to the lifecycle controller.
//!
//! The mapping is a static table. Every request kind opens the popup; the tab
//! is only opened by the user ("expand view") and never originates handling of
//! a pending request.

mod adapters;

pub use adapters::{PopupSurface, SurfaceAdapter, TabSurface};

use crate::config::GateConfig;
use crate::error::{GateError, GateResult};
use crate::request::{RequestId, RequestKind};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceKind {
    Popup,
    Tab,
}

/// Request kind → surface. Pure data, independent of any handler.
pub const SURFACE_TABLE: &[(RequestKind, SurfaceKind)] = &[
    (RequestKind::Connection, SurfaceKind::Popup),
    (RequestKind::Contract, SurfaceKind::Popup),
];

/// Host-assigned window handle.
pub type SurfaceId = u64;

/// What the host needs to create a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceSpec {
    pub kind: SurfaceKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

/// The host's window-creation primitive.
pub trait SurfaceHost: Send + Sync {
    fn open(&self, spec: &SurfaceSpec) -> GateResult<SurfaceId>;
    fn close(&self, id: SurfaceId) -> GateResult<()>;
}

#[derive(Debug, Clone)]
pub struct SurfacePolicy {
    popup_url: String,
    popup_width: u32,
    popup_height: u32,
    tab_url: String,
}

impl Default for SurfacePolicy {
    fn default() -> Self {
        Self::from_config(&GateConfig::default())
    }
}

impl SurfacePolicy {
    pub fn from_config(config: &GateConfig) -> Self {
        Self {
            popup_url: config.popup_url.clone(),
            popup_width: config.popup_width,
            popup_height: config.popup_height,
            tab_url: config.tab_url.clone(),
        }
    }

    /// Table lookup. A kind missing from the table is a policy error, never a
    /// fallback to the tab.
    pub fn surface_for(kind: RequestKind) -> GateResult<SurfaceKind> {
        SURFACE_TABLE
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, surface)| *surface)
            .ok_or_else(|| GateError::Policy(format!("no surface registered for {kind} requests")))
    }

    pub fn spec_for(&self, kind: RequestKind, request_id: Option<&str>) -> GateResult<SurfaceSpec> {
        match Self::surface_for(kind)? {
            SurfaceKind::Popup => Ok(SurfaceSpec {
                kind: SurfaceKind::Popup,
                url: with_request(&self.popup_url, request_id),
                width: Some(self.popup_width),
                height: Some(self.popup_height),
                request_id: request_id.map(str::to_string),
            }),
            SurfaceKind::Tab => Err(GateError::Policy(format!("{kind} requests may not open a tab"))),
        }
    }

    pub fn open_surface<H: SurfaceHost + ?Sized>(
        &self,
        kind: RequestKind,
        request_id: Option<&str>,
        host: &H,
    ) -> GateResult<SurfaceId> {
        let spec = self.spec_for(kind, request_id)?;
        let id = host.open(&spec)?;
        info!(kind = %kind, surface = ?spec.kind, surface_id = id, "surface opened");
        Ok(id)
    }

    /// Open a surface for a kind named on the wire.
    pub fn open_surface_named<H: SurfaceHost + ?Sized>(
        &self,
        kind: &str,
        request_id: Option<&str>,
        host: &H,
    ) -> GateResult<SurfaceId> {
        self.open_surface(RequestKind::parse(kind)?, request_id, host)
    }

    /// Explicit "expand view". Carries no request.
    pub fn open_tab<H: SurfaceHost + ?Sized>(&self, host: &H) -> GateResult<SurfaceId> {
        let spec = SurfaceSpec {
            kind: SurfaceKind::Tab,
            url: self.tab_url.clone(),
            width: None,
            height: None,
            request_id: None,
        };
        host.open(&spec)
    }
}

fn with_request(url: &str, request_id: Option<&str>) -> String {
    match request_id {
        Some(id) if url.contains('?') => format!("{url}&request={id}"),
        Some(id) => format!("{url}?request={id}"),
        None => url.to_string(),
    }
}
