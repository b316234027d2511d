//! Per-surface affordances: kind, whether the window exists for one request,
//! and how it closes. Everything else lives in the shared controller.

use super::{SurfaceHost, SurfaceId, SurfaceKind};
use crate::error::GateResult;
use crate::request::RequestId;
use std::sync::Arc;
use tracing::debug;

pub trait SurfaceAdapter: Send + Sync {
    fn kind(&self) -> SurfaceKind;
    /// The request the background opened this window for, if any. Deciding
    /// that request (and only that one) closes the window.
    fn opened_for(&self) -> Option<&str>;
    fn close(&self) -> GateResult<()>;
}

pub struct PopupSurface {
    host: Arc<dyn SurfaceHost>,
    id: SurfaceId,
    request_id: Option<RequestId>,
}

impl PopupSurface {
    /// Popup the background opened for a pending request.
    pub fn for_request(host: Arc<dyn SurfaceHost>, id: SurfaceId, request_id: impl Into<RequestId>) -> Self {
        Self { host, id, request_id: Some(request_id.into()) }
    }

    /// Popup the user opened from the toolbar.
    pub fn toolbar(host: Arc<dyn SurfaceHost>, id: SurfaceId) -> Self {
        Self { host, id, request_id: None }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }
}

impl SurfaceAdapter for PopupSurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Popup
    }

    fn opened_for(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    fn close(&self) -> GateResult<()> {
        debug!(surface_id = self.id, "closing popup");
        self.host.close(self.id)
    }
}

/// Full-page tab. Never opened for a request, so it stays open after a
/// decision.
#[derive(Debug, Default, Clone, Copy)]
pub struct TabSurface;

impl SurfaceAdapter for TabSurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Tab
    }

    fn opened_for(&self) -> Option<&str> {
        None
    }

    fn close(&self) -> GateResult<()> {
        Ok(())
    }
}
