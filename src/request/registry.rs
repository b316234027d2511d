//! Request Registry: the store-backed record of outstanding requests.
//!
//! One slot per [`RequestKind`]. A second submission of an occupied kind fails
//! with `RequestConflict` and leaves the original untouched.

use super::{PendingRequest, RequestKind, RequestOutcome, RequestPayload};
use crate::error::{GateError, GateResult};
use crate::store::{SharedStore, StoreExt};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct RequestRegistry<S> {
    store: S,
}

impl<S: SharedStore> RequestRegistry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn submit(&self, payload: RequestPayload) -> GateResult<PendingRequest> {
        let kind = payload.kind();
        if let Some(existing) = self.peek(kind)? {
            warn!(
                kind = %kind,
                pending_id = %existing.id,
                pending_origin = %existing.origin(),
                origin = %payload.origin(),
                "rejecting request: kind already pending"
            );
            return Err(GateError::RequestConflict(kind));
        }
        let request = PendingRequest::new(payload);
        self.store.set_as(kind.store_key(), &request)?;
        info!(kind = %kind, id = %request.id, origin = %request.origin(), "request submitted");
        Ok(request)
    }

    /// Pure read of the slot for `kind`. A record that does not decode is
    /// treated as absent.
    pub fn peek(&self, kind: RequestKind) -> GateResult<Option<PendingRequest>> {
        let Some(value) = self.store.get(kind.store_key())? else {
            return Ok(None);
        };
        match serde_json::from_value::<PendingRequest>(value) {
            Ok(request) if request.kind() == kind => Ok(Some(request)),
            Ok(request) => {
                warn!(slot = %kind, found = %request.kind(), "pending request stored under the wrong slot");
                Ok(None)
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "unreadable pending request ignored");
                Ok(None)
            }
        }
    }

    /// Every pending request, in [`RequestKind::ALL`] priority order.
    pub fn pending(&self) -> GateResult<Vec<PendingRequest>> {
        let mut out = Vec::new();
        for kind in RequestKind::ALL {
            if let Some(request) = self.peek(kind)? {
                out.push(request);
            }
        }
        Ok(out)
    }

    pub fn find(&self, id: &str) -> GateResult<Option<PendingRequest>> {
        Ok(self.pending()?.into_iter().find(|r| r.id == id))
    }

    /// Clear the request with `id`. Returns the cleared request, or `None` when
    /// it was already resolved.
    pub fn resolve(&self, id: &str, outcome: RequestOutcome) -> GateResult<Option<PendingRequest>> {
        match self.find(id)? {
            Some(request) => {
                self.store.remove(request.kind().store_key())?;
                info!(kind = %request.kind(), id = %id, outcome = %outcome, "request resolved");
                Ok(Some(request))
            }
            None => {
                debug!(id = %id, outcome = %outcome, "resolve ignored: request already cleared");
                Ok(None)
            }
        }
    }
}
