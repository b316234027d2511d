//! Request Lifecycle Controller: the one state machine every surface hosts.
//!
//! Popup and tab construct it identically; the only per-surface input is a
//! [`SurfaceAdapter`]. Each mount or refresh re-derives the screen from a fresh
//! store snapshot, never from flags carried over from a previous render.
//!
//! ```text
//! mount ──► snapshot { gate, pending[], active } ──► RESOLVERS (top-down)
//!                                                        │
//!   pending request ─► approval screen (embeds unlock when gated)
//!   gated           ─► Unlock
//!   no wallet       ─► Welcome
//!   otherwise       ─► Dashboard
//!
//! approve/reject ──► send result message ──► registry.resolve ──► close (popup opened for request)
//! ```

mod executor;
mod screen;

pub use executor::ContractExecutor;
pub use screen::{resolve, Resolver, Screen, Snapshot, RESOLVERS};

use crate::access::{Wallet, WalletAccess};
use crate::error::{GateError, GateResult};
use crate::message::{ConnectionResult, ContractResult, SurfaceMessage};
use crate::request::{PendingRequest, RequestOutcome, RequestPayload, RequestRegistry};
use crate::store::SharedStore;
use crate::surface::{SurfaceAdapter, SurfaceKind};
use futures::channel::mpsc;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

pub struct LifecycleController<S> {
    store: S,
    access: WalletAccess<S>,
    registry: RequestRegistry<S>,
    surface: Box<dyn SurfaceAdapter>,
    outbox: mpsc::UnboundedSender<SurfaceMessage>,
    executor: Option<Arc<dyn ContractExecutor>>,
    notice: Mutex<Option<String>>,
}

impl<S: SharedStore + Clone> LifecycleController<S> {
    pub fn new(
        store: S,
        surface: impl SurfaceAdapter + 'static,
        outbox: mpsc::UnboundedSender<SurfaceMessage>,
    ) -> Self {
        Self {
            access: WalletAccess::new(store.clone()),
            registry: RequestRegistry::new(store.clone()),
            store,
            surface: Box::new(surface),
            outbox,
            executor: None,
            notice: Mutex::new(None),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn ContractExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn surface_kind(&self) -> SurfaceKind {
        self.surface.kind()
    }

    pub fn access(&self) -> &WalletAccess<S> {
        &self.access
    }

    pub fn mount(&self) -> GateResult<Screen> {
        info!(surface = ?self.surface.kind(), "controller mounted");
        self.refresh()
    }

    pub fn refresh(&self) -> GateResult<Screen> {
        Ok(resolve(&self.snapshot()?))
    }

    /// One consistent read of everything screen resolution needs. A gate
    /// check that fails reads as gated.
    pub fn snapshot(&self) -> GateResult<Snapshot> {
        let gated = self.access.should_gate().unwrap_or_else(|e| {
            warn!(error = %e, "gate check failed; treating wallet as locked");
            true
        });
        let pending = self.registry.pending()?;
        let active_wallet = if gated {
            None
        } else {
            self.access.active_wallet()?.map(|w| w.address)
        };
        Ok(Snapshot { gated, pending, active_wallet })
    }

    /// Re-render on every store change until the store's watch stream ends.
    pub async fn follow<F: FnMut(&Screen)>(&self, mut render: F) -> GateResult<()> {
        let mut changes = self.store.watch()?;
        render(&self.refresh()?);
        while changes.next().await.is_some() {
            render(&self.refresh()?);
        }
        Ok(())
    }

    pub fn unlock(&self, password: &str) -> GateResult<Screen> {
        match self.access.unlock(password) {
            Ok(_) => {
                self.dismiss_notice();
                self.refresh()
            }
            Err(e) => Err(self.note(e)),
        }
    }

    pub fn lock(&self) -> GateResult<Screen> {
        self.access.lock()?;
        self.refresh()
    }

    /// Approve the pending request the screen showed. Contract requests run
    /// through the configured executor.
    pub async fn approve(&self, request_id: &str) -> GateResult<Screen> {
        let (request, wallet) = self.approvable(request_id)?;
        let executed = match &request.payload {
            RequestPayload::Contract(_) => Some(self.execute(&wallet, &request).await),
            RequestPayload::Connection(_) => None,
        };
        self.finish_approval(request, wallet, executed)
    }

    /// Approve with a contract result the host produced itself.
    pub fn approve_with_result(&self, request_id: &str, result: GateResult<serde_json::Value>) -> GateResult<Screen> {
        let (request, wallet) = self.approvable(request_id)?;
        self.finish_approval(request, wallet, Some(result))
    }

    fn approvable(&self, request_id: &str) -> GateResult<(PendingRequest, Wallet)> {
        let snapshot = self.snapshot()?;
        let request = self.pending_by_id(&snapshot, request_id)?;
        if snapshot.gated {
            return Err(self.note(GateError::Auth("unlock the wallet to approve".into())));
        }
        let wallet = self
            .access
            .active_wallet()?
            .ok_or_else(|| self.note(GateError::Validation("no active wallet".into())))?;
        Ok((request, wallet))
    }

    fn finish_approval(
        &self,
        request: PendingRequest,
        wallet: Wallet,
        executed: Option<GateResult<serde_json::Value>>,
    ) -> GateResult<Screen> {
        let message = match &request.payload {
            RequestPayload::Connection(r) => SurfaceMessage::ConnectionResult(ConnectionResult {
                request_id: request.id.clone(),
                origin: r.origin.clone(),
                approved: true,
                address: Some(wallet.address.clone()),
            }),
            RequestPayload::Contract(r) => {
                let (result, error) = match executed {
                    Some(Ok(value)) => (Some(value), None),
                    Some(Err(GateError::Execution(msg))) => (None, Some(msg)),
                    Some(Err(e)) => (None, Some(e.to_string())),
                    None => (None, Some("contract request approved without execution".into())),
                };
                SurfaceMessage::ContractResult(ContractResult {
                    request_id: request.id.clone(),
                    origin: r.origin.clone(),
                    approved: true,
                    result,
                    error,
                })
            }
        };
        self.decide(&request, message, RequestOutcome::Approved)
    }

    /// Reject the pending request. Allowed while locked.
    pub fn reject(&self, request_id: &str) -> GateResult<Screen> {
        let snapshot = self.snapshot()?;
        let request = self.pending_by_id(&snapshot, request_id)?;
        let message = match &request.payload {
            RequestPayload::Connection(r) => SurfaceMessage::ConnectionResult(ConnectionResult {
                request_id: request.id.clone(),
                origin: r.origin.clone(),
                approved: false,
                address: None,
            }),
            RequestPayload::Contract(r) => SurfaceMessage::ContractResult(ContractResult {
                request_id: request.id.clone(),
                origin: r.origin.clone(),
                approved: false,
                result: None,
                error: None,
            }),
        };
        self.decide(&request, message, RequestOutcome::Rejected)
    }

    /// Dismissible message for the last failed action.
    pub fn notice(&self) -> Option<String> {
        self.notice.lock().ok().and_then(|n| n.clone())
    }

    pub fn dismiss_notice(&self) {
        if let Ok(mut notice) = self.notice.lock() {
            *notice = None;
        }
    }

    fn note(&self, err: GateError) -> GateError {
        if let Ok(mut notice) = self.notice.lock() {
            *notice = Some(err.to_string());
        }
        err
    }

    fn pending_by_id(&self, snapshot: &Snapshot, request_id: &str) -> GateResult<PendingRequest> {
        snapshot
            .pending
            .iter()
            .find(|r| r.id == request_id)
            .cloned()
            .ok_or_else(|| self.note(GateError::Validation(format!("request {request_id} is no longer pending"))))
    }

    async fn execute(&self, wallet: &Wallet, request: &PendingRequest) -> GateResult<serde_json::Value> {
        let RequestPayload::Contract(contract) = &request.payload else {
            return Err(GateError::Validation("not a contract request".into()));
        };
        let executor = self
            .executor
            .as_ref()
            .ok_or_else(|| GateError::Execution("no contract executor configured".into()))?;
        executor.execute(wallet, contract).await.map_err(|e| {
            warn!(id = %request.id, method = %contract.method_name, error = %e, "contract execution failed");
            GateError::Execution(e.to_string())
        })
    }

    /// Send the result, clear the registry slot, then close a popup that
    /// was opened for this very request.
    fn decide(&self, request: &PendingRequest, message: SurfaceMessage, outcome: RequestOutcome) -> GateResult<Screen> {
        if let Err(e) = self.outbox.unbounded_send(message) {
            // Background will still see the surface close and abandon.
            error!(id = %request.id, error = %e, "result message not delivered");
        }
        self.registry.resolve(&request.id, outcome)?;
        info!(id = %request.id, kind = %request.kind(), outcome = %outcome, surface = ?self.surface.kind(), "request decided");
        self.dismiss_notice();
        if self.surface.opened_for() == Some(request.id.as_str()) {
            self.surface.close()?;
        }
        self.refresh()
    }
}
