//! Background coordinator: the long-lived context between pages and surfaces.
//!
//! ```text
//! page ──PageEnvelope──► Background ──submit──► RequestRegistry (store)
//!                            │
//!                            ├──open_surface──► SurfaceHost (popup)
//!                            │
//! surface ──SurfaceMessage──►│──resolve──► RequestRegistry
//!                            │
//!                            └──PageReply──► page
//! ```
//!
//! Every page request ends in exactly one reply: the surface's result, a
//! synthetic `Abandoned` rejection when the surface closes (or idles out)
//! first, or an immediate rejection when it cannot be accepted.

use crate::config::GateConfig;
use crate::error::{GateError, GateResult};
use crate::message::{CorrelationId, PageEnvelope, PageReply, ReplyOutcome, SurfaceMessage};
use crate::request::{
    ContractCallKind, PendingRequest, RequestId, RequestKind, RequestOutcome, RequestPayload, RequestRegistry,
};
use crate::store::SharedStore;
use crate::surface::{SurfaceHost, SurfaceId, SurfacePolicy};
use chrono::{DateTime, Utc};
use futures::channel::mpsc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything the background reacts to, in arrival order.
#[derive(Debug, Clone)]
pub enum BackgroundEvent {
    Page(PageEnvelope),
    Surface(SurfaceMessage),
    SurfaceClosed(SurfaceId),
    /// User asked for the full-page view.
    OpenTab,
}

impl From<PageEnvelope> for BackgroundEvent {
    fn from(envelope: PageEnvelope) -> Self {
        BackgroundEvent::Page(envelope)
    }
}

impl From<SurfaceMessage> for BackgroundEvent {
    fn from(message: SurfaceMessage) -> Self {
        BackgroundEvent::Surface(message)
    }
}

#[derive(Debug, Clone)]
struct InFlight {
    correlation_id: CorrelationId,
    kind: RequestKind,
    call_kind: Option<ContractCallKind>,
    surface_id: SurfaceId,
    opened_at: DateTime<Utc>,
}

pub struct Background<S> {
    registry: RequestRegistry<S>,
    policy: SurfacePolicy,
    host: Arc<dyn SurfaceHost>,
    replies: mpsc::UnboundedSender<PageReply>,
    inflight: Mutex<HashMap<RequestId, InFlight>>,
    inactivity_timeout: Option<Duration>,
    sweep_interval: Duration,
}

impl<S: SharedStore> Background<S> {
    pub fn new(
        store: S,
        host: Arc<dyn SurfaceHost>,
        replies: mpsc::UnboundedSender<PageReply>,
        config: &GateConfig,
    ) -> Self {
        Self {
            registry: RequestRegistry::new(store),
            policy: SurfacePolicy::from_config(config),
            host,
            replies,
            inflight: Mutex::new(HashMap::new()),
            inactivity_timeout: config.inactivity_timeout,
            sweep_interval: config.sweep_interval,
        }
    }

    pub fn host(&self) -> Arc<dyn SurfaceHost> {
        self.host.clone()
    }

    pub fn handle(&self, event: BackgroundEvent) -> GateResult<()> {
        match event {
            BackgroundEvent::Page(envelope) => self.handle_page(envelope).map(|_| ()),
            BackgroundEvent::Surface(message) => self.handle_surface(message).map(|_| ()),
            BackgroundEvent::SurfaceClosed(id) => self.surface_closed(id).map(|_| ()),
            BackgroundEvent::OpenTab => self.policy.open_tab(self.host.as_ref()).map(|_| ()),
        }
    }

    /// Accept a page request: validate, register, open its popup. Requests that
    /// cannot be accepted are rejected to the page immediately.
    pub fn handle_page(&self, envelope: PageEnvelope) -> GateResult<Option<PendingRequest>> {
        let PageEnvelope { correlation_id, message } = envelope;
        let payload = message.into_payload();
        if let Err(e) = payload.validate() {
            self.reply(&correlation_id, ReplyOutcome::rejected(&e));
            return Ok(None);
        }
        let call_kind = match &payload {
            RequestPayload::Contract(r) => Some(r.kind),
            RequestPayload::Connection(_) => None,
        };

        let request = match self.registry.submit(payload) {
            Ok(request) => request,
            Err(e @ GateError::RequestConflict(_)) => {
                self.reply(&correlation_id, ReplyOutcome::rejected(&e));
                return Ok(None);
            }
            Err(e) => {
                self.reply(&correlation_id, ReplyOutcome::rejected(&e));
                return Err(e);
            }
        };

        let surface_id = match self.policy.open_surface(request.kind(), Some(&request.id), self.host.as_ref()) {
            Ok(id) => id,
            Err(e) => {
                warn!(id = %request.id, error = %e, "could not open approval surface");
                self.registry.resolve(&request.id, RequestOutcome::Abandoned)?;
                self.reply(&correlation_id, ReplyOutcome::rejected(&e));
                return Ok(None);
            }
        };

        self.lock_inflight()?.insert(
            request.id.clone(),
            InFlight {
                correlation_id,
                kind: request.kind(),
                call_kind,
                surface_id,
                opened_at: Utc::now(),
            },
        );
        Ok(Some(request))
    }

    /// Forward a surface decision to its page, exactly once. Returns false for
    /// late or duplicate results, which only reach the idempotent registry.
    pub fn handle_surface(&self, message: SurfaceMessage) -> GateResult<bool> {
        let id = message.request_id().to_string();
        let entry = self.lock_inflight()?.remove(&id);
        self.registry.resolve(&id, message.outcome())?;

        let Some(entry) = entry else {
            debug!(id = %id, "late surface result ignored");
            return Ok(false);
        };
        if entry.kind != message.kind() {
            warn!(id = %id, expected = %entry.kind, got = %message.kind(), "surface result kind mismatch");
            let err = GateError::Validation(format!("expected a {} result", entry.kind));
            self.reply(&entry.correlation_id, ReplyOutcome::rejected(&err));
            return Ok(true);
        }

        let outcome = match &message {
            SurfaceMessage::ConnectionResult(r) => r.to_reply(),
            SurfaceMessage::ContractResult(r) => r.to_reply(entry.call_kind.unwrap_or(ContractCallKind::Call)),
        };
        info!(id = %id, kind = %entry.kind, outcome = %message.outcome(), "request completed");
        self.reply(&entry.correlation_id, outcome);
        Ok(true)
    }

    /// Host close event. Abandons every request the surface was holding;
    /// repeated events for the same surface find nothing left to abandon.
    pub fn surface_closed(&self, surface_id: SurfaceId) -> GateResult<usize> {
        let abandoned: Vec<(RequestId, InFlight)> = {
            let mut inflight = self.lock_inflight()?;
            let ids: Vec<RequestId> = inflight
                .iter()
                .filter(|(_, entry)| entry.surface_id == surface_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| inflight.remove(&id).map(|entry| (id, entry)))
                .collect()
        };
        for (id, entry) in &abandoned {
            self.abandon(id, entry, "surface closed")?;
        }
        Ok(abandoned.len())
    }

    /// Abandon requests that have waited longer than the inactivity bound.
    pub fn expire_idle(&self, now: DateTime<Utc>) -> GateResult<usize> {
        let Some(timeout) = self.inactivity_timeout else {
            return Ok(0);
        };
        let expired: Vec<(RequestId, InFlight)> = {
            let mut inflight = self.lock_inflight()?;
            let ids: Vec<RequestId> = inflight
                .iter()
                .filter(|(_, entry)| {
                    (now - entry.opened_at)
                        .to_std()
                        .map(|elapsed| elapsed >= timeout)
                        .unwrap_or(false)
                })
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| inflight.remove(&id).map(|entry| (id, entry)))
                .collect()
        };
        for (id, entry) in &expired {
            if let Err(e) = self.host.close(entry.surface_id) {
                debug!(surface_id = entry.surface_id, error = %e, "idle surface already gone");
            }
            self.abandon(id, entry, "inactivity timeout")?;
        }
        Ok(expired.len())
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Single cooperative loop over background events with a periodic idle
    /// sweep. Ends on shutdown or when every event sender is gone.
    #[cfg(feature = "native")]
    pub async fn run(
        &self,
        mut events: mpsc::UnboundedReceiver<BackgroundEvent>,
        shutdown: crate::runtime::Shutdown,
    ) -> GateResult<()> {
        use futures::StreamExt;

        let mut stop = shutdown.subscribe();
        let mut sweep = tokio::time::interval(self.sweep_interval);
        info!(inactivity_timeout = ?self.inactivity_timeout, "background running");
        loop {
            tokio::select! {
                _ = stop.recv() => {
                    info!("background stopping");
                    break;
                }
                _ = sweep.tick() => {
                    if let Err(e) = self.expire_idle(Utc::now()) {
                        warn!(error = %e, "idle sweep failed");
                    }
                }
                event = events.next() => match event {
                    Some(event) => {
                        if let Err(e) = self.handle(event) {
                            warn!(error = %e, "background event failed");
                        }
                    }
                    None => break,
                },
            }
        }
        Ok(())
    }

    fn abandon(&self, id: &str, entry: &InFlight, reason: &str) -> GateResult<()> {
        self.registry.resolve(id, RequestOutcome::Abandoned)?;
        info!(id = %id, kind = %entry.kind, surface_id = entry.surface_id, reason, "request abandoned");
        self.reply(&entry.correlation_id, ReplyOutcome::rejected(&GateError::Abandoned));
        Ok(())
    }

    fn reply(&self, correlation_id: &str, outcome: ReplyOutcome) {
        let reply = PageReply { correlation_id: correlation_id.to_string(), outcome };
        if self.replies.unbounded_send(reply).is_err() {
            warn!(correlation_id, "page reply dropped: page channel closed");
        }
    }

    fn lock_inflight(&self) -> GateResult<std::sync::MutexGuard<'_, HashMap<RequestId, InFlight>>> {
        self.inflight.lock().map_err(|_| GateError::Store("in-flight table lock".into()))
    }
}
