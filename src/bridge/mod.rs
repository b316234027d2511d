//! Bridge: the page-side agent.
//!
//! Turns SDK calls into [`PageEnvelope`]s, parks a oneshot per correlation id
//! and settles it when the matching [`PageReply`] is delivered. Preconditions
//! (provider present, fields filled in, connected before contract calls) are
//! checked locally so they fail without a round trip.

use crate::core::keys::events;
use crate::error::{GateError, GateResult};
use crate::message::{CorrelationId, PageEnvelope, PageMessage, PageReply};
use crate::request::{ConnectionRequest, ContractCallKind, ContractRequest, Param, Permission};
use futures::channel::{mpsc, oneshot};
use futures::StreamExt;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub type ListenerId = u64;
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_icon: Option<String>,
    #[serde(default)]
    pub permissions: BTreeSet<Permission>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCallOptions {
    pub contract_address: String,
    pub method_name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,
}

struct Inner {
    origin: String,
    outbound: Option<mpsc::UnboundedSender<PageEnvelope>>,
    pending: Mutex<HashMap<CorrelationId, oneshot::Sender<GateResult<Value>>>>,
    address: Mutex<Option<String>>,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Listener)>>>,
    next_listener: AtomicU64,
}

#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

impl Bridge {
    pub fn new(origin: impl Into<String>, outbound: mpsc::UnboundedSender<PageEnvelope>) -> Self {
        Self::build(origin.into(), Some(outbound))
    }

    /// A bridge on a page with no wallet installed. Every call fails with
    /// `ProviderUnavailable`.
    pub fn unavailable(origin: impl Into<String>) -> Self {
        Self::build(origin.into(), None)
    }

    fn build(origin: String, outbound: Option<mpsc::UnboundedSender<PageEnvelope>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                origin,
                outbound,
                pending: Mutex::new(HashMap::new()),
                address: Mutex::new(None),
                listeners: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    pub fn is_available(&self) -> bool {
        self.inner.outbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub fn is_connected(&self) -> bool {
        self.address().is_some()
    }

    pub fn address(&self) -> Option<String> {
        self.inner.address.lock().ok().and_then(|a| a.clone())
    }

    /// Ask the wallet for a connection. Resolves to `{success, address}`.
    pub async fn connect(&self, options: ConnectOptions) -> GateResult<Value> {
        let request = ConnectionRequest {
            origin: self.inner.origin.clone(),
            app_name: options.app_name,
            app_icon: options.app_icon,
            permissions: options.permissions,
        };
        self.ensure_available()?;
        request.validate()?;

        let reply = self.request(PageMessage::ConnectRequest(request)).await?;
        let address = reply
            .get("address")
            .and_then(Value::as_str)
            .ok_or_else(|| GateError::Execution("connection reply carried no address".into()))?
            .to_string();
        if let Ok(mut current) = self.inner.address.lock() {
            *current = Some(address.clone());
        }
        info!(origin = %self.inner.origin, address = %address, "connected");
        self.emit(events::CONNECT, &json!({ "address": address }));
        Ok(reply)
    }

    pub async fn view_call(&self, options: ContractCallOptions) -> GateResult<Value> {
        self.contract(ContractCallKind::View, options).await
    }

    pub async fn call_contract(&self, options: ContractCallOptions) -> GateResult<Value> {
        self.contract(ContractCallKind::Call, options).await
    }

    /// Forget the session locally. Emits `disconnect` only if connected.
    pub fn disconnect(&self) {
        let previous = self.inner.address.lock().ok().and_then(|mut a| a.take());
        if let Some(address) = previous {
            info!(origin = %self.inner.origin, "disconnected");
            self.emit(events::DISCONNECT, &json!({ "address": address }));
        }
    }

    pub fn on(&self, event: &str, callback: impl Fn(&Value) + Send + Sync + 'static) -> ListenerId {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.entry(event.to_string()).or_default().push((id, Arc::new(callback)));
        }
        id
    }

    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let Ok(mut listeners) = self.inner.listeners.lock() else {
            return false;
        };
        let Some(list) = listeners.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        before != list.len()
    }

    /// Settle the call waiting on this reply. Returns false for replies with
    /// no waiting call (already settled, or not ours).
    pub fn deliver(&self, reply: PageReply) -> bool {
        let waiting = self
            .inner
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(&reply.correlation_id));
        match waiting {
            Some(tx) => {
                let _ = tx.send(reply.outcome.into_result());
                true
            }
            None => {
                debug!(correlation_id = %reply.correlation_id, "reply with no waiting call");
                false
            }
        }
    }

    /// Deliver replies until the background side hangs up, then fail whatever
    /// is still waiting.
    pub async fn pump(&self, mut replies: mpsc::UnboundedReceiver<PageReply>) {
        while let Some(reply) = replies.next().await {
            self.deliver(reply);
        }
        let orphaned: Vec<_> = match self.inner.pending.lock() {
            Ok(mut pending) => pending.drain().collect(),
            Err(_) => Vec::new(),
        };
        if !orphaned.is_empty() {
            warn!(count = orphaned.len(), "reply channel closed with calls outstanding");
        }
        for (_, tx) in orphaned {
            let _ = tx.send(Err(GateError::ProviderUnavailable));
        }
    }

    pub fn outstanding(&self) -> usize {
        self.inner.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    async fn contract(&self, kind: ContractCallKind, options: ContractCallOptions) -> GateResult<Value> {
        self.ensure_available()?;
        if !self.is_connected() {
            return Err(GateError::NotConnected);
        }
        let request = ContractRequest {
            origin: self.inner.origin.clone(),
            contract_address: options.contract_address,
            method_name: options.method_name,
            kind,
            params: options.params,
            description: options.description,
            gas_limit: options.gas_limit,
            gas_price: options.gas_price,
        };
        request.validate()?;
        self.request(PageMessage::ContractRequest(request)).await
    }

    async fn request(&self, message: PageMessage) -> GateResult<Value> {
        let outbound = self.inner.outbound.as_ref().ok_or(GateError::ProviderUnavailable)?;
        let correlation_id = new_correlation_id();
        let (tx, rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .map_err(|_| GateError::Store("bridge pending table lock".into()))?
            .insert(correlation_id.clone(), tx);
        let _entry = PendingEntry { inner: &self.inner, correlation_id: correlation_id.clone() };

        debug!(correlation_id = %correlation_id, kind = %message.kind(), "sending page request");
        let envelope = PageEnvelope { correlation_id: correlation_id.clone(), message };
        if outbound.unbounded_send(envelope).is_err() {
            return Err(GateError::ProviderUnavailable);
        }

        rx.await.unwrap_or(Err(GateError::ProviderUnavailable))
    }

    fn ensure_available(&self) -> GateResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(GateError::ProviderUnavailable)
        }
    }

    fn emit(&self, event: &str, payload: &Value) {
        let listeners: Vec<Listener> = match self.inner.listeners.lock() {
            Ok(listeners) => listeners
                .get(event)
                .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        for listener in listeners {
            listener(payload);
        }
    }
}

fn new_correlation_id() -> CorrelationId {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Removes a request's reply slot when its caller stops waiting, whether it
/// finished or its future was dropped.
struct PendingEntry<'a> {
    inner: &'a Inner,
    correlation_id: CorrelationId,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.remove(&self.correlation_id);
        }
    }
}
