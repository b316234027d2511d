//! Integration Tests: cross-context request lifecycle
//!
//! Page (Bridge) → Background → popup/tab (LifecycleController) → Background → page,
//! all wired over in-process channels and one shared MemoryStore.
//!
//! These tests verify:
//! 1. Every request kind opens the popup, never the tab
//! 2. A gated contract request shows contract approval after unlock, on both surfaces
//! 3. A conflicting request leaves the original untouched
//! 4. Approve and abandon round trips settle the page exactly once
//! 5. A popup closes only after deciding the request it was opened for
//! 6. The locked claimToken scenario end to end

use async_trait::async_trait;
use beegate::core::keys::store as keys;
use beegate::surface::SurfaceId;
use beegate::{
    Background, BackgroundEvent, Bridge, ConnectOptions, ContractCallOptions, ContractExecutor, ContractRequest,
    GateConfig, GateError, LifecycleController, MemoryStore, PageEnvelope, PageReply, PopupSurface, RequestKind,
    RequestRegistry, Screen, SharedStore, SurfaceHost, SurfaceKind, SurfaceMessage, SurfacePolicy, SurfaceSpec,
    TabSurface, Wallet, WalletAccess,
};
use chrono::Utc;
use futures::channel::mpsc;
use futures::StreamExt;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PASSWORD: &str = "open sesame";
const ORIGIN: &str = "https://dapp.example";

static WALLET: Lazy<Wallet> = Lazy::new(|| Wallet {
    address: "bee1qclaimer000000000000000000000000000000".into(),
    name: "Main".into(),
    private_key: "c3".repeat(32),
});

// =============================================================================
// Harness
// =============================================================================

#[derive(Default)]
struct Windows {
    opened: Mutex<Vec<(SurfaceId, SurfaceSpec)>>,
    closed: Mutex<Vec<SurfaceId>>,
}

impl Windows {
    fn last_opened(&self) -> (SurfaceId, SurfaceSpec) {
        self.opened.lock().unwrap().last().cloned().expect("a window was opened")
    }

    fn spec(&self, id: SurfaceId) -> SurfaceSpec {
        let opened = self.opened.lock().unwrap();
        opened.iter().find(|(opened_id, _)| *opened_id == id).map(|(_, spec)| spec.clone()).expect("known window")
    }

    fn opened_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }
}

impl SurfaceHost for Windows {
    fn open(&self, spec: &SurfaceSpec) -> beegate::GateResult<SurfaceId> {
        let mut opened = self.opened.lock().unwrap();
        let id = opened.len() as SurfaceId + 100;
        opened.push((id, spec.clone()));
        Ok(id)
    }

    fn close(&self, id: SurfaceId) -> beegate::GateResult<()> {
        self.closed.lock().unwrap().push(id);
        Ok(())
    }
}

struct ClaimExecutor {
    calls: AtomicUsize,
}

#[async_trait]
impl ContractExecutor for ClaimExecutor {
    async fn execute(&self, wallet: &Wallet, request: &ContractRequest) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::ensure!(wallet.address == WALLET.address, "wrong signer");
        anyhow::ensure!(request.method_name == "claimToken", "unexpected method {}", request.method_name);
        Ok(json!({"txHash": "abc123"}))
    }
}

struct Harness {
    store: MemoryStore,
    windows: Arc<Windows>,
    background: Background<MemoryStore>,
    replies: mpsc::UnboundedReceiver<PageReply>,
    bridge: Bridge,
    page_rx: mpsc::UnboundedReceiver<PageEnvelope>,
    results_tx: mpsc::UnboundedSender<SurfaceMessage>,
    results_rx: mpsc::UnboundedReceiver<SurfaceMessage>,
    executor: Arc<ClaimExecutor>,
}

impl Harness {
    fn new(config: GateConfig) -> Self {
        let store = MemoryStore::new();
        let access = WalletAccess::new(store.clone());
        access.setup(PASSWORD).unwrap();
        access.add_wallet(PASSWORD, WALLET.clone()).unwrap();

        let windows = Arc::new(Windows::default());
        let (reply_tx, replies) = mpsc::unbounded();
        let (page_tx, page_rx) = mpsc::unbounded();
        let (results_tx, results_rx) = mpsc::unbounded();
        Self {
            background: Background::new(store.clone(), windows.clone(), reply_tx, &config),
            store,
            windows,
            replies,
            bridge: Bridge::new(ORIGIN, page_tx),
            page_rx,
            results_tx,
            results_rx,
            executor: Arc::new(ClaimExecutor { calls: AtomicUsize::new(0) }),
        }
    }

    /// The popup the background opened most recently.
    fn popup(&self) -> LifecycleController<MemoryStore> {
        let (id, _) = self.windows.last_opened();
        self.popup_for(id)
    }

    /// The popup behind a given window, bound to the request it was opened for.
    fn popup_for(&self, surface_id: SurfaceId) -> LifecycleController<MemoryStore> {
        let spec = self.windows.spec(surface_id);
        let request_id = spec.request_id.expect("popup opened for a request");
        let surface = PopupSurface::for_request(self.windows.clone(), surface_id, request_id);
        LifecycleController::new(self.store.clone(), surface, self.results_tx.clone()).with_executor(self.executor.clone())
    }

    /// What the host does when a window goes away: tell the background.
    fn report_closed_windows(&self) -> usize {
        let closed = self.windows.closed.lock().unwrap().clone();
        closed.into_iter().map(|id| self.background.surface_closed(id).unwrap()).sum()
    }

    fn tab(&self) -> LifecycleController<MemoryStore> {
        LifecycleController::new(self.store.clone(), TabSurface, self.results_tx.clone())
            .with_executor(self.executor.clone())
    }

    /// Next page request, straight into the background.
    async fn relay_page(&mut self) {
        let envelope = self.page_rx.next().await.expect("page request");
        self.background.handle(BackgroundEvent::Page(envelope)).unwrap();
    }

    /// Surface results to the background, background replies to the bridge.
    fn relay_back(&mut self) -> usize {
        while let Ok(Some(message)) = self.results_rx.try_next() {
            self.background.handle(message.into()).unwrap();
        }
        let mut delivered = 0;
        while let Ok(Some(reply)) = self.replies.try_next() {
            if self.bridge.deliver(reply) {
                delivered += 1;
            }
        }
        delivered
    }

    async fn connect(&mut self) {
        let bridge = self.bridge.clone();
        let call = tokio::spawn(async move {
            bridge.connect(ConnectOptions { app_name: "Dapp".into(), ..Default::default() }).await
        });
        self.relay_page().await;

        let popup = self.popup();
        let screen = popup.unlock(PASSWORD).unwrap();
        assert_eq!(screen.name(), "connection-approval");
        popup.approve(screen.request_id().unwrap()).await.unwrap();
        assert_eq!(self.relay_back(), 1);

        let reply = call.await.unwrap().unwrap();
        assert_eq!(reply, json!({"success": true, "address": WALLET.address}));
        assert!(self.bridge.is_connected());
    }
}

fn claim_options() -> ContractCallOptions {
    ContractCallOptions {
        contract_address: "bee1qfaucet000000000000000000000000000000".into(),
        method_name: "claimToken".into(),
        description: Some("Claim test tokens".into()),
        ..Default::default()
    }
}

fn connect_envelope(correlation_id: &str, origin: &str) -> PageEnvelope {
    serde_json::from_value(json!({
        "correlationId": correlation_id,
        "message": {
            "type": "CONNECT_REQUEST",
            "origin": origin,
            "appName": "Other Dapp",
            "permissions": []
        }
    }))
    .unwrap()
}

fn contract_envelope(correlation_id: &str, origin: &str) -> PageEnvelope {
    serde_json::from_value(json!({
        "correlationId": correlation_id,
        "message": {
            "type": "CONTRACT_REQUEST",
            "origin": origin,
            "contractAddress": "bee1qfaucet000000000000000000000000000000",
            "methodName": "claimToken",
            "kind": "call",
            "params": []
        }
    }))
    .unwrap()
}

// =============================================================================
// Surface policy
// =============================================================================

#[tokio::test]
async fn every_request_kind_opens_the_popup() {
    for kind in RequestKind::ALL {
        assert_eq!(SurfacePolicy::surface_for(kind).unwrap(), SurfaceKind::Popup);
    }

    let mut h = Harness::new(GateConfig::default());
    let bridge = h.bridge.clone();
    let connect = tokio::spawn(async move {
        bridge.connect(ConnectOptions { app_name: "Dapp".into(), ..Default::default() }).await
    });
    h.relay_page().await;
    h.background.handle(contract_envelope("view-1", ORIGIN).into()).unwrap();

    let opened = h.windows.opened.lock().unwrap().clone();
    assert_eq!(opened.len(), 2);
    for (_, spec) in &opened {
        assert_eq!(spec.kind, SurfaceKind::Popup);
        assert!(spec.width.is_some() && spec.height.is_some());
        assert!(spec.request_id.is_some());
    }

    let policy = SurfacePolicy::default();
    assert!(matches!(
        policy.open_surface_named("faucet", None, h.windows.as_ref()),
        Err(GateError::Policy(_))
    ));
    assert_eq!(h.windows.opened_count(), 2);
    connect.abort();
}

// =============================================================================
// Gated approval on both entry points
// =============================================================================

#[tokio::test]
async fn gated_contract_request_shows_approval_after_unlock_on_both_surfaces() {
    for surface in [SurfaceKind::Popup, SurfaceKind::Tab] {
        let h = Harness::new(GateConfig::default());
        h.background.handle(contract_envelope("c1", ORIGIN).into()).unwrap();

        let controller = match surface {
            SurfaceKind::Popup => h.popup(),
            SurfaceKind::Tab => h.tab(),
        };
        let before = controller.mount().unwrap();
        assert!(matches!(before, Screen::ContractApproval { requires_unlock: true, .. }), "{surface:?}: {before:?}");

        let after = controller.unlock(PASSWORD).unwrap();
        match after {
            Screen::ContractApproval { requires_unlock, request, .. } => {
                assert!(!requires_unlock);
                assert_eq!(request.method_name, "claimToken");
            }
            other => panic!("{surface:?} rendered {other:?} after unlock"),
        }
    }
}

#[tokio::test]
async fn approval_requires_unlock_but_rejection_does_not() {
    let mut h = Harness::new(GateConfig::default());
    h.background.handle(contract_envelope("c1", ORIGIN).into()).unwrap();
    let popup = h.popup();
    let id = popup.mount().unwrap().request_id().unwrap().to_string();

    assert!(matches!(popup.approve(&id).await, Err(GateError::Auth(_))));
    assert!(popup.notice().is_some());
    assert_eq!(h.executor.calls.load(Ordering::SeqCst), 0);

    assert_eq!(popup.reject(&id).unwrap(), Screen::Unlock);
    assert!(popup.notice().is_none());
    h.relay_back();
    assert_eq!(h.windows.closed.lock().unwrap().len(), 1);
    assert!(RequestRegistry::new(h.store.clone()).pending().unwrap().is_empty());
}

// =============================================================================
// Conflicts
// =============================================================================

#[tokio::test]
async fn conflicting_request_leaves_the_original_untouched() {
    let mut h = Harness::new(GateConfig::default());
    let registry = RequestRegistry::new(h.store.clone());

    h.background.handle(contract_envelope("first", ORIGIN).into()).unwrap();
    let original = registry.peek(RequestKind::Contract).unwrap().unwrap();

    h.background.handle(contract_envelope("second", "https://other.example").into()).unwrap();
    let reply = h.replies.try_next().unwrap().unwrap();
    assert_eq!(reply.correlation_id, "second");
    assert_eq!(reply.outcome.into_result(), Err(GateError::RequestConflict(RequestKind::Contract)));

    assert_eq!(registry.peek(RequestKind::Contract).unwrap(), Some(original));
    assert_eq!(h.windows.opened_count(), 1);
    assert_eq!(h.background.in_flight(), 1);
}

// =============================================================================
// Round trips
// =============================================================================

#[tokio::test]
async fn approve_round_trip_resolves_exactly_once() {
    let mut h = Harness::new(GateConfig::default());
    h.connect().await;

    let bridge = h.bridge.clone();
    let call = tokio::spawn(async move { bridge.call_contract(claim_options()).await });
    h.relay_page().await;

    let popup = h.popup();
    let screen = popup.mount().unwrap();
    let id = screen.request_id().unwrap().to_string();
    let after = popup.approve(&id).await.unwrap();
    assert_eq!(after.name(), "dashboard");

    assert_eq!(h.relay_back(), 1);
    assert_eq!(call.await.unwrap().unwrap(), json!({"success": true, "txHash": "abc123", "type": "call"}));
    assert_eq!(h.store.get(keys::PENDING_CONTRACT).unwrap(), None);

    // A late duplicate from the surface settles nothing further.
    assert!(matches!(popup.approve(&id).await, Err(GateError::Validation(_))));
    let (surface_id, _) = h.windows.last_opened();
    assert_eq!(h.background.surface_closed(surface_id).unwrap(), 0);
    assert_eq!(h.relay_back(), 0);
    assert_eq!(h.executor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.bridge.outstanding(), 0);
}

#[tokio::test]
async fn deciding_another_request_keeps_the_popup_open() {
    let mut h = Harness::new(GateConfig::default());
    h.connect().await;

    let bridge = h.bridge.clone();
    let call = tokio::spawn(async move { bridge.call_contract(claim_options()).await });
    h.relay_page().await;
    let (contract_popup, _) = h.windows.last_opened();

    // A second origin asks to connect; its own popup opens.
    h.background.handle(connect_envelope("other-connect", "https://other.example").into()).unwrap();
    assert_eq!(h.windows.opened_count(), 3);

    // The contract popup shows the connection first and the user approves it there.
    let popup = h.popup_for(contract_popup);
    let screen = popup.mount().unwrap();
    assert_eq!(screen.name(), "connection-approval");
    let next = popup.approve(screen.request_id().unwrap()).await.unwrap();
    assert_eq!(next.name(), "contract-approval");
    assert!(!h.windows.closed.lock().unwrap().contains(&contract_popup));

    assert_eq!(h.report_closed_windows(), 0);
    h.relay_back();
    assert_eq!(h.background.in_flight(), 1);

    // The contract request is still live and settles normally.
    let id = next.request_id().unwrap().to_string();
    popup.approve(&id).await.unwrap();
    assert!(h.windows.closed.lock().unwrap().contains(&contract_popup));
    assert_eq!(h.relay_back(), 1);
    assert_eq!(h.report_closed_windows(), 0);
    assert_eq!(call.await.unwrap().unwrap(), json!({"success": true, "txHash": "abc123", "type": "call"}));
}

#[tokio::test]
async fn failed_execution_rejects_the_page() {
    let mut h = Harness::new(GateConfig::default());
    h.connect().await;

    let bridge = h.bridge.clone();
    let call = tokio::spawn(async move {
        let mut options = claim_options();
        options.method_name = "drainAll".into();
        bridge.call_contract(options).await
    });
    h.relay_page().await;

    let popup = h.popup();
    let id = popup.mount().unwrap().request_id().unwrap().to_string();
    popup.approve(&id).await.unwrap();
    h.relay_back();

    match call.await.unwrap() {
        Err(GateError::Execution(msg)) => assert!(msg.contains("unexpected method drainAll"), "{msg}"),
        other => panic!("expected execution failure, got {other:?}"),
    }
}

#[tokio::test]
async fn abandon_round_trip_rejects_once_despite_double_close() {
    let mut h = Harness::new(GateConfig::default());
    let bridge = h.bridge.clone();
    let call = tokio::spawn(async move {
        bridge.connect(ConnectOptions { app_name: "Dapp".into(), ..Default::default() }).await
    });
    h.relay_page().await;
    let (surface_id, _) = h.windows.last_opened();

    h.background.handle(BackgroundEvent::SurfaceClosed(surface_id)).unwrap();
    h.background.handle(BackgroundEvent::SurfaceClosed(surface_id)).unwrap();

    assert_eq!(h.relay_back(), 1);
    assert_eq!(call.await.unwrap(), Err(GateError::Abandoned));
    assert!(RequestRegistry::new(h.store.clone()).pending().unwrap().is_empty());
    assert!(!h.bridge.is_connected());

    // The slot is free again.
    h.background.handle(contract_envelope("retry", ORIGIN).into()).unwrap();
    assert_eq!(h.background.in_flight(), 1);
}

#[tokio::test]
async fn silent_popup_is_abandoned_after_the_inactivity_bound() {
    let mut h = Harness::new(GateConfig::default().with_inactivity_timeout(Duration::from_secs(30)));
    let bridge = h.bridge.clone();
    let call = tokio::spawn(async move {
        bridge.connect(ConnectOptions { app_name: "Dapp".into(), ..Default::default() }).await
    });
    h.relay_page().await;
    let (surface_id, _) = h.windows.last_opened();

    assert_eq!(h.background.expire_idle(Utc::now()).unwrap(), 0);
    let later = Utc::now() + chrono::Duration::seconds(31);
    assert_eq!(h.background.expire_idle(later).unwrap(), 1);
    assert_eq!(h.background.expire_idle(later).unwrap(), 0);
    h.background.handle(BackgroundEvent::SurfaceClosed(surface_id)).unwrap();

    assert_eq!(h.relay_back(), 1);
    assert_eq!(call.await.unwrap(), Err(GateError::Abandoned));
    assert_eq!(*h.windows.closed.lock().unwrap(), vec![surface_id]);
}

// =============================================================================
// Scenario
// =============================================================================

#[tokio::test]
async fn claim_token_while_locked() {
    let mut h = Harness::new(GateConfig::default());
    h.connect().await;
    h.tab().lock().unwrap();

    // Page calls callContract while the wallet is locked.
    let bridge = h.bridge.clone();
    let call = tokio::spawn(async move { bridge.call_contract(claim_options()).await });
    h.relay_page().await;

    // Popup opens.
    let (_, spec) = h.windows.last_opened();
    assert_eq!(spec.kind, SurfaceKind::Popup);
    let popup = h.popup();
    assert!(matches!(popup.mount().unwrap(), Screen::ContractApproval { requires_unlock: true, .. }));

    // User unlocks: contract approval, not the dashboard.
    let screen = popup.unlock(PASSWORD).unwrap();
    let Screen::ContractApproval { request_id, requires_unlock: false, .. } = &screen else {
        panic!("expected contract approval, got {screen:?}");
    };

    // User approves; the popup closes itself.
    popup.approve(request_id).await.unwrap();
    assert_eq!(h.relay_back(), 1);
    let result = call.await.unwrap().unwrap();
    assert_eq!(result["txHash"], "abc123");
    assert_eq!(h.windows.closed.lock().unwrap().len(), 2);
}

// =============================================================================
// Change notification
// =============================================================================

#[tokio::test]
async fn follow_re_renders_when_another_context_writes() {
    let h = Harness::new(GateConfig::default());
    let tab = h.tab();
    tab.unlock(PASSWORD).unwrap();

    let (tx, mut screens) = mpsc::unbounded::<&'static str>();
    let driver = async {
        assert_eq!(screens.next().await, Some("dashboard"));
        h.background.handle(contract_envelope("c1", ORIGIN).into()).unwrap();
        loop {
            if screens.next().await == Some("contract-approval") {
                break;
            }
        }
    };

    tokio::select! {
        result = tab.follow(move |screen| { let _ = tx.unbounded_send(screen.name()); }) => {
            panic!("follow ended early: {result:?}");
        }
        _ = driver => {}
    }
}
