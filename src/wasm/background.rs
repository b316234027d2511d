//! WasmBackground: the coordinator inside the extension's service side.
//!
//! Windows are created by the extension API, which only JS can reach. The
//! [`QueuedHost`] hands out surface ids immediately and queues the window
//! operations; the glue drains them with `takeWindowOps()` after each call and
//! reports closes back with `surfaceClosed(id)`.

use super::storage::LocalStorageStore;
use super::{from_js, js_error, log, to_js};
use crate::background::Background;
use crate::config::GateConfig;
use crate::error::{GateError, GateResult};
use crate::message::{PageEnvelope, PageReply, SurfaceMessage};
use crate::surface::{SurfaceHost, SurfaceId, SurfaceSpec};
use chrono::Utc;
use futures::channel::mpsc;
use serde::Serialize;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowOps {
    pub open: Vec<OpenWindow>,
    pub close: Vec<SurfaceId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenWindow {
    pub surface_id: SurfaceId,
    #[serde(flatten)]
    pub spec: SurfaceSpec,
}

#[derive(Default)]
pub struct QueuedHost {
    next_id: AtomicU64,
    ops: Mutex<WindowOps>,
}

impl QueuedHost {
    pub fn take(&self) -> WindowOps {
        self.ops.lock().map(|mut ops| std::mem::take(&mut *ops)).unwrap_or_default()
    }
}

impl SurfaceHost for QueuedHost {
    fn open(&self, spec: &SurfaceSpec) -> GateResult<SurfaceId> {
        let surface_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.ops
            .lock()
            .map_err(|_| GateError::Store("window queue lock".into()))?
            .open
            .push(OpenWindow { surface_id, spec: spec.clone() });
        Ok(surface_id)
    }

    fn close(&self, id: SurfaceId) -> GateResult<()> {
        self.ops
            .lock()
            .map_err(|_| GateError::Store("window queue lock".into()))?
            .close
            .push(id);
        Ok(())
    }
}

#[wasm_bindgen]
pub struct WasmBackground {
    background: Background<LocalStorageStore>,
    host: Arc<QueuedHost>,
    replies: RefCell<mpsc::UnboundedReceiver<PageReply>>,
}

#[wasm_bindgen]
impl WasmBackground {
    /// `inactivitySecs` of 0 leaves idle expiry off.
    #[wasm_bindgen(constructor)]
    pub fn new(app: String, popup_url: String, tab_url: String, inactivity_secs: u32) -> Result<WasmBackground, JsValue> {
        let mut config = GateConfig::new(app.clone()).with_tab_url(tab_url);
        config.popup_url = popup_url;
        if inactivity_secs > 0 {
            config = config.with_inactivity_timeout(std::time::Duration::from_secs(inactivity_secs.into()));
        }
        let store = LocalStorageStore::open(&app).map_err(js_error)?;
        let host = Arc::new(QueuedHost::default());
        let (tx, rx) = mpsc::unbounded();
        log!("[beegate] background ready for {}", app);
        Ok(Self {
            background: Background::new(store, host.clone(), tx, &config),
            host,
            replies: RefCell::new(rx),
        })
    }

    #[wasm_bindgen(js_name = "handlePage")]
    pub fn handle_page(&self, envelope: JsValue) -> Result<(), JsValue> {
        let envelope: PageEnvelope = from_js(envelope)?;
        self.background.handle_page(envelope).map(|_| ()).map_err(js_error)
    }

    #[wasm_bindgen(js_name = "handleSurface")]
    pub fn handle_surface(&self, message: JsValue) -> Result<bool, JsValue> {
        let message: SurfaceMessage = from_js(message)?;
        self.background.handle_surface(message).map_err(js_error)
    }

    #[wasm_bindgen(js_name = "surfaceClosed")]
    pub fn surface_closed(&self, surface_id: u32) -> Result<u32, JsValue> {
        let count = self.background.surface_closed(surface_id.into()).map_err(js_error)?;
        Ok(count as u32)
    }

    /// Call from a periodic alarm.
    #[wasm_bindgen(js_name = "expireIdle")]
    pub fn expire_idle(&self) -> Result<u32, JsValue> {
        let count = self.background.expire_idle(Utc::now()).map_err(js_error)?;
        Ok(count as u32)
    }

    #[wasm_bindgen(js_name = "openTab")]
    pub fn open_tab(&self) -> Result<(), JsValue> {
        self.background.handle(crate::background::BackgroundEvent::OpenTab).map_err(js_error)
    }

    #[wasm_bindgen(js_name = "takeWindowOps")]
    pub fn take_window_ops(&self) -> Result<JsValue, JsValue> {
        to_js(&self.host.take())
    }

    /// Replies ready for pages, each carrying its `correlationId`.
    #[wasm_bindgen(js_name = "takeReplies")]
    pub fn take_replies(&self) -> Result<JsValue, JsValue> {
        let mut replies = Vec::new();
        let mut rx = self.replies.borrow_mut();
        while let Ok(Some(reply)) = rx.try_next() {
            replies.push(reply);
        }
        to_js(&replies)
    }
}
