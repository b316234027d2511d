//! WasmSurface: the lifecycle controller as hosted by the popup or the tab.
//!
//! Both pages construct the same object; only `surface` differs.

use super::storage::LocalStorageStore;
use super::{from_js, js_error, log, to_js};
use crate::controller::LifecycleController;
use crate::error::{GateError, GateResult};
use crate::message::SurfaceMessage;
use crate::surface::{SurfaceAdapter, SurfaceKind};
use futures::channel::mpsc;
use futures::StreamExt;
use serde_json::Value;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

/// The window this module is running in.
struct CurrentWindow {
    kind: SurfaceKind,
    request_id: Option<String>,
}

impl SurfaceAdapter for CurrentWindow {
    fn kind(&self) -> SurfaceKind {
        self.kind
    }

    fn opened_for(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    fn close(&self) -> GateResult<()> {
        web_sys::window()
            .ok_or_else(|| GateError::Store("no window".into()))?
            .close()
            .map_err(super::storage::js_err)
    }
}

#[wasm_bindgen]
pub struct WasmSurface {
    controller: Rc<LifecycleController<LocalStorageStore>>,
}

#[wasm_bindgen]
impl WasmSurface {
    /// `surface` is `"popup"` or `"tab"`. `requestId` is the id from the
    /// `?request=` parameter when the background opened this popup for a
    /// pending request. `send` forwards result messages to the background.
    #[wasm_bindgen(constructor)]
    pub fn new(app: String, surface: String, request_id: Option<String>, send: js_sys::Function) -> Result<WasmSurface, JsValue> {
        let kind = match surface.as_str() {
            "popup" => SurfaceKind::Popup,
            "tab" => SurfaceKind::Tab,
            other => return Err(js_error(GateError::Policy(format!("unknown surface '{other}'")))),
        };
        let store = LocalStorageStore::open(&app).map_err(js_error)?;

        let (tx, mut rx) = mpsc::unbounded::<SurfaceMessage>();
        wasm_bindgen_futures::spawn_local(async move {
            while let Some(message) = rx.next().await {
                match to_js(&message) {
                    Ok(value) => {
                        if let Err(e) = send.call1(&JsValue::NULL, &value) {
                            log!("[beegate] result send failed: {:?}", e);
                        }
                    }
                    Err(e) => log!("[beegate] result encode failed: {:?}", e),
                }
            }
        });

        let request_id = request_id.filter(|id| !id.is_empty() && kind == SurfaceKind::Popup);
        let window = CurrentWindow { kind, request_id };
        log!("[beegate] {:?} surface for {}", kind, app);
        Ok(Self { controller: Rc::new(LifecycleController::new(store, window, tx)) })
    }

    #[wasm_bindgen]
    pub fn mount(&self) -> Result<JsValue, JsValue> {
        to_js(&self.controller.mount().map_err(js_error)?)
    }

    #[wasm_bindgen]
    pub fn refresh(&self) -> Result<JsValue, JsValue> {
        to_js(&self.controller.refresh().map_err(js_error)?)
    }

    /// Re-render on every store change, including writes from other contexts.
    #[wasm_bindgen]
    pub fn follow(&self, render: js_sys::Function) {
        let controller = self.controller.clone();
        wasm_bindgen_futures::spawn_local(async move {
            let result = controller
                .follow(|screen| {
                    if let Ok(value) = to_js(screen) {
                        let _ = render.call1(&JsValue::NULL, &value);
                    }
                })
                .await;
            if let Err(e) = result {
                log!("[beegate] follow ended: {}", e);
            }
        });
    }

    #[wasm_bindgen(js_name = "isSetup")]
    pub fn is_setup(&self) -> Result<bool, JsValue> {
        self.controller.access().is_setup().map_err(js_error)
    }

    #[wasm_bindgen]
    pub fn setup(&self, password: String) -> Result<JsValue, JsValue> {
        self.controller.access().setup(&password).map_err(js_error)?;
        self.refresh()
    }

    #[wasm_bindgen]
    pub fn unlock(&self, password: String) -> Result<JsValue, JsValue> {
        to_js(&self.controller.unlock(&password).map_err(js_error)?)
    }

    #[wasm_bindgen]
    pub fn lock(&self) -> Result<JsValue, JsValue> {
        to_js(&self.controller.lock().map_err(js_error)?)
    }

    /// Approve a connection request.
    #[wasm_bindgen]
    pub async fn approve(&self, request_id: String) -> Result<JsValue, JsValue> {
        to_js(&self.controller.approve(&request_id).await.map_err(js_error)?)
    }

    /// Approve a contract request with the result of the call the page
    /// already made through the wallet SDK, or the error it raised.
    #[wasm_bindgen(js_name = "approveWithResult")]
    pub fn approve_with_result(&self, request_id: String, result: JsValue, error: Option<String>) -> Result<JsValue, JsValue> {
        let outcome = match error {
            Some(message) => Err(GateError::Execution(message)),
            None => Ok(from_js::<Value>(result)?),
        };
        to_js(&self.controller.approve_with_result(&request_id, outcome).map_err(js_error)?)
    }

    #[wasm_bindgen]
    pub fn reject(&self, request_id: String) -> Result<JsValue, JsValue> {
        to_js(&self.controller.reject(&request_id).map_err(js_error)?)
    }

    #[wasm_bindgen(getter)]
    pub fn notice(&self) -> Option<String> {
        self.controller.notice()
    }

    #[wasm_bindgen(js_name = "dismissNotice")]
    pub fn dismiss_notice(&self) {
        self.controller.dismiss_notice();
    }
}
