//! WasmBridge: the SDK object a page talks to.

use super::{from_js, js_error, log, to_js};
use crate::bridge::{Bridge, ConnectOptions, ContractCallOptions};
use crate::core::keys::events;
use crate::message::{PageEnvelope, PageReply};
use futures::channel::mpsc;
use futures::StreamExt;
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use wasm_bindgen::prelude::*;

type JsListeners = Rc<RefCell<Vec<(u32, String, js_sys::Function)>>>;

#[wasm_bindgen]
pub struct WasmBridge {
    bridge: Bridge,
    listeners: JsListeners,
    next_listener: Cell<u32>,
}

#[wasm_bindgen]
impl WasmBridge {
    /// `send` receives each outgoing envelope as a plain object and is
    /// expected to forward it to the background.
    #[wasm_bindgen(constructor)]
    pub fn new(origin: String, send: js_sys::Function) -> WasmBridge {
        let (tx, mut rx) = mpsc::unbounded::<PageEnvelope>();
        wasm_bindgen_futures::spawn_local(async move {
            while let Some(envelope) = rx.next().await {
                match to_js(&envelope) {
                    Ok(value) => {
                        if let Err(e) = send.call1(&JsValue::NULL, &value) {
                            log!("[beegate] send failed: {:?}", e);
                        }
                    }
                    Err(e) => log!("[beegate] envelope encode failed: {:?}", e),
                }
            }
        });
        Self { bridge: Bridge::new(origin, tx), listeners: Rc::default(), next_listener: Cell::new(1) }
    }

    /// Bridge for a page where no wallet is reachable.
    #[wasm_bindgen]
    pub fn unavailable(origin: String) -> WasmBridge {
        Self { bridge: Bridge::unavailable(origin), listeners: Rc::default(), next_listener: Cell::new(1) }
    }

    #[wasm_bindgen(js_name = "isAvailable")]
    pub fn is_available(&self) -> bool {
        self.bridge.is_available()
    }

    #[wasm_bindgen(js_name = "isConnected")]
    pub fn is_connected(&self) -> bool {
        self.bridge.is_connected()
    }

    #[wasm_bindgen(getter)]
    pub fn address(&self) -> Option<String> {
        self.bridge.address()
    }

    #[wasm_bindgen]
    pub async fn connect(&self, options: JsValue) -> Result<JsValue, JsValue> {
        let options: ConnectOptions = from_js(options)?;
        let reply = self.bridge.connect(options).await.map_err(js_error)?;
        self.emit(events::CONNECT, &json!({ "address": self.bridge.address() }));
        to_js(&reply)
    }

    #[wasm_bindgen(js_name = "viewCall")]
    pub async fn view_call(&self, options: JsValue) -> Result<JsValue, JsValue> {
        let options: ContractCallOptions = from_js(options)?;
        let reply = self.bridge.view_call(options).await.map_err(js_error)?;
        to_js(&reply)
    }

    #[wasm_bindgen(js_name = "callContract")]
    pub async fn call_contract(&self, options: JsValue) -> Result<JsValue, JsValue> {
        let options: ContractCallOptions = from_js(options)?;
        let reply = self.bridge.call_contract(options).await.map_err(js_error)?;
        to_js(&reply)
    }

    #[wasm_bindgen]
    pub fn disconnect(&self) {
        let address = self.bridge.address();
        self.bridge.disconnect();
        if address.is_some() {
            self.emit(events::DISCONNECT, &json!({ "address": address }));
        }
    }

    /// Hand a background reply to the bridge. False if no call was waiting.
    #[wasm_bindgen]
    pub fn deliver(&self, reply: JsValue) -> Result<bool, JsValue> {
        let reply: PageReply = from_js(reply)?;
        Ok(self.bridge.deliver(reply))
    }

    #[wasm_bindgen]
    pub fn on(&self, event: String, callback: js_sys::Function) -> u32 {
        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        self.listeners.borrow_mut().push((id, event, callback));
        id
    }

    #[wasm_bindgen]
    pub fn off(&self, event: String, id: u32) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, name, _)| !(*lid == id && *name == event));
        before != listeners.len()
    }

    fn emit(&self, event: &str, payload: &serde_json::Value) {
        let Ok(value) = to_js(payload) else { return };
        let callbacks: Vec<js_sys::Function> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, name, _)| name == event)
            .map(|(_, _, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            if let Err(e) = callback.call1(&JsValue::NULL, &value) {
                log!("[beegate] {} listener threw: {:?}", event, e);
            }
        }
    }
}
