//! WASM module: the gate inside a browser extension
//!
//! Each extension context loads the same module and picks its role:
//!
//! ```text
//! ┌──────────────┐  envelopes   ┌────────────────┐  window ops  ┌───────────┐
//! │  WasmBridge  │─────────────►│ WasmBackground │─────────────►│ JS glue   │
//! │  (page)      │◄─────────────│ (service side) │◄─────────────│ (windows) │
//! └──────────────┘   replies    └───────▲────────┘ close events └───────────┘
//!                                       │ surface results
//!                               ┌───────┴────────┐
//!                               │  WasmSurface   │  popup or tab, one
//!                               │  (controller)  │  shared controller
//!                               └───────┬────────┘
//!                                       │
//!                               ┌───────▼────────┐
//!                               │ localStorage + │
//!                               │ BroadcastChannel│
//!                               └────────────────┘
//! ```
//!
//! JavaScript only moves messages and windows; every decision is made here.

mod background;
mod bridge;
mod storage;
mod surface;

pub use background::{QueuedHost, WasmBackground};
pub use bridge::WasmBridge;
pub use storage::LocalStorageStore;
pub use surface::WasmSurface;

use crate::error::GateError;
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Initialize WASM module (called automatically on load)
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Log to browser console
pub fn console_log(s: &str) {
    web_sys::console::log_1(&JsValue::from_str(s));
}

macro_rules! log {
    ($($t:tt)*) => {
        crate::wasm::console_log(&format!($($t)*))
    }
}

pub(crate) use log;

/// `Error` whose `name` is the wire code, so JS can branch on it.
pub(crate) fn js_error(err: GateError) -> JsValue {
    let js = js_sys::Error::new(&err.to_string());
    js.set_name(err.code());
    js.into()
}

pub(crate) fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    let serializer = serde_wasm_bindgen::Serializer::new().serialize_maps_as_objects(true);
    value
        .serialize(&serializer)
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

pub(crate) fn from_js<T: serde::de::DeserializeOwned>(value: JsValue) -> Result<T, JsValue> {
    serde_wasm_bindgen::from_value(value).map_err(|e| js_error(GateError::Validation(e.to_string())))
}
