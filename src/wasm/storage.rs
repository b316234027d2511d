//! localStorage-backed shared store.
//!
//! Every extension context on the same origin sees one `localStorage`. Writes
//! are announced on a `BroadcastChannel` so other contexts can re-read the key;
//! the announcement carries only the key name, never the value.

use super::log;
use crate::core::keys::store::is_session_key;
use crate::error::{GateError, GateResult};
use crate::store::{
    decode_record, invalidates_session, purge_session, record, MemoryStore, SharedStore, StoreChange, Watchers,
};
use futures::channel::mpsc;
use nine_s_core::prelude::Scroll;
use serde_json::Value;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{BroadcastChannel, MessageEvent, Storage};

pub const CHANGE_CHANNEL: &str = "beegate-store";

#[derive(Clone)]
pub struct LocalStorageStore {
    storage: Storage,
    prefix: String,
    channel: Option<BroadcastChannel>,
    session: MemoryStore,
    watchers: Watchers,
}

impl LocalStorageStore {
    /// Bind to `window.localStorage`, namespacing keys under `<app>:`.
    pub fn open(app: &str) -> GateResult<Self> {
        let storage = web_sys::window()
            .ok_or_else(|| GateError::Store("no window".into()))?
            .local_storage()
            .map_err(js_err)?
            .ok_or_else(|| GateError::Store("localStorage unavailable".into()))?;

        let channel = match BroadcastChannel::new(CHANGE_CHANNEL) {
            Ok(channel) => Some(channel),
            Err(e) => {
                log!("[beegate] change channel unavailable: {:?}", e);
                None
            }
        };

        let store = Self {
            storage,
            prefix: format!("{app}:"),
            channel,
            session: MemoryStore::new(),
            watchers: Watchers::default(),
        };
        store.listen();
        Ok(store)
    }

    fn listen(&self) {
        let Some(channel) = &self.channel else { return };
        let this = self.clone();
        let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            let Some(key) = event.data().as_string() else { return };
            let key_name = key.clone();
            let change = match this.read(&key) {
                Ok(Some(scroll)) => StoreChange::Set(scroll),
                Ok(None) => StoreChange::Removed { key },
                Err(e) => {
                    log!("[beegate] re-read of {} failed: {}", key, e);
                    return;
                }
            };
            let stale = invalidates_session(&change);
            this.watchers.notify(change);
            // Another context locked or re-keyed: this context's decrypted copy goes too.
            if stale {
                match purge_session(&this.session, &this.watchers) {
                    Ok(0) => {}
                    Ok(n) => log!("[beegate] session cleared after {} changed ({} keys)", key_name, n),
                    Err(e) => log!("[beegate] session purge failed: {}", e),
                }
            }
        });
        channel.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
        // Lives as long as the context.
        on_message.forget();
    }

    fn slot(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn read(&self, key: &str) -> GateResult<Option<Scroll>> {
        Ok(self
            .storage
            .get_item(&self.slot(key))
            .map_err(js_err)?
            .and_then(|raw| decode_record(key, &raw)))
    }

    fn announce(&self, key: &str) {
        if let Some(channel) = &self.channel {
            if let Err(e) = channel.post_message(&JsValue::from_str(key)) {
                log!("[beegate] change announcement failed: {:?}", e);
            }
        }
    }
}

impl SharedStore for LocalStorageStore {
    fn get(&self, key: &str) -> GateResult<Option<Value>> {
        if is_session_key(key) {
            return self.session.get(key);
        }
        Ok(self.read(key)?.map(|s| s.data))
    }

    fn set(&self, key: &str, value: Value) -> GateResult<()> {
        if is_session_key(key) {
            self.session.set(key, value.clone())?;
            let scroll = self.session.scroll(key)?.unwrap_or_else(|| record(key, None, value));
            self.watchers.notify(StoreChange::Set(scroll));
            return Ok(());
        }
        let previous = self.read(key).unwrap_or(None);
        let scroll = record(key, previous.as_ref(), value);
        self.storage
            .set_item(&self.slot(key), &serde_json::to_string(&scroll)?)
            .map_err(js_err)?;
        self.watchers.notify(StoreChange::Set(scroll));
        self.announce(key);
        Ok(())
    }

    fn remove(&self, key: &str) -> GateResult<()> {
        if is_session_key(key) {
            let existed = self.session.get(key)?.is_some();
            self.session.remove(key)?;
            if existed {
                self.watchers.notify(StoreChange::Removed { key: key.to_string() });
            }
            return Ok(());
        }
        self.storage.remove_item(&self.slot(key)).map_err(js_err)?;
        self.watchers.notify(StoreChange::Removed { key: key.to_string() });
        self.announce(key);
        Ok(())
    }

    fn watch(&self) -> GateResult<mpsc::UnboundedReceiver<StoreChange>> {
        self.watchers.subscribe()
    }
}

pub(crate) fn js_err(e: JsValue) -> GateError {
    GateError::Store(e.as_string().unwrap_or_else(|| format!("{e:?}")))
}
