//! In-memory store. Cloned handles share the same records.

use super::{record, SharedStore, StoreChange, Watchers};
use crate::error::{GateError, GateResult};
use futures::channel::mpsc;
use nine_s_core::prelude::Scroll;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MemoryStore {
    scrolls: Arc<Mutex<HashMap<String, Scroll>>>,
    watchers: Watchers,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full record for a key, including version metadata.
    pub fn scroll(&self, key: &str) -> GateResult<Option<Scroll>> {
        let scrolls = self.scrolls.lock().map_err(|_| GateError::Store("memory lock".into()))?;
        Ok(scrolls.get(key).cloned())
    }

    pub fn keys(&self) -> GateResult<Vec<String>> {
        let scrolls = self.scrolls.lock().map_err(|_| GateError::Store("memory lock".into()))?;
        let mut keys: Vec<String> = scrolls.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

impl SharedStore for MemoryStore {
    fn get(&self, key: &str) -> GateResult<Option<Value>> {
        Ok(self.scroll(key)?.map(|s| s.data))
    }

    fn set(&self, key: &str, value: Value) -> GateResult<()> {
        let scroll = {
            let mut scrolls = self.scrolls.lock().map_err(|_| GateError::Store("memory lock".into()))?;
            let scroll = record(key, scrolls.get(key), value);
            scrolls.insert(key.to_string(), scroll.clone());
            scroll
        };
        self.watchers.notify(StoreChange::Set(scroll));
        Ok(())
    }

    fn remove(&self, key: &str) -> GateResult<()> {
        let existed = {
            let mut scrolls = self.scrolls.lock().map_err(|_| GateError::Store("memory lock".into()))?;
            scrolls.remove(key).is_some()
        };
        if existed {
            self.watchers.notify(StoreChange::Removed { key: key.to_string() });
        }
        Ok(())
    }

    fn watch(&self) -> GateResult<mpsc::UnboundedReceiver<StoreChange>> {
        self.watchers.subscribe()
    }
}
