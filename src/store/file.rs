//! File-backed store for native contexts.
//!
//! Every operation re-reads the file so separate processes observe each other's
//! writes. Session keys (the decrypted wallet list and the active pointer) are
//! held in memory only and never reach disk.

use super::{record, MemoryStore, SharedStore, StoreChange, Watchers};
use crate::core::keys::store::is_session_key;
use crate::error::{GateError, GateResult};
use futures::channel::mpsc;
use nine_s_core::prelude::Scroll;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
    session: MemoryStore,
    watchers: Watchers,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> GateResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GateError::Store(format!("mkdir: {e}")))?;
        }
        let store = Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
            session: MemoryStore::new(),
            watchers: Watchers::default(),
        };
        // Fail early on a file we cannot parse.
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> GateResult<BTreeMap<String, Scroll>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| GateError::Store(format!("read: {e}")))?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| GateError::Store(format!("store json: {e}")))
    }

    fn save(&self, scrolls: &BTreeMap<String, Scroll>) -> GateResult<()> {
        let json = serde_json::to_string_pretty(scrolls)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(|e| GateError::Store(format!("write: {e}")))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| GateError::Store(format!("rename: {e}")))
    }
}

impl SharedStore for FileStore {
    fn get(&self, key: &str) -> GateResult<Option<Value>> {
        if is_session_key(key) {
            return self.session.get(key);
        }
        Ok(self.load()?.remove(key).map(|s| s.data))
    }

    fn set(&self, key: &str, value: Value) -> GateResult<()> {
        if is_session_key(key) {
            self.session.set(key, value.clone())?;
            let scroll = self.session.scroll(key)?.unwrap_or_else(|| record(key, None, value));
            self.watchers.notify(StoreChange::Set(scroll));
            return Ok(());
        }
        let scroll = {
            let _guard = self.write_lock.lock().map_err(|_| GateError::Store("file lock".into()))?;
            let mut scrolls = self.load()?;
            let scroll = record(key, scrolls.get(key), value);
            scrolls.insert(key.to_string(), scroll.clone());
            self.save(&scrolls)?;
            scroll
        };
        self.watchers.notify(StoreChange::Set(scroll));
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
        let existed = {
            let _guard = self.write_lock.lock().map_err(|_| GateError::Store("file lock".into()))?;
            let mut scrolls = self.load()?;
            let existed = scrolls.remove(key).is_some();
            if existed {
                self.save(&scrolls)?;
            }
            existed
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
