//! Shared Store: key/value records readable from every execution context.
//!
//! Each operation is independent and immediately durable. There is no cross-key
//! transaction: writers that need several keys to look atomic write them in a
//! fixed order, and readers treat any intermediate state as locked.
//!
//! Change notification is best effort. A context reacts to another context's
//! write either through [`SharedStore::watch`] or by re-reading on its own
//! activation; neither is assumed to be instantaneous.

mod memory;
#[cfg(feature = "native")]
mod file;

pub use memory::MemoryStore;
#[cfg(feature = "native")]
pub use file::FileStore;

use crate::core::keys::{store as keys, types};
use crate::error::{GateError, GateResult};
use futures::channel::mpsc;
use nine_s_core::prelude::{Metadata, Scroll};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// A change observed on the store.
#[derive(Debug, Clone)]
pub enum StoreChange {
    Set(Scroll),
    Removed { key: String },
}

impl StoreChange {
    pub fn key(&self) -> &str {
        match self {
            StoreChange::Set(scroll) => &scroll.key,
            StoreChange::Removed { key } => key,
        }
    }
}

pub trait SharedStore {
    fn get(&self, key: &str) -> GateResult<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> GateResult<()>;
    fn remove(&self, key: &str) -> GateResult<()>;
    /// Subscribe to changes made through this store handle (and, where the host
    /// supports it, through other contexts).
    fn watch(&self) -> GateResult<mpsc::UnboundedReceiver<StoreChange>>;
}

/// Typed helpers over any [`SharedStore`].
pub trait StoreExt: SharedStore {
    /// Read and decode a record. A record that does not decode is an error.
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> GateResult<Option<T>> {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn set_as<T: Serialize>(&self, key: &str, value: &T) -> GateResult<()> {
        self.set(key, serde_json::to_value(value)?)
    }
}

impl<S: SharedStore + ?Sized> StoreExt for S {}

/// Build the versioned record for a key.
pub(crate) fn record(key: &str, previous: Option<&Scroll>, data: Value) -> Scroll {
    let version = previous.map(|s| s.metadata.version + 1).unwrap_or(1);
    Scroll {
        key: key.to_string(),
        type_: types::for_key(key).to_string(),
        metadata: Metadata::default().with_version(version),
        data,
    }
}

/// Decode one raw durable entry. A bare JSON value written by an older build
/// is adopted as a first-version record; text that is not JSON reads as absent.
#[cfg_attr(not(feature = "wasm"), allow(dead_code))]
pub(crate) fn decode_record(key: &str, raw: &str) -> Option<Scroll> {
    if let Ok(scroll) = serde_json::from_str::<Scroll>(raw) {
        return Some(scroll);
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => Some(record(key, None, value)),
        Err(e) => {
            warn!(key, error = %e, "unreadable store entry; treating as absent");
            None
        }
    }
}

/// True when a durable change from another context makes this context's
/// decrypted session stale: a lock, or a different encrypted wallet set.
#[cfg_attr(not(feature = "wasm"), allow(dead_code))]
pub(crate) fn invalidates_session(change: &StoreChange) -> bool {
    match change.key() {
        keys::ENCRYPTED_WALLETS | keys::PASSWORD_HASH => true,
        keys::IS_WALLET_LOCKED => !matches!(change, StoreChange::Set(s) if s.data == Value::Bool(false)),
        _ => false,
    }
}

/// Drop every session key from an in-memory session tier, reporting each
/// removal to `watchers`. Returns how many keys were present.
#[cfg_attr(not(feature = "wasm"), allow(dead_code))]
pub(crate) fn purge_session(session: &MemoryStore, watchers: &Watchers) -> GateResult<usize> {
    let mut purged = 0;
    for key in keys::SESSION_KEYS {
        if session.get(key)?.is_some() {
            session.remove(key)?;
            watchers.notify(StoreChange::Removed { key: key.to_string() });
            purged += 1;
        }
    }
    Ok(purged)
}

/// Fan-out of store changes to subscribers. Closed receivers are pruned on send.
#[derive(Clone, Default)]
pub(crate) struct Watchers {
    senders: Arc<Mutex<Vec<mpsc::UnboundedSender<StoreChange>>>>,
}

impl Watchers {
    pub(crate) fn subscribe(&self) -> GateResult<mpsc::UnboundedReceiver<StoreChange>> {
        let (tx, rx) = mpsc::unbounded();
        self.senders
            .lock()
            .map_err(|_| GateError::Store("watchers lock".into()))?
            .push(tx);
        Ok(rx)
    }

    pub(crate) fn notify(&self, change: StoreChange) {
        if let Ok(mut senders) = self.senders.lock() {
            senders.retain(|tx| tx.unbounded_send(change.clone()).is_ok());
        }
    }
}
