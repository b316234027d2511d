//! Wallet Access Manager: password verification, wallet decryption and the
//! two-state lock gate.
//!
//! At rest only [`StoredWallet`] records exist. A successful unlock writes the
//! decrypted list to the session tier of the shared store, then the active
//! pointer, then the unlocked flag. Readers that observe any prefix of that
//! sequence still see a locked wallet.

mod crypto;

use crate::core::keys::store as keys;
use crate::error::{GateError, GateResult};
use crate::store::{SharedStore, StoreExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Derived from the store, never stored itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletLockState {
    Locked,
    Unlocked,
}

/// A decrypted wallet. Lives only in the session tier while unlocked.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub address: String,
    #[serde(default)]
    pub name: String,
    pub private_key: String,
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("name", &self.name)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// The at-rest form of a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredWallet {
    pub address: String,
    pub encrypted_payload: String,
}

#[derive(Clone)]
pub struct WalletAccess<S> {
    store: S,
}

impl<S: SharedStore> WalletAccess<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// True iff a password hash has ever been recorded.
    pub fn is_setup(&self) -> GateResult<bool> {
        Ok(self.read_string(keys::PASSWORD_HASH)?.is_some())
    }

    /// True iff setup is complete and the session is not fully unlocked.
    /// A fresh install is never gated.
    pub fn should_gate(&self) -> GateResult<bool> {
        if !self.is_setup()? {
            return Ok(false);
        }
        let unlocked = self.store.get(keys::IS_WALLET_LOCKED)? == Some(Value::Bool(false));
        Ok(!unlocked || self.session_wallets()?.is_none())
    }

    pub fn lock_state(&self) -> GateResult<WalletLockState> {
        if self.should_gate()? {
            return Ok(WalletLockState::Locked);
        }
        match self.session_wallets()? {
            Some(wallets) if !wallets.is_empty() => Ok(WalletLockState::Unlocked),
            _ => Ok(WalletLockState::Locked),
        }
    }

    /// Record a new password. Leaves the wallet locked with an empty wallet set.
    pub fn setup(&self, password: &str) -> GateResult<()> {
        if password.is_empty() {
            return Err(GateError::Validation("password must not be empty".into()));
        }
        if self.is_setup()? {
            return Err(GateError::Auth("password already set".into()));
        }
        let (_, record) = crypto::create_password(password)?;
        // Salt first: the hash marks setup as complete.
        self.store.set(keys::PASSWORD_SALT, json!(record.salt))?;
        self.store.set(keys::PASSWORD_HASH, json!(record.hash))?;
        if self.store.get(keys::ENCRYPTED_WALLETS)?.is_none() {
            self.store.set(keys::ENCRYPTED_WALLETS, json!([]))?;
        }
        self.store.set(keys::IS_WALLET_LOCKED, json!(true))?;
        info!("wallet password recorded");
        Ok(())
    }

    /// Verify `password` and decrypt every stored wallet into the session.
    ///
    /// A record that fails to decrypt is logged and dropped; it never aborts
    /// the batch. On a wrong password nothing is written.
    pub fn unlock(&self, password: &str) -> GateResult<Vec<Wallet>> {
        let key = self.verify(password)?;

        let mut wallets = Vec::new();
        for stored in self.encrypted_wallets()? {
            match crypto::open_wallet(&key, &stored) {
                Ok(wallet) => wallets.push(wallet),
                Err(e) => warn!(address = %stored.address, error = %e, "dropping wallet that failed to decrypt"),
            }
        }

        self.store.set_as(keys::WALLETS, &wallets)?;
        self.repair_active_pointer(&wallets)?;
        self.store.set(keys::IS_WALLET_LOCKED, json!(false))?;
        info!(count = wallets.len(), "wallet unlocked");
        Ok(wallets)
    }

    /// Drop the session. Idempotent.
    pub fn lock(&self) -> GateResult<()> {
        self.store.set(keys::IS_WALLET_LOCKED, json!(true))?;
        self.store.remove(keys::WALLETS)?;
        self.store.remove(keys::ACTIVE_WALLET)?;
        info!("wallet locked");
        Ok(())
    }

    pub fn add_wallet(&self, password: &str, wallet: Wallet) -> GateResult<()> {
        if wallet.address.trim().is_empty() {
            return Err(GateError::Validation("missing required field 'address'".into()));
        }
        let key = self.verify(password)?;
        let mut stored = self.encrypted_wallets()?;
        if stored.iter().any(|w| w.address == wallet.address) {
            return Err(GateError::Validation(format!("wallet {} already exists", wallet.address)));
        }
        stored.push(crypto::seal_wallet(&key, &wallet)?);
        self.store.set_as(keys::ENCRYPTED_WALLETS, &stored)?;

        if self.lock_flag_open()? {
            if let Some(mut session) = self.session_wallets()? {
                session.push(wallet.clone());
                self.store.set_as(keys::WALLETS, &session)?;
                self.repair_active_pointer(&session)?;
            }
        }
        info!(address = %wallet.address, "wallet added");
        Ok(())
    }

    pub fn remove_wallet(&self, address: &str) -> GateResult<()> {
        let mut stored = self.encrypted_wallets()?;
        let before = stored.len();
        stored.retain(|w| w.address != address);
        if stored.len() == before {
            return Err(GateError::Validation(format!("unknown wallet {address}")));
        }
        self.store.set_as(keys::ENCRYPTED_WALLETS, &stored)?;

        if let Some(mut session) = self.session_wallets()? {
            session.retain(|w| w.address != address);
            self.store.set_as(keys::WALLETS, &session)?;
            self.repair_active_pointer(&session)?;
        }
        info!(address = %address, "wallet removed");
        Ok(())
    }

    /// Decrypted wallets of the current session; empty while locked.
    pub fn wallets(&self) -> GateResult<Vec<Wallet>> {
        Ok(self.session_wallets()?.unwrap_or_default())
    }

    /// The wallet the active pointer names. A dangling pointer is reset to the
    /// first loaded wallet.
    pub fn active_wallet(&self) -> GateResult<Option<Wallet>> {
        let wallets = self.wallets()?;
        let pointer = self.read_string(keys::ACTIVE_WALLET)?;
        if let Some(address) = &pointer {
            if let Some(wallet) = wallets.iter().find(|w| &w.address == address) {
                return Ok(Some(wallet.clone()));
            }
        }
        let first = wallets.into_iter().next();
        if let Some(wallet) = &first {
            debug!(stale = ?pointer, address = %wallet.address, "active wallet pointer reset");
            self.store.set(keys::ACTIVE_WALLET, json!(wallet.address))?;
        }
        Ok(first)
    }

    pub fn set_active_wallet(&self, address: &str) -> GateResult<()> {
        if !self.wallets()?.iter().any(|w| w.address == address) {
            return Err(GateError::Validation(format!("unknown wallet {address}")));
        }
        self.store.set(keys::ACTIVE_WALLET, json!(address))
    }

    fn verify(&self, password: &str) -> GateResult<nine_s_store::crypto::DerivedKey> {
        let (Some(hash), Some(salt)) = (
            self.read_string(keys::PASSWORD_HASH)?,
            self.read_string(keys::PASSWORD_SALT)?,
        ) else {
            return Err(GateError::Auth("no password has been set".into()));
        };
        let key = crypto::derive_key(password, &salt)?;
        if crypto::verifier(&key) != hash {
            warn!("password verification failed");
            return Err(GateError::Auth("incorrect password".into()));
        }
        Ok(key)
    }

    /// Stored records. A store that is not a list is logged and read as empty,
    /// which sends the user back through onboarding.
    fn encrypted_wallets(&self) -> GateResult<Vec<StoredWallet>> {
        match self.store.get(keys::ENCRYPTED_WALLETS)? {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items
                .into_iter()
                .filter_map(|item| match serde_json::from_value::<StoredWallet>(item) {
                    Ok(stored) => Some(stored),
                    Err(e) => {
                        warn!(error = %e, "skipping unreadable encrypted wallet record");
                        None
                    }
                })
                .collect()),
            Some(_) => {
                error!("encrypted wallet store is not a list; treating as empty");
                Ok(Vec::new())
            }
        }
    }

    fn session_wallets(&self) -> GateResult<Option<Vec<Wallet>>> {
        match self.store.get(keys::WALLETS)? {
            None => Ok(None),
            Some(value) => match serde_json::from_value(value) {
                Ok(wallets) => Ok(Some(wallets)),
                Err(e) => {
                    warn!(error = %e, "session wallet list unreadable");
                    Ok(None)
                }
            },
        }
    }

    fn lock_flag_open(&self) -> GateResult<bool> {
        Ok(self.store.get(keys::IS_WALLET_LOCKED)? == Some(Value::Bool(false)))
    }

    fn repair_active_pointer(&self, wallets: &[Wallet]) -> GateResult<()> {
        let pointer = self.read_string(keys::ACTIVE_WALLET)?;
        let valid = pointer
            .as_deref()
            .is_some_and(|address| wallets.iter().any(|w| w.address == address));
        if valid {
            return Ok(());
        }
        match wallets.first() {
            Some(first) => self.store.set(keys::ACTIVE_WALLET, json!(first.address)),
            None => self.store.remove(keys::ACTIVE_WALLET),
        }
    }

    fn read_string(&self, key: &str) -> GateResult<Option<String>> {
        Ok(match self.store.get(key)? {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn wallet(address: &str) -> Wallet {
        Wallet { address: address.into(), name: format!("wallet {address}"), private_key: format!("key-{address}") }
    }

    #[test]
    fn fresh_install_is_never_gated() {
        let access = WalletAccess::new(MemoryStore::new());
        assert!(!access.is_setup().unwrap());
        assert!(!access.should_gate().unwrap());
        assert_eq!(access.lock_state().unwrap(), WalletLockState::Locked);
    }

    #[test]
    fn partial_unlock_writes_still_gate() {
        let store = MemoryStore::new();
        let access = WalletAccess::new(store.clone());
        access.setup("pw").unwrap();

        // Flag flipped but no wallet list yet.
        store.set(keys::IS_WALLET_LOCKED, json!(false)).unwrap();
        assert!(access.should_gate().unwrap());

        // List present but flag still locked.
        store.set(keys::IS_WALLET_LOCKED, json!(true)).unwrap();
        store.set(keys::WALLETS, json!([])).unwrap();
        assert!(access.should_gate().unwrap());

        // Garbage flag values count as locked.
        store.set(keys::IS_WALLET_LOCKED, json!("false")).unwrap();
        assert!(access.should_gate().unwrap());
    }

    #[test]
    fn unlock_lock_cycle() {
        let store = MemoryStore::new();
        let access = WalletAccess::new(store.clone());
        access.setup("pw").unwrap();
        access.add_wallet("pw", wallet("0xa")).unwrap();
        access.add_wallet("pw", wallet("0xb")).unwrap();
        assert!(access.should_gate().unwrap());

        let wallets = access.unlock("pw").unwrap();
        assert_eq!(wallets, vec![wallet("0xa"), wallet("0xb")]);
        assert!(!access.should_gate().unwrap());
        assert_eq!(access.lock_state().unwrap(), WalletLockState::Unlocked);
        assert_eq!(access.active_wallet().unwrap(), Some(wallet("0xa")));

        access.lock().unwrap();
        access.lock().unwrap();
        assert!(access.should_gate().unwrap());
        assert_eq!(store.get(keys::WALLETS).unwrap(), None);
        assert_eq!(store.get(keys::ACTIVE_WALLET).unwrap(), None);
    }

    #[test]
    fn wrong_password_changes_nothing() {
        let store = MemoryStore::new();
        let access = WalletAccess::new(store.clone());
        access.setup("pw").unwrap();
        access.add_wallet("pw", wallet("0xa")).unwrap();

        let flag_before = store.get(keys::IS_WALLET_LOCKED).unwrap();
        let err = access.unlock("nope").unwrap_err();
        assert!(matches!(err, GateError::Auth(_)));
        assert_eq!(store.get(keys::IS_WALLET_LOCKED).unwrap(), flag_before);
        assert_eq!(store.get(keys::WALLETS).unwrap(), None);
    }

    #[test]
    fn unlock_without_password_is_auth_error() {
        let access = WalletAccess::new(MemoryStore::new());
        assert!(matches!(access.unlock("pw"), Err(GateError::Auth(_))));
    }

    #[test]
    fn dangling_active_pointer_resets_to_first() {
        let store = MemoryStore::new();
        let access = WalletAccess::new(store.clone());
        access.setup("pw").unwrap();
        access.add_wallet("pw", wallet("0xa")).unwrap();
        access.add_wallet("pw", wallet("0xb")).unwrap();
        access.unlock("pw").unwrap();

        access.set_active_wallet("0xb").unwrap();
        assert_eq!(access.active_wallet().unwrap().map(|w| w.address), Some("0xb".into()));

        store.set(keys::ACTIVE_WALLET, json!("0xgone")).unwrap();
        assert_eq!(access.active_wallet().unwrap().map(|w| w.address), Some("0xa".into()));
        assert_eq!(store.get(keys::ACTIVE_WALLET).unwrap(), Some(json!("0xa")));

        access.remove_wallet("0xa").unwrap();
        assert_eq!(store.get(keys::ACTIVE_WALLET).unwrap(), Some(json!("0xb")));
        assert!(access.set_active_wallet("0xa").is_err());
    }

    #[test]
    fn setup_twice_is_rejected() {
        let access = WalletAccess::new(MemoryStore::new());
        access.setup("pw").unwrap();
        assert!(matches!(access.setup("other"), Err(GateError::Auth(_))));
    }
}
