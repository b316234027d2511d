//! Integration Tests: wallet access gate over real stores
//!
//! These tests verify:
//! 1. Unlock reproduces stored wallets exactly
//! 2. A wrong password mutates nothing
//! 3. A record that fails to decrypt is dropped, not fatal
//! 4. A corrupted encrypted store routes to onboarding
//! 5. Session keys stay off disk with the file store

use beegate::core::keys::store as keys;
use beegate::{
    FileStore, GateError, MemoryStore, Screen, SharedStore, TabSurface, Wallet, WalletAccess, WalletLockState,
};
use futures::channel::mpsc;
use once_cell::sync::Lazy;
use serde_json::json;
use tempfile::TempDir;

const PASSWORD: &str = "correct horse battery staple";

static WALLETS: Lazy<Vec<Wallet>> = Lazy::new(|| {
    vec![
        Wallet {
            address: "bee1qalice0000000000000000000000000000000".into(),
            name: "Alice".into(),
            private_key: "a1".repeat(32),
        },
        Wallet {
            address: "bee1qbob000000000000000000000000000000000".into(),
            name: "Bob \u{1f41d}".into(),
            private_key: "b2".repeat(32),
        },
    ]
});

fn onboarded<S: SharedStore>(store: S) -> WalletAccess<S> {
    let access = WalletAccess::new(store);
    access.setup(PASSWORD).expect("setup");
    for wallet in WALLETS.iter() {
        access.add_wallet(PASSWORD, wallet.clone()).expect("add wallet");
    }
    access
}

#[test]
fn fresh_install_is_never_gated() {
    let access = WalletAccess::new(MemoryStore::new());
    assert!(!access.is_setup().unwrap());
    assert!(!access.should_gate().unwrap());
    assert_eq!(access.lock_state().unwrap(), WalletLockState::Locked);
    assert!(matches!(access.unlock(PASSWORD), Err(GateError::Auth(_))));
}

#[test]
fn unlock_reproduces_every_wallet_byte_for_byte() {
    let store = MemoryStore::new();
    let access = onboarded(store.clone());
    assert!(access.should_gate().unwrap());

    let unlocked = access.unlock(PASSWORD).expect("unlock");
    assert_eq!(unlocked, *WALLETS);
    assert_eq!(
        serde_json::to_string(&access.wallets().unwrap()).unwrap(),
        serde_json::to_string(&*WALLETS).unwrap()
    );
    assert_eq!(access.lock_state().unwrap(), WalletLockState::Unlocked);
    assert_eq!(store.get(keys::ACTIVE_WALLET).unwrap(), Some(json!(WALLETS[0].address)));

    // Encrypted form never carries the key material.
    let at_rest = store.get(keys::ENCRYPTED_WALLETS).unwrap().unwrap().to_string();
    assert!(!at_rest.contains(&WALLETS[0].private_key));
}

#[test]
fn wrong_password_mutates_nothing() {
    let store = MemoryStore::new();
    let access = onboarded(store.clone());
    access.unlock(PASSWORD).unwrap();
    access.lock().unwrap();

    let flag_before = store.get(keys::IS_WALLET_LOCKED).unwrap();
    let versions_before: Vec<_> = store
        .keys()
        .unwrap()
        .into_iter()
        .map(|k| (k.clone(), store.scroll(&k).unwrap().map(|s| s.metadata.version)))
        .collect();

    match access.unlock("hunter2") {
        Err(GateError::Auth(_)) => {}
        other => panic!("expected AuthError, got {other:?}"),
    }

    assert_eq!(store.get(keys::IS_WALLET_LOCKED).unwrap(), flag_before);
    assert_eq!(store.get(keys::WALLETS).unwrap(), None);
    let versions_after: Vec<_> = store
        .keys()
        .unwrap()
        .into_iter()
        .map(|k| (k.clone(), store.scroll(&k).unwrap().map(|s| s.metadata.version)))
        .collect();
    assert_eq!(versions_before, versions_after);
}

#[test]
fn undecryptable_record_is_dropped_from_the_batch() {
    let store = MemoryStore::new();
    let access = onboarded(store.clone());

    let mut records = store.get(keys::ENCRYPTED_WALLETS).unwrap().unwrap();
    records[1]["encryptedPayload"] = json!("bm90IGEgcmVhbCBjaXBoZXJ0ZXh0IGF0IGFsbCwgc29ycnk=");
    records.as_array_mut().unwrap().push(json!({"address": 7}));
    store.set(keys::ENCRYPTED_WALLETS, records).unwrap();

    let unlocked = access.unlock(PASSWORD).expect("unlock survives a bad record");
    assert_eq!(unlocked, vec![WALLETS[0].clone()]);
    assert_eq!(access.lock_state().unwrap(), WalletLockState::Unlocked);
}

#[test]
fn corrupted_store_routes_to_onboarding() {
    let store = MemoryStore::new();
    let access = onboarded(store.clone());
    store.set(keys::ENCRYPTED_WALLETS, json!({"not": "a list"})).unwrap();

    assert!(access.unlock(PASSWORD).unwrap().is_empty());
    assert!(!access.should_gate().unwrap());

    let (tx, _rx) = mpsc::unbounded();
    let controller = beegate::LifecycleController::new(store, TabSurface, tx);
    assert_eq!(controller.mount().unwrap(), Screen::Welcome);
}

#[test]
fn lock_is_idempotent_and_clears_the_session() {
    let store = MemoryStore::new();
    let access = onboarded(store.clone());
    access.unlock(PASSWORD).unwrap();

    access.lock().unwrap();
    access.lock().unwrap();
    assert!(access.should_gate().unwrap());
    assert!(access.wallets().unwrap().is_empty());
    assert_eq!(store.get(keys::ACTIVE_WALLET).unwrap(), None);
    assert_eq!(store.get(keys::IS_WALLET_LOCKED).unwrap(), Some(json!(true)));
}

#[test]
fn partial_unlock_reads_as_locked() {
    let store = MemoryStore::new();
    let access = onboarded(store.clone());
    access.unlock(PASSWORD).unwrap();

    // Another context locked halfway: flag still open, list gone.
    store.remove(keys::WALLETS).unwrap();
    assert!(access.should_gate().unwrap());
    assert_eq!(access.lock_state().unwrap(), WalletLockState::Locked);
}

#[test]
fn active_pointer_follows_the_loaded_list() {
    let store = MemoryStore::new();
    let access = onboarded(store.clone());
    access.unlock(PASSWORD).unwrap();

    access.set_active_wallet(&WALLETS[1].address).unwrap();
    assert_eq!(access.active_wallet().unwrap().unwrap().address, WALLETS[1].address);

    access.remove_wallet(&WALLETS[1].address).unwrap();
    assert_eq!(access.active_wallet().unwrap().unwrap().address, WALLETS[0].address);
    assert!(matches!(access.set_active_wallet("bee1qnobody"), Err(GateError::Validation(_))));

    store.set(keys::ACTIVE_WALLET, json!("bee1qdangling")).unwrap();
    assert_eq!(access.active_wallet().unwrap().unwrap().address, WALLETS[0].address);
    assert_eq!(store.get(keys::ACTIVE_WALLET).unwrap(), Some(json!(WALLETS[0].address)));
}

#[test]
fn duplicate_wallet_is_rejected() {
    let access = onboarded(MemoryStore::new());
    assert!(matches!(access.add_wallet(PASSWORD, WALLETS[0].clone()), Err(GateError::Validation(_))));
    assert!(matches!(access.setup("again"), Err(GateError::Auth(_))));
}

#[test]
fn file_store_keeps_the_session_in_memory() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("gate").join("store.json");

    let access = onboarded(FileStore::open(&path).unwrap());
    access.unlock(PASSWORD).unwrap();
    assert_eq!(access.lock_state().unwrap(), WalletLockState::Unlocked);

    let raw = std::fs::read_to_string(&path).unwrap();
    for wallet in WALLETS.iter() {
        assert!(!raw.contains(&wallet.private_key));
    }

    // A second process sees the unlocked flag but no session list: gated.
    let other = WalletAccess::new(FileStore::open(&path).unwrap());
    assert!(other.should_gate().unwrap());
    assert_eq!(other.unlock(PASSWORD).unwrap(), *WALLETS);
}
