//! Store keys, record types and message names.
//!
//! Centralized registry so every context reads and writes the same names.

/// Shared store keys
pub mod store {
    pub const PASSWORD_HASH: &str = "walletPasswordHash";
    pub const PASSWORD_SALT: &str = "walletPasswordSalt";
    pub const ENCRYPTED_WALLETS: &str = "encryptedWallets";
    /// Decrypted list, session only
    pub const WALLETS: &str = "wallets";
    pub const ACTIVE_WALLET: &str = "activeWalletId";
    pub const IS_WALLET_LOCKED: &str = "isWalletLocked";
    pub const PENDING_CONNECTION: &str = "pendingConnectionRequest";
    pub const PENDING_CONTRACT: &str = "pendingContractRequest";

    /// Keys that must never reach durable storage.
    pub const SESSION_KEYS: &[&str] = &[WALLETS, ACTIVE_WALLET];

    pub fn is_session_key(key: &str) -> bool {
        SESSION_KEYS.contains(&key)
    }
}

/// Scroll types stamped on store records
pub mod types {
    pub const VALUE: &str = "beegate/value@v1";
    pub const PENDING_REQUEST: &str = "beegate/pending-request@v1";
    pub const WALLET_LIST: &str = "beegate/wallets@v1";
    pub const ENCRYPTED_WALLET_LIST: &str = "beegate/encrypted-wallets@v1";

    pub fn for_key(key: &str) -> &'static str {
        use super::store;
        match key {
            store::PENDING_CONNECTION | store::PENDING_CONTRACT => PENDING_REQUEST,
            store::WALLETS => WALLET_LIST,
            store::ENCRYPTED_WALLETS => ENCRYPTED_WALLET_LIST,
            _ => VALUE,
        }
    }
}

/// Message channel type tags
pub mod messages {
    pub const CONNECT_REQUEST: &str = "CONNECT_REQUEST";
    pub const CONTRACT_REQUEST: &str = "CONTRACT_REQUEST";
    pub const CONNECTION_RESULT: &str = "CONNECTION_RESULT";
    pub const CONTRACT_RESULT: &str = "CONTRACT_RESULT";
}

/// Bridge event names
pub mod events {
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
}

