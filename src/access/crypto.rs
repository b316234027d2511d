//! Password verifier and per-wallet sealing.
//!
//! Key derivation and AEAD come from `nine_s_store::crypto`. The stored
//! verifier is `blake3(derived key)`; each wallet payload is
//! `base64(nonce || ciphertext)` with the address bound in as AAD.

use super::{StoredWallet, Wallet};
use crate::error::{GateError, GateResult};
use nine_s_store::crypto::{
    decrypt_with_aad, derive_key_from_password, encrypt_with_aad, generate_argon2_salt, DerivedKey,
};

const AAD_PREFIX: &str = "beegate-wallet:";
const NONCE_LEN: usize = 12;

pub(crate) struct PasswordRecord {
    pub hash: String,
    pub salt: String,
}

/// Fresh salt and verifier for a new password.
pub(crate) fn create_password(password: &str) -> GateResult<(DerivedKey, PasswordRecord)> {
    let salt = generate_argon2_salt();
    let key = derive_key_from_password(password.as_bytes(), &salt)?;
    let record = PasswordRecord { hash: verifier(&key), salt: encode_base64(&salt) };
    Ok((key, record))
}

pub(crate) fn derive_key(password: &str, salt: &str) -> GateResult<DerivedKey> {
    let salt = decode_base64(salt)?;
    Ok(derive_key_from_password(password.as_bytes(), &salt)?)
}

pub(crate) fn verifier(key: &DerivedKey) -> String {
    blake3::hash(&key.0).to_hex().to_string()
}

pub(crate) fn seal_wallet(key: &DerivedKey, wallet: &Wallet) -> GateResult<StoredWallet> {
    let plaintext = serde_json::to_vec(wallet)?;
    let (nonce, ciphertext) = encrypt_with_aad(key, &plaintext, aad(&wallet.address).as_bytes())?;
    let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&ciphertext);
    Ok(StoredWallet { address: wallet.address.clone(), encrypted_payload: encode_base64(&payload) })
}

pub(crate) fn open_wallet(key: &DerivedKey, stored: &StoredWallet) -> GateResult<Wallet> {
    let payload = decode_base64(&stored.encrypted_payload)?;
    if payload.len() <= NONCE_LEN {
        return Err(GateError::Crypto("wallet payload truncated".into()));
    }
    let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
    let nonce: [u8; NONCE_LEN] = nonce
        .try_into()
        .map_err(|_| GateError::Crypto("wallet nonce invalid".into()))?;
    let plaintext = decrypt_with_aad(key, &nonce, ciphertext, aad(&stored.address).as_bytes())?;
    let wallet: Wallet = serde_json::from_slice(&plaintext)?;
    if wallet.address != stored.address {
        return Err(GateError::Crypto("wallet address mismatch".into()));
    }
    Ok(wallet)
}

fn aad(address: &str) -> String {
    format!("{AAD_PREFIX}{address}")
}

fn encode_base64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn decode_base64(value: &str) -> GateResult<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| GateError::Crypto(format!("base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet() -> Wallet {
        Wallet { address: "0xabc".into(), name: "Main".into(), private_key: "deadbeef".into() }
    }

    #[test]
    fn sealed_wallet_opens_with_same_key_only() {
        let (key, record) = create_password("correct horse").unwrap();
        let sealed = seal_wallet(&key, &wallet()).unwrap();
        assert!(!sealed.encrypted_payload.contains("deadbeef"));
        assert_eq!(open_wallet(&key, &sealed).unwrap(), wallet());

        let again = derive_key("correct horse", &record.salt).unwrap();
        assert_eq!(verifier(&again), record.hash);

        let wrong = derive_key("battery staple", &record.salt).unwrap();
        assert_ne!(verifier(&wrong), record.hash);
        assert!(open_wallet(&wrong, &sealed).is_err());
    }

    #[test]
    fn payload_is_bound_to_its_address() {
        let (key, _) = create_password("pw").unwrap();
        let mut sealed = seal_wallet(&key, &wallet()).unwrap();
        sealed.address = "0xother".into();
        assert!(open_wallet(&key, &sealed).is_err());
    }
}
