//! Encrypted payloads: private transaction changes and wrapped keys.
//!
//! Private changes are encrypted under the group's read key with a nonce
//! derived from `{in: coId, tx: txId}`. A wrapped key (`encrypted_<hex>`)
//! is one read key encrypted under another, with a nonce derived from
//! `{encryptedID, encryptingID}`.

use bytes::Bytes;
use serde::Serialize;

use coval_core::{canonical_bytes, from_canonical_bytes, Change, KeyId, RawCoId, TransactionId};

use crate::crypto::{EncryptionNonce, KeySecret};
use crate::error::{PermsError, Result};

/// Nonce material for anything stored in transaction `tx` of `covalue`.
#[derive(Debug, Serialize)]
pub struct TransactionNonce<'a> {
    #[serde(rename = "in")]
    pub covalue: &'a RawCoId,
    pub tx: &'a TransactionId,
}

impl<'a> TransactionNonce<'a> {
    pub fn new(covalue: &'a RawCoId, tx: &'a TransactionId) -> Self {
        Self { covalue, tx }
    }
}

#[derive(Serialize)]
struct KeyWrapNonce<'a> {
    #[serde(rename = "encryptedID")]
    encrypted: &'a KeyId,
    #[serde(rename = "encryptingID")]
    encrypting: &'a KeyId,
}

/// Nonce for a private transaction's changes.
pub fn transaction_nonce(covalue: &RawCoId, tx: &TransactionId) -> Result<EncryptionNonce> {
    EncryptionNonce::from_material(&TransactionNonce { covalue, tx })
}

/// Encrypt the changes of a private transaction.
pub fn encrypt_changes(
    changes: &[Change],
    key: &KeySecret,
    covalue: &RawCoId,
    tx: &TransactionId,
) -> Result<Bytes> {
    let plaintext = canonical_bytes(changes)?;
    let nonce = transaction_nonce(covalue, tx)?;
    Ok(Bytes::from(key.encrypt(&plaintext, &nonce)?))
}

/// Decrypt the changes of a private transaction.
pub fn decrypt_changes(
    ciphertext: &[u8],
    key: &KeySecret,
    covalue: &RawCoId,
    tx: &TransactionId,
) -> Result<Vec<Change>> {
    let nonce = transaction_nonce(covalue, tx)?;
    let plaintext = key.decrypt(ciphertext, &nonce)?;
    from_canonical_bytes(&plaintext)
        .map_err(|e| PermsError::DecryptionError(format!("undecodable changes: {e}")))
}

/// Encrypt `key` under `encrypting`, returning the `encrypted_<hex>` form.
pub fn wrap_key(
    key_id: &KeyId,
    key: &KeySecret,
    encrypting_id: &KeyId,
    encrypting: &KeySecret,
) -> Result<String> {
    let nonce = EncryptionNonce::from_material(&KeyWrapNonce {
        encrypted: key_id,
        encrypting: encrypting_id,
    })?;
    let ciphertext = encrypting.encrypt(key.as_bytes(), &nonce)?;
    Ok(format!("encrypted_{}", hex::encode(ciphertext)))
}

/// Recover a key wrapped by [`wrap_key`].
pub fn unwrap_key(
    wrapped: &str,
    key_id: &KeyId,
    encrypting_id: &KeyId,
    encrypting: &KeySecret,
) -> Result<KeySecret> {
    let hex_part = wrapped
        .strip_prefix("encrypted_")
        .ok_or_else(|| PermsError::InvalidEncoding(wrapped.to_string()))?;
    let ciphertext =
        hex::decode(hex_part).map_err(|e| PermsError::InvalidEncoding(e.to_string()))?;
    let nonce = EncryptionNonce::from_material(&KeyWrapNonce {
        encrypted: key_id,
        encrypting: encrypting_id,
    })?;
    let bytes = encrypting.decrypt(&ciphertext, &nonce)?;
    let secret: [u8; 32] = bytes
        .try_into()
        .map_err(|_| PermsError::DecryptionError("wrapped key has wrong length".into()))?;
    Ok(KeySecret(secret))
}
