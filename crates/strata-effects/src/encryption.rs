//! AES-256-GCM encryption of persisted JSON
//!
//! Key: SHA-256 of the secret. Output: base64 of `iv (12 bytes) || ciphertext`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use strata_core::{Result, StrataError};

const IV_LEN: usize = 12;

fn cipher(secret: &str) -> Result<Aes256Gcm> {
    let key = Sha256::digest(secret.as_bytes());
    Aes256Gcm::new_from_slice(&key).map_err(|e| StrataError::crypto(format!("Invalid key: {e}")))
}

/// Encrypt the JSON text of `value`.
pub fn encrypt_json(value: &Value, secret: &str) -> Result<String> {
    let plaintext = serde_json::to_vec(value)?;
    encrypt_bytes(&plaintext, secret)
}

/// Decrypt text produced by [`encrypt_json`].
pub fn decrypt_json(encoded: &str, secret: &str) -> Result<Value> {
    let plaintext = decrypt_bytes(encoded, secret)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

/// Encrypt raw bytes.
pub fn encrypt_bytes(plaintext: &[u8], secret: &str) -> Result<String> {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let ciphertext = cipher(secret)?
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| StrataError::crypto("Encryption failed"))?;

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(out))
}

/// Decrypt text produced by [`encrypt_bytes`].
pub fn decrypt_bytes(encoded: &str, secret: &str) -> Result<Vec<u8>> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|_| StrataError::crypto("Decryption failed"))?;
    if bytes.len() < IV_LEN {
        return Err(StrataError::crypto("Decryption failed"));
    }
    let (iv, ciphertext) = bytes.split_at(IV_LEN);
    cipher(secret)?
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| StrataError::crypto("Decryption failed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_encrypt_then_decrypt() {
        let value = json!({"default:users": {"data": [1, 2, 3]}});
        let encoded = encrypt_json(&value, "s3cret").unwrap();
        assert_eq!(decrypt_json(&encoded, "s3cret").unwrap(), value);
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let value = json!("same");
        assert_ne!(
            encrypt_json(&value, "k").unwrap(),
            encrypt_json(&value, "k").unwrap()
        );
    }

    #[test]
    fn test_wrong_key_fails() {
        let encoded = encrypt_json(&json!(1), "right").unwrap();
        assert_matches!(decrypt_json(&encoded, "wrong"), Err(StrataError::Crypto { .. }));
        assert_matches!(decrypt_json("!!", "right"), Err(StrataError::Crypto { .. }));
        assert_matches!(decrypt_json("AAAA", "right"), Err(StrataError::Crypto { .. }));
    }
}
