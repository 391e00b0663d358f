//! Authenticated encryption using XChaCha20-Poly1305.
//!
//! XChaCha20-Poly1305 provides both confidentiality and authenticity,
//! with a 24-byte nonce that is safe for random generation.

use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng, Payload},
    XChaCha20Poly1305,
};

use crate::keys::KEY_LENGTH;
use tacostore_common::{Error, Result};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

fn check_key(key: &[u8]) -> Option<String> {
    if key.len() != KEY_LENGTH {
        return Some(format!(
            "Invalid key length: expected {}, got {}",
            KEY_LENGTH,
            key.len()
        ));
    }
    None
}

/// Encrypt plaintext, authenticating `aad` alongside it.
///
/// # Postconditions
/// - Returns nonce || ciphertext || tag
/// - The nonce is randomly generated
///
/// # Errors
/// - `Encryption` if the key length is incorrect or the cipher fails
pub fn seal(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if let Some(message) = check_key(key) {
        return Err(Error::encryption(message));
    }

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| Error::encryption(format!("Encryption failed: {}", e)))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypt data produced by [`seal`] with the same `aad`.
///
/// # Errors
/// - `Decryption` if the key length is incorrect
/// - `Decryption` if the input is shorter than nonce + tag
/// - `Decryption` if authentication fails (tampered data or wrong aad)
pub fn open(key: &[u8], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if let Some(message) = check_key(key) {
        return Err(Error::decryption(message));
    }

    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::decryption("Ciphertext too short"));
    }

    let (nonce_bytes, encrypted) = sealed.split_at(NONCE_SIZE);
    let nonce = GenericArray::from_slice(nonce_bytes);

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: encrypted,
                aad,
            },
        )
        .map_err(|e| Error::decryption(format!("Decryption failed: {}", e)))
}
