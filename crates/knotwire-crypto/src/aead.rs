//! Authenticated encryption using AES-256-GCM
//!
//! Sealed output is `nonce(12) ‖ ciphertext ‖ tag(16)`. Associated data is
//! mandatory on every call: any mutation of the bound header material fails
//! the tag check on open.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand_core::{CryptoRng, RngCore};

use crate::error::CryptoError;

/// AES-GCM nonce size (12 bytes), prepended to the ciphertext
pub const NONCE_SIZE: usize = 12;

/// GCM authentication tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Encrypt a plaintext under a one-shot message key.
///
/// A fresh random nonce is drawn from `rng` and prepended to the output.
/// The associated data is authenticated but not encrypted.
pub fn seal(
    key: &[u8; 32],
    plaintext: &[u8],
    associated_data: &[u8],
    rng: &mut (impl RngCore + CryptoRng),
) -> Vec<u8> {
    let Ok(cipher) = Aes256Gcm::new_from_slice(key) else {
        unreachable!("AES-256-GCM accepts 32-byte keys");
    };

    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce);

    let payload = Payload { msg: plaintext, aad: associated_data };
    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(&nonce), payload) else {
        unreachable!("AES-256-GCM encryption cannot fail with valid inputs");
    };

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    sealed
}

/// Decrypt a sealed message produced by [`seal`].
///
/// # Errors
///
/// - `AeadOpenFailed` if the input is shorter than nonce + tag, or if the
///   authentication tag does not verify (wrong key, tampered ciphertext, or
///   tampered associated data)
pub fn open(key: &[u8; 32], sealed: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::AeadOpenFailed);
    }

    let Ok(cipher) = Aes256Gcm::new_from_slice(key) else {
        unreachable!("AES-256-GCM accepts 32-byte keys");
    };

    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    let payload = Payload { msg: ciphertext, aad: associated_data };

    cipher
        .decrypt(Nonce::from_slice(nonce), payload)
        .map_err(|_| CryptoError::AeadOpenFailed)
}
