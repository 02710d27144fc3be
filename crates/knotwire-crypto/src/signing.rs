//! Ed25519 signing and verification
//!
//! Signed prekeys, PQ prekeys, and group sender-key messages are all
//! authenticated with detached Ed25519 signatures.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{CryptoRng, RngCore};

use crate::error::CryptoError;

/// Ed25519 signature size (64 bytes)
pub const SIGNATURE_SIZE: usize = 64;

/// Ed25519 public key size (32 bytes)
pub const SIGNING_PUBLIC_SIZE: usize = 32;

/// An Ed25519 signing key pair.
#[derive(Clone)]
pub struct SigningKeyPair {
    signing: SigningKey,
}

impl SigningKeyPair {
    /// Generate a fresh signing key pair from the caller's RNG.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        Self { signing: SigningKey::generate(rng) }
    }

    /// Raw verifying (public) key bytes.
    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Sign a message, returning the detached 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair").finish_non_exhaustive()
    }
}

/// Verify a detached signature over a message.
///
/// # Errors
///
/// - `SignatureInvalid` if the public key or signature is malformed, or if
///   the signature does not verify over the message
pub fn verify(public: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let verifying =
        VerifyingKey::from_bytes(public).map_err(|_| CryptoError::SignatureInvalid)?;
    let signature = Signature::from_slice(signature).map_err(|_| CryptoError::SignatureInvalid)?;

    verifying.verify(message, &signature).map_err(|_| CryptoError::SignatureInvalid)
}
