//! X25519 key agreement
//!
//! Ratchet keys, identity agreement keys, and prekeys are all X25519 pairs.
//! A key's identity (key-id) is the standard-base64 encoding of its raw
//! public bytes; the raw-byte form is what makes cache identities
//! collision-safe.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand_core::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey, StaticSecret};

/// Encoded X25519 public key size (32 bytes)
pub const AGREEMENT_PUBLIC_SIZE: usize = 32;

/// An X25519 key pair usable for repeated Diffie-Hellman agreements.
#[derive(Clone)]
pub struct AgreementKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl AgreementKeyPair {
    /// Generate a fresh key pair from the caller's RNG.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let secret = StaticSecret::random_from_rng(&mut *rng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Raw public key bytes.
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Key id: base64 of the raw public bytes.
    pub fn key_id(&self) -> String {
        key_id(&self.public_bytes())
    }

    /// Compute the shared secret with a peer public key.
    pub fn diffie_hellman(&self, peer_public: &[u8; 32]) -> [u8; 32] {
        self.secret.diffie_hellman(&PublicKey::from(*peer_public)).to_bytes()
    }
}

impl std::fmt::Debug for AgreementKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgreementKeyPair").field("key_id", &self.key_id()).finish_non_exhaustive()
    }
}

/// Key id for a raw 32-byte public key: its standard-base64 encoding.
pub fn key_id(public: &[u8; 32]) -> String {
    STANDARD.encode(public)
}
