//! Knotwire Cryptographic Primitives
//!
//! Cryptographic building blocks for Knotwire. Pure functions with
//! deterministic outputs; every operation that needs entropy takes the
//! caller's RNG, which enables seeded deterministic testing.
//!
//! # Key Lifecycle
//!
//! This section describes the key hierarchy from the hybrid handshake secret
//! to per-message encryption keys. A session starts from a root key derived
//! over both a classical X25519 agreement and an ML-KEM encapsulation. Each
//! ratchet epoch braids a fresh DH output and a fresh KEM shared secret back
//! into the root key, from which a chain key is split off. Advancing a chain
//! produces one-time message keys.
//!
//! ```text
//! X25519 shares ‖ ML-KEM secret
//!        │
//!        ▼ HKDF ("X3DH")
//! Root Key (per session)
//!        │
//!        ▼ HKDF ("Signal-Braid-Root", per epoch)
//! Chain Key (per direction)
//!        │
//!        ▼ HMAC chain step
//! Message Keys
//!        │
//!        ▼ AES-256-GCM
//! Ciphertext
//! ```
//!
//! Message keys are used for exactly one AEAD operation and are discarded
//! (or cached briefly for out-of-order delivery) immediately after use.
//!
//! # Security
//!
//! Hybrid confidentiality:
//! - Every root key update depends on both an X25519 output and an ML-KEM
//!   shared secret; the session stays confidential while either holds
//!
//! Forward Secrecy:
//! - Chain advancement: old chain keys are overwritten after deriving the
//!   next key
//! - Message key disposal: keys are zeroized after single use
//!
//! Authenticity:
//! - AES-256-GCM AEAD with mandatory associated data binds every header
//!   field to the ciphertext
//! - Ed25519 signatures authenticate prekeys and group messages

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead;
pub mod agreement;
pub mod error;
pub mod kdf;
pub mod kem;
pub mod signing;

pub use aead::{open, seal, NONCE_SIZE, TAG_SIZE};
pub use agreement::{key_id, AgreementKeyPair, AGREEMENT_PUBLIC_SIZE};
pub use error::CryptoError;
pub use kem::{KemKeyPair, KemParameterSet, KemPublicKey, SHARED_SECRET_SIZE};
pub use signing::{verify, SigningKeyPair, SIGNATURE_SIZE, SIGNING_PUBLIC_SIZE};
