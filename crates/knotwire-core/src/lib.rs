//! Knotwire protocol core.
//!
//! The cryptographic state machine of a hybrid post-quantum messaging
//! protocol, leaves first:
//!
//! - [`device`]: per-device long-term, medium-term, and one-time key
//!   material, with atomic one-time consumption
//! - [`directory`]: the prekey directory serving published bundles and
//!   dequeuing one-time keys at most once
//! - [`handshake`]: the hybrid PQXDH handshake deriving a session root key
//!   from a bundle, initiator ephemerals, and an ML-KEM encapsulation
//! - [`session`]: the pairwise hybrid double ratchet — root/sending/
//!   receiving chains, braided DH+PQ epoch steps, skipped-key cache,
//!   header-bound AEAD
//! - [`sender_keys`]: per-(group, sender) symmetric chains with signed
//!   messages for group traffic
//! - [`group`]: sender-key distribution through the pairwise channel
//!
//! Every state machine here is synchronous and single-owner; the only
//! concurrent structures are the one-time-key tables, which consume under a
//! lock. Operations that need entropy take the caller's RNG.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod device;
pub mod directory;
pub mod group;
pub mod handshake;
pub mod sender_keys;
pub mod session;

pub use config::ProtocolConfig;
pub use device::{DeviceKeystore, DevicePrekeys, KeystoreError, OneTimePrekey};
pub use directory::{DirectoryError, PrekeyBundle, PrekeyDirectory};
pub use group::{GroupError, GroupKeyRegistry};
pub use handshake::{HandshakeError, InitiatorHandshake, ResponderHandshake};
pub use sender_keys::{SenderKeyError, SenderKeyState};
pub use session::{RatchetSession, SessionError};
