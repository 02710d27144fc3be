//! Pairwise hybrid double ratchet.
//!
//! A session is a pure synchronous state machine owned by one logical
//! caller. Each DH epoch braids a fresh X25519 agreement with an ML-KEM
//! encapsulation into the root key; each message advances a per-direction
//! HMAC chain. Late and out-of-order messages are served from a bounded
//! skipped-key cache whose entries are consumed on first use, so replays
//! fail.
//!
//! # Architecture
//!
//! ```text
//! Root Key ──braid (DH ‖ KEM)──▶ Root Key'
//!     │                             │
//!     ▼                             ▼
//! Sending Chain                Receiving Chain
//!     │                             │
//!     ▼ per message                 ▼ per message
//! Message Key ──AES-256-GCM──▶ Ciphertext ──▶ Message Key
//! ```

mod error;
mod ratchet;
mod skipped;

pub use error::SessionError;
pub use ratchet::RatchetSession;
pub(crate) use skipped::SkippedKeyCache;
