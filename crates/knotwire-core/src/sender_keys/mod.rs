//! Sender-key ratchet for group messages.
//!
//! Each (group, sender) pair has an independent symmetric chain. The owner
//! advances the chain per message and signs every ciphertext; receivers
//! verify the signature, then advance a mirror of the chain, caching
//! skipped keys for out-of-order delivery. The chain mirrors the pairwise
//! message chain: same HMAC step, same one-shot message keys, same
//! oldest-out cache policy.
//!
//! # Security Properties
//!
//! - Sender authenticity: every message is signed by the sender's chain
//!   signing key, distributed to members over their pairwise channels
//! - Forward secrecy within a chain: old chain keys are overwritten on
//!   every step
//! - Replay rejection: a skipped key is consumed on first use

mod error;
mod state;

pub use error::SenderKeyError;
pub use state::SenderKeyState;
