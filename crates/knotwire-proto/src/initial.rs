//! Initiator handshake record.

use serde::{Deserialize, Serialize};

/// First-flight handshake record emitted by a session initiator.
///
/// Carried alongside early ratchet messages until the initiator sees a
/// reply, so the responder can derive the session root key no matter which
/// of the initiator's first-chain messages arrives first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialBundle {
    /// Initiator's device id.
    pub initiator_device_id: String,
    /// Initiator's long-term agreement public key (IK_A).
    pub identity_agreement: [u8; 32],
    /// Initiator's handshake ephemeral public key (EK).
    pub ephemeral: [u8; 32],
    /// Id of the responder one-time agreement prekey that was consumed, if
    /// the bundle offered one.
    pub one_time_key_id: Option<String>,
    /// ML-KEM ciphertext encapsulated to the selected responder PQ prekey.
    pub pq_ciphertext: Vec<u8>,
    /// Id of the selected responder PQ prekey.
    pub pq_key_id: String,
    /// Whether the selected PQ prekey was a one-time key (consumed) rather
    /// than the reusable identity PQ prekey.
    pub pq_is_one_time: bool,
}
