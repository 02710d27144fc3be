//! Transport envelope: the tagged union of the two ciphertext kinds.
//!
//! The transport moves opaque envelope bytes; only endpoints decode them. A
//! pairwise envelope optionally carries the initiator's handshake record so
//! a responder can set up its session from whichever early message arrives
//! first.

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{ProtocolError, Result},
    header::RatchetHeader,
    initial::InitialBundle,
};

/// Maximum accepted envelope size (1 MB).
pub const MAX_ENVELOPE_SIZE: usize = 1024 * 1024;

/// A pairwise ratchet ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetMessage {
    /// Clear header, bound to the payload as associated data.
    pub header: RatchetHeader,
    /// `nonce(12) ‖ ciphertext ‖ tag(16)`.
    pub payload: Vec<u8>,
}

/// A group sender-key ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderKeyMessage {
    /// Group this message belongs to.
    pub group_id: String,
    /// Sending device.
    pub sender_id: String,
    /// Position in the sender's chain.
    pub counter: u32,
    /// Detached Ed25519 signature (64 bytes) over the payload.
    pub signature: Vec<u8>,
    /// `nonce(12) ‖ ciphertext ‖ tag(16)`.
    pub payload: Vec<u8>,
}

impl SenderKeyMessage {
    /// Associated data binding this message's routing fields.
    #[must_use]
    pub fn associated_data(&self) -> Vec<u8> {
        group_associated_data(&self.group_id, &self.sender_id, self.counter)
    }
}

/// AEAD associated data for a group message:
/// `len(group_id) ‖ group_id ‖ len(sender_id) ‖ sender_id ‖ counter`,
/// lengths and counter u32-LE.
#[must_use]
pub fn group_associated_data(group_id: &str, sender_id: &str, counter: u32) -> Vec<u8> {
    let mut ad = Vec::with_capacity(4 + group_id.len() + 4 + sender_id.len() + 4);

    // INVARIANT: group and sender ids are short identifiers, far below 4 GB.
    #[allow(clippy::expect_used)]
    let group_len = u32::try_from(group_id.len()).expect("invariant: id length fits in u32");
    #[allow(clippy::expect_used)]
    let sender_len = u32::try_from(sender_id.len()).expect("invariant: id length fits in u32");

    ad.put_u32_le(group_len);
    ad.put_slice(group_id.as_bytes());
    ad.put_u32_le(sender_len);
    ad.put_slice(sender_id.as_bytes());
    ad.put_u32_le(counter);
    ad
}

/// A pairwise envelope: the ratchet ciphertext plus, while the session is
/// unacknowledged, the initiator's handshake record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairwiseEnvelope {
    /// Sending device id.
    pub from: String,
    /// Handshake record, present until the initiator has seen a reply.
    pub initial: Option<InitialBundle>,
    /// The ratchet ciphertext.
    pub message: RatchetMessage,
}

/// Everything the transport can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Envelope {
    /// Pairwise ratchet traffic.
    Pairwise(PairwiseEnvelope),
    /// Group sender-key traffic.
    Group(SenderKeyMessage),
}

impl Envelope {
    /// Encode the envelope as CBOR into the buffer.
    ///
    /// # Errors
    ///
    /// - `CborEncode` if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        ciborium::ser::into_writer(self, dst.writer())
            .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Encode the envelope into a fresh byte vector.
    ///
    /// # Errors
    ///
    /// - `CborEncode` if serialization fails
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Decode an envelope from CBOR bytes.
    ///
    /// The size check happens before the CBOR parser sees the input.
    ///
    /// # Errors
    ///
    /// - `EnvelopeTooLarge` if the input exceeds [`MAX_ENVELOPE_SIZE`]
    /// - `CborDecode` if deserialization fails
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_ENVELOPE_SIZE {
            return Err(ProtocolError::EnvelopeTooLarge {
                size: bytes.len(),
                max: MAX_ENVELOPE_SIZE,
            });
        }

        ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
    }
}
