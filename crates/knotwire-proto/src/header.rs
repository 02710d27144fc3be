//! Ratchet message header and its associated-data layout.
//!
//! The header travels in the clear but every field of it is bound to the
//! ciphertext as AEAD associated data, including the optional PQ ratchet
//! material. The associated-data layout is fixed: little-endian u32 length
//! prefixes, a one-byte presence flag for the PQ public record, and a zero
//! length written for an absent PQ ciphertext.

use bytes::BufMut;
use serde::{Deserialize, Serialize};

/// A PQ ratchet public key as carried in a header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PqPublicRecord {
    /// Encoded ML-KEM public key bytes.
    pub bytes: Vec<u8>,
    /// Key id (base64 of the encoded public bytes).
    pub key_id: String,
    /// Parameter set name, e.g. `ml_kem_512`.
    pub parameter_set: String,
}

/// Header of a pairwise ratchet message.
///
/// `n` is the message's position in the sender's current chain (starting at
/// zero); `pn` is the total length of the sender's previous chain, letting
/// the receiver prefetch skipped keys before switching epochs. The PQ fields
/// are present on exactly the first message after a sending ratchet step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetHeader {
    /// Sender's current ratchet public key (raw 32 bytes).
    pub sender_ratchet_public: [u8; 32],
    /// Message number within the sender's current chain.
    pub n: u32,
    /// Length of the sender's previous sending chain.
    pub pn: u32,
    /// Sender's fresh PQ ratchet public key, on epoch-opening messages.
    pub pq_sender_public: Option<PqPublicRecord>,
    /// ML-KEM ciphertext for the receiver's PQ ratchet key, on
    /// epoch-opening messages.
    pub pq_ciphertext: Option<Vec<u8>>,
}

impl RatchetHeader {
    /// Serialize the header into AEAD associated data.
    ///
    /// Layout: `len(sender_public) ‖ sender_public ‖ n ‖ pn ‖ pq_flag
    /// [‖ len ‖ pq_public ‖ len ‖ key_id ‖ len ‖ parameter_set]
    /// ‖ len(pq_ciphertext) ‖ pq_ciphertext`, all lengths u32-LE. A zero
    /// length stands for an absent PQ ciphertext.
    #[must_use]
    pub fn associated_data(&self) -> Vec<u8> {
        let mut ad = Vec::with_capacity(self.associated_data_capacity());

        put_len_prefixed(&mut ad, &self.sender_ratchet_public);
        ad.put_u32_le(self.n);
        ad.put_u32_le(self.pn);

        match &self.pq_sender_public {
            Some(record) => {
                ad.put_u8(1);
                put_len_prefixed(&mut ad, &record.bytes);
                put_len_prefixed(&mut ad, record.key_id.as_bytes());
                put_len_prefixed(&mut ad, record.parameter_set.as_bytes());
            },
            None => ad.put_u8(0),
        }

        match &self.pq_ciphertext {
            Some(ciphertext) => put_len_prefixed(&mut ad, ciphertext),
            None => ad.put_u32_le(0),
        }

        ad
    }

    /// Whether this header carries a complete PQ ratchet step (public key
    /// and ciphertext).
    #[must_use]
    pub fn has_pq_step(&self) -> bool {
        self.pq_sender_public.is_some() && self.pq_ciphertext.is_some()
    }

    fn associated_data_capacity(&self) -> usize {
        let pq_public = self
            .pq_sender_public
            .as_ref()
            .map_or(0, |r| 12 + r.bytes.len() + r.key_id.len() + r.parameter_set.len());
        let pq_ciphertext = self.pq_ciphertext.as_ref().map_or(0, Vec::len);
        4 + 32 + 4 + 4 + 1 + pq_public + 4 + pq_ciphertext
    }
}

/// Write a u32-LE length prefix followed by the bytes.
fn put_len_prefixed(dst: &mut Vec<u8>, bytes: &[u8]) {
    // INVARIANT: Field lengths always fit in u32 because every prefixed
    // field is a key, key id, or ML-KEM ciphertext, all far below 4 GB.
    #[allow(clippy::expect_used)]
    let len = u32::try_from(bytes.len()).expect("invariant: field length fits in u32");
    dst.put_u32_le(len);
    dst.put_slice(bytes);
}
