//! Key derivation: HMAC chain steps and HKDF root steps
//!
//! # Security Properties
//!
//! - Domain separation: the chain KDF uses distinct single-byte labels for
//!   message keys and chain keys; the root KDFs use distinct HKDF info
//!   strings
//! - Determinism: same inputs always produce the same outputs
//! - One-wayness: deriving a message key does not reveal the next chain key

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Label for deriving a one-shot message key from a chain key
const MESSAGE_KEY_LABEL: &[u8] = &[0x01];

/// Label for deriving the next chain key
const CHAIN_KEY_LABEL: &[u8] = &[0x02];

/// HKDF info for the classical root step
const ROOT_INFO: &[u8] = b"Signal-Root";

/// HKDF info for the hybrid (braided) root step
const BRAID_ROOT_INFO: &[u8] = b"Signal-Braid-Root";

/// HKDF info for the handshake secret
const HANDSHAKE_INFO: &[u8] = b"X3DH";

/// Advance a symmetric chain by one step.
///
/// Returns `(message_key, next_chain_key)`. The message key is used for
/// exactly one AEAD operation; the next chain key replaces the input.
pub fn chain_step(chain_key: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    (hmac_label(chain_key, MESSAGE_KEY_LABEL), hmac_label(chain_key, CHAIN_KEY_LABEL))
}

/// Classical root KDF: mix a DH output into the root key.
///
/// Returns `(new_root_key, chain_key)` from
/// `HKDF-SHA256(ikm = dh, salt = root_key, info = "Signal-Root")`.
pub fn root_step_classical(root_key: &[u8; 32], dh_output: &[u8]) -> ([u8; 32], [u8; 32]) {
    let hkdf = Hkdf::<Sha256>::new(Some(root_key), dh_output);
    expand_and_split(&hkdf, ROOT_INFO)
}

/// Hybrid root KDF: braid a DH output and a KEM shared secret into the root
/// key.
///
/// Returns `(new_root_key, chain_key)` from
/// `HKDF-SHA256(ikm = root_key ‖ dh ‖ pq, salt = ∅, info =
/// "Signal-Braid-Root")`. The new root depends on both secrets, so the epoch
/// stays confidential while either the classical or the PQ component holds.
pub fn root_step_hybrid(
    root_key: &[u8; 32],
    dh_output: &[u8],
    pq_secret: &[u8; 32],
) -> ([u8; 32], [u8; 32]) {
    let mut ikm = Vec::with_capacity(root_key.len() + dh_output.len() + pq_secret.len());
    ikm.extend_from_slice(root_key);
    ikm.extend_from_slice(dh_output);
    ikm.extend_from_slice(pq_secret);

    let hkdf = Hkdf::<Sha256>::new(None, &ikm);
    expand_and_split(&hkdf, BRAID_ROOT_INFO)
}

/// Derive the initial session root key from the concatenated handshake
/// shares.
///
/// `ikm` is the concatenation of the X25519 DH shares followed by the ML-KEM
/// shared secret, in the fixed handshake order.
pub fn derive_handshake_secret(ikm: &[u8]) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(Some(&[0u8; 32]), ikm);

    let mut secret = [0u8; 32];
    let Ok(()) = hkdf.expand(HANDSHAKE_INFO, &mut secret) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    secret
}

/// Expand 64 bytes from an HKDF and split into two 32-byte keys.
fn expand_and_split(hkdf: &Hkdf<Sha256>, info: &[u8]) -> ([u8; 32], [u8; 32]) {
    let mut okm = [0u8; 64];
    let Ok(()) = hkdf.expand(info, &mut okm) else {
        unreachable!("64 bytes is a valid HKDF-SHA256 output length");
    };

    let mut first = [0u8; 32];
    let mut second = [0u8; 32];
    first.copy_from_slice(&okm[..32]);
    second.copy_from_slice(&okm[32..]);
    (first, second)
}

/// HMAC-SHA256 of a fixed label under a 32-byte key.
fn hmac_label(key: &[u8; 32], label: &[u8]) -> [u8; 32] {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    mac.update(label);
    let result = mac.finalize().into_bytes();

    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}
