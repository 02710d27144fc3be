//! Knotwire wire records.
//!
//! The transport envelope is CBOR (self-describing, compact, no code
//! generation) via `ciborium`. The ratchet header's associated-data layout
//! is hand-rolled little-endian length-prefixed bytes, produced by one
//! function used on both the encrypt and decrypt paths, so any header
//! mutation in transit fails the AEAD tag check.
//!
//! # Invariants
//!
//! - Round-trip encoding of any envelope produces an equivalent value.
//! - `RatchetHeader::associated_data` is deterministic: equal headers
//!   produce byte-identical associated data.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod distribution;
pub mod envelope;
pub mod errors;
pub mod header;
pub mod initial;

pub use distribution::{SenderKeyDistribution, DISTRIBUTION_TAG};
pub use envelope::{
    group_associated_data, Envelope, PairwiseEnvelope, RatchetMessage, SenderKeyMessage,
};
pub use errors::{ProtocolError, Result};
pub use header::{PqPublicRecord, RatchetHeader};
pub use initial::InitialBundle;
