//! Fuzz target for Envelope::decode
//!
//! Feeds arbitrary bytes into the CBOR envelope decoder:
//! - Malformed CBOR data
//! - Truncated or oversized inputs
//! - Valid envelopes with pathological field contents
//!
//! The decoder should NEVER panic; invalid inputs return an error. Anything
//! that decodes must re-encode and decode back to an equal value.

#![no_main]

use knotwire_proto::Envelope;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(envelope) = Envelope::decode(data) else {
        return;
    };

    // Round-trip stability for anything the decoder accepts.
    let bytes = envelope.to_bytes().expect("decoded envelope must re-encode");
    let reparsed = Envelope::decode(&bytes).expect("re-encoded envelope must decode");
    assert_eq!(envelope, reparsed);
});
