//! Fuzz target for SenderKeyDistribution::from_plaintext
//!
//! Arbitrary pairwise plaintext reaches this parser whenever it starts with
//! the distribution tag, so it must tolerate any byte sequence without
//! panicking.

#![no_main]

use knotwire_proto::SenderKeyDistribution;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if SenderKeyDistribution::matches(data) {
        // Tagged input: must parse or error, never panic.
        let _ = SenderKeyDistribution::from_plaintext(data);
    } else {
        // Untagged input must be rejected as malformed.
        assert!(SenderKeyDistribution::from_plaintext(data).is_err());
    }
});
