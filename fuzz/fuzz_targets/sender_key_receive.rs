//! Fuzz target for the sender-key receive path
//!
//! Drives a receiver state with adversarial messages:
//! - Arbitrary counters (boundary values, replays, far-future jumps)
//! - Arbitrary signatures and payloads
//!
//! # Invariants
//!
//! - The receive path never panics
//! - The skipped cache never exceeds its 50-entry cap
//! - Unsigned garbage never decrypts

#![no_main]

use arbitrary::Arbitrary;
use knotwire_core::SenderKeyState;
use knotwire_proto::SenderKeyMessage;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct ReceiveScenario {
    signing_public: [u8; 32],
    chain_key: [u8; 32],
    messages: Vec<FuzzMessage>,
}

#[derive(Debug, Arbitrary)]
struct FuzzMessage {
    counter: u16,
    signature: Vec<u8>,
    payload: Vec<u8>,
}

fuzz_target!(|scenario: ReceiveScenario| {
    let mut state = SenderKeyState::new_receiver(
        "room",
        "sender",
        scenario.signing_public,
        scenario.chain_key,
    );

    for message in scenario.messages {
        let wire = SenderKeyMessage {
            group_id: "room".to_string(),
            sender_id: "sender".to_string(),
            counter: u32::from(message.counter),
            signature: message.signature,
            payload: message.payload,
        };

        // Arbitrary signatures cannot verify against an arbitrary key;
        // every outcome must be an error, never a panic.
        assert!(state.decrypt(&wire).is_err());
        assert!(state.skipped_len() <= 50);
    }
});
