//! Property tests for the pairwise hybrid ratchet.

use knotwire_core::{
    handshake, DeviceKeystore, PrekeyDirectory, ProtocolConfig, RatchetSession, SessionError,
};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use rand::{rngs::StdRng, SeedableRng};

fn establish(seed: u64) -> (RatchetSession, RatchetSession, StdRng) {
    let mut rng = StdRng::seed_from_u64(seed);
    let config = ProtocolConfig::default();

    let alice = DeviceKeystore::create("alice", config, &mut rng);
    let bob = DeviceKeystore::create("bob", config, &mut rng);

    let directory = PrekeyDirectory::new();
    directory.publish(bob.published_prekeys());

    let bundle = directory.fetch_bundle("bob").unwrap();
    let initiator = handshake::initiate(&alice, &bundle, &mut rng).unwrap();
    let responder = handshake::respond(&bob, &initiator.initial).unwrap();

    let (alice_session, _initial) = initiator.into_session(config, &mut rng);
    let bob_session = responder.into_session("alice", config);
    (alice_session, bob_session, rng)
}

proptest! {
    // Ratchet sessions run real KEM keygen per epoch; keep case counts low.
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// In-order delivery round-trips arbitrary plaintexts in both
    /// directions.
    #[test]
    fn round_trip_in_order(
        seed in any::<u64>(),
        messages in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..256), 1..12),
    ) {
        let (mut alice, mut bob, mut rng) = establish(seed);

        for (i, plaintext) in messages.iter().enumerate() {
            let outbound = alice.encrypt(plaintext, &mut rng).unwrap();
            prop_assert_eq!(&bob.decrypt(&outbound, &mut rng).unwrap(), plaintext);

            // Alternate direction every other message to exercise epochs.
            if i % 2 == 1 {
                let reply = bob.encrypt(plaintext, &mut rng).unwrap();
                prop_assert_eq!(&alice.decrypt(&reply, &mut rng).unwrap(), plaintext);
            }
        }
    }

    /// Any delivery order within one chain decrypts every message, as long
    /// as the gaps stay inside the skipped-key cap.
    #[test]
    fn round_trip_shuffled_within_chain(
        seed in any::<u64>(),
        order in Just((0..10usize).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        let (mut alice, mut bob, mut rng) = establish(seed);

        let messages: Vec<_> = (0..10)
            .map(|i| {
                let plaintext = format!("message {i}");
                (plaintext.clone(), alice.encrypt(plaintext.as_bytes(), &mut rng).unwrap())
            })
            .collect();

        let mut deferred = Vec::new();
        for &index in &order {
            let (plaintext, message) = &messages[index];
            match bob.decrypt(message, &mut rng) {
                Ok(opened) => prop_assert_eq!(&opened, plaintext.as_bytes()),
                Err(SessionError::Deferred) => deferred.push(index),
                Err(other) => return Err(TestCaseError::fail(format!("{other}"))),
            }
        }

        // Everything deferred ahead of the epoch opener decrypts on retry.
        for index in deferred {
            let (plaintext, message) = &messages[index];
            prop_assert_eq!(&bob.decrypt(message, &mut rng).unwrap(), plaintext.as_bytes());
        }
    }

    /// The skipped-key cache never exceeds its cap, whatever the gap.
    #[test]
    fn skipped_cache_stays_bounded(seed in any::<u64>(), gap in 1usize..120) {
        let (mut alice, mut bob, mut rng) = establish(seed);

        let mut last = None;
        for i in 0..=gap {
            let message = alice.encrypt(format!("m{i}").as_bytes(), &mut rng).unwrap();
            last = Some(message);
        }

        // Deliver only the last message; every earlier key lands in the
        // cache (bounded) or is evicted.
        let last = last.unwrap();
        bob.decrypt(&last, &mut rng).unwrap();
        prop_assert!(bob.skipped_key_count() <= 50);
    }

    /// Replaying any delivered message fails.
    #[test]
    fn at_most_once_decryption(seed in any::<u64>(), replay_index in 0usize..6) {
        let (mut alice, mut bob, mut rng) = establish(seed);

        let messages: Vec<_> = (0..6)
            .map(|i| alice.encrypt(format!("m{i}").as_bytes(), &mut rng).unwrap())
            .collect();

        for message in &messages {
            bob.decrypt(message, &mut rng).unwrap();
        }

        prop_assert_eq!(
            bob.decrypt(&messages[replay_index], &mut rng),
            Err(SessionError::DecryptFailed),
        );
    }

    /// Single-bit mutations of any bound header field fail the tag check on
    /// an epoch-opening message.
    #[test]
    fn header_mutations_fail_decrypt(
        seed in any::<u64>(),
        field in 0usize..5,
        bit in 0u8..8,
    ) {
        let (mut alice, mut bob, mut rng) = establish(seed);
        let mut message = alice.encrypt(b"bound tight", &mut rng).unwrap();

        let mask = 1u8 << bit;
        match field {
            0 => message.header.n ^= u32::from(mask),
            1 => message.header.pn ^= u32::from(mask),
            2 => message.header.sender_ratchet_public[7] ^= mask,
            3 => {
                let ciphertext = message.header.pq_ciphertext.as_mut().unwrap();
                ciphertext[11] ^= mask;
            },
            _ => {
                let record = message.header.pq_sender_public.as_mut().unwrap();
                record.bytes[13] ^= mask;
            },
        }

        prop_assert_eq!(bob.decrypt(&message, &mut rng), Err(SessionError::DecryptFailed));
    }
}
