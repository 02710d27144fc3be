//! Scenario tests for the pairwise hybrid ratchet.

use knotwire_core::{
    handshake, DeviceKeystore, PrekeyDirectory, ProtocolConfig, RatchetSession, SessionError,
};
use rand::{rngs::StdRng, SeedableRng};

/// Establish a live session pair: Alice as initiator, Bob as responder.
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

    assert_eq!(*initiator.root_key, *responder.root_key, "root keys must agree");

    let (alice_session, _initial) = initiator.into_session(config, &mut rng);
    let bob_session = responder.into_session("alice", config);
    (alice_session, bob_session, rng)
}

#[test]
fn ordered_conversation() {
    let (mut alice, mut bob, mut rng) = establish(1);

    let m1 = alice.encrypt(b"Hi Bob!", &mut rng).unwrap();
    assert_eq!(bob.decrypt(&m1, &mut rng).unwrap(), b"Hi Bob!");

    let m2 = bob.encrypt(b"Hi Alice! Got your message.", &mut rng).unwrap();
    assert_eq!(alice.decrypt(&m2, &mut rng).unwrap(), b"Hi Alice! Got your message.");

    let m3 = alice.encrypt(b"Great!", &mut rng).unwrap();
    assert_eq!(bob.decrypt(&m3, &mut rng).unwrap(), b"Great!");
}

#[test]
fn chains_fill_in_after_first_exchange() {
    let (mut alice, mut bob, mut rng) = establish(2);

    // Initiator starts sending-only; responder starts uninitialized.
    assert!(alice.has_sending_chain());
    assert!(!alice.has_receiving_chain());
    assert!(!bob.has_sending_chain());
    assert!(!bob.has_receiving_chain());

    let m1 = alice.encrypt(b"first", &mut rng).unwrap();
    bob.decrypt(&m1, &mut rng).unwrap();
    assert!(bob.has_sending_chain());
    assert!(bob.has_receiving_chain());

    let m2 = bob.encrypt(b"reply", &mut rng).unwrap();
    alice.decrypt(&m2, &mut rng).unwrap();
    assert!(alice.has_sending_chain());
    assert!(alice.has_receiving_chain());
}

#[test]
fn responder_cannot_encrypt_before_first_receive() {
    let (_alice, mut bob, mut rng) = establish(3);
    assert_eq!(
        bob.encrypt(b"too early", &mut rng).map(|_| ()),
        Err(SessionError::SendingChainEmpty),
    );
}

#[test]
fn out_of_order_within_chain() {
    let (mut alice, mut bob, mut rng) = establish(4);

    let m1 = alice.encrypt(b"First", &mut rng).unwrap();
    let m2 = alice.encrypt(b"Second", &mut rng).unwrap();
    let m3 = alice.encrypt(b"Third", &mut rng).unwrap();

    // The third message arrives first. It does not carry the epoch-opening
    // PQ material, so it defers until the first message lands.
    assert_eq!(bob.decrypt(&m3, &mut rng), Err(SessionError::Deferred));

    assert_eq!(bob.decrypt(&m1, &mut rng).unwrap(), b"First");
    assert_eq!(bob.decrypt(&m3, &mut rng).unwrap(), b"Third");
    assert_eq!(bob.decrypt(&m2, &mut rng).unwrap(), b"Second");
}

#[test]
fn old_chain_message_after_ratchet() {
    let (mut alice, mut bob, mut rng) = establish(5);

    let a1 = alice.encrypt(b"Chain-A-1", &mut rng).unwrap();
    let a2 = alice.encrypt(b"Chain-A-2", &mut rng).unwrap();
    assert_eq!(bob.decrypt(&a1, &mut rng).unwrap(), b"Chain-A-1");

    let reply = bob.encrypt(b"Bob-Reply", &mut rng).unwrap();
    assert_eq!(alice.decrypt(&reply, &mut rng).unwrap(), b"Bob-Reply");

    let b1 = alice.encrypt(b"Chain-B-1", &mut rng).unwrap();

    // New-chain message first: entering the epoch prefetches the withheld
    // old-chain key, so the late message still opens.
    assert_eq!(bob.decrypt(&b1, &mut rng).unwrap(), b"Chain-B-1");
    assert_eq!(bob.decrypt(&a2, &mut rng).unwrap(), b"Chain-A-2");
}

#[test]
fn deferred_new_chain_when_pq_ciphertext_arrives_late() {
    let (mut alice, mut bob, mut rng) = establish(6);

    // Seed a full exchange so Alice's next send opens a fresh epoch.
    let seed1 = alice.encrypt(b"seed-1", &mut rng).unwrap();
    bob.decrypt(&seed1, &mut rng).unwrap();
    let seed2 = bob.encrypt(b"seed-2", &mut rng).unwrap();
    alice.decrypt(&seed2, &mut rng).unwrap();

    // Post-ratchet: only the first message carries the PQ ciphertext.
    let p1 = alice.encrypt(b"post-1", &mut rng).unwrap();
    let p2 = alice.encrypt(b"post-2", &mut rng).unwrap();
    assert!(p1.header.has_pq_step());
    assert!(!p2.header.has_pq_step());

    assert_eq!(bob.decrypt(&p2, &mut rng), Err(SessionError::Deferred));
    assert_eq!(bob.decrypt(&p1, &mut rng).unwrap(), b"post-1");
    assert_eq!(bob.decrypt(&p2, &mut rng).unwrap(), b"post-2");
}

#[test]
fn header_counter_tampering_fails_decrypt() {
    let (mut alice, mut bob, mut rng) = establish(7);

    let seed = alice.encrypt(b"Seed", &mut rng).unwrap();
    bob.decrypt(&seed, &mut rng).unwrap();

    let mut payload = alice.encrypt(b"Payload", &mut rng).unwrap();
    payload.header.n += 1;

    assert_eq!(bob.decrypt(&payload, &mut rng), Err(SessionError::DecryptFailed));
}

#[test]
fn replayed_message_fails() {
    let (mut alice, mut bob, mut rng) = establish(8);

    let m1 = alice.encrypt(b"once only", &mut rng).unwrap();
    assert_eq!(bob.decrypt(&m1, &mut rng).unwrap(), b"once only");
    assert_eq!(bob.decrypt(&m1, &mut rng), Err(SessionError::DecryptFailed));
}

#[test]
fn replayed_skipped_message_fails() {
    let (mut alice, mut bob, mut rng) = establish(9);

    let m1 = alice.encrypt(b"first", &mut rng).unwrap();
    let m2 = alice.encrypt(b"second", &mut rng).unwrap();
    let m3 = alice.encrypt(b"third", &mut rng).unwrap();

    bob.decrypt(&m1, &mut rng).unwrap();
    bob.decrypt(&m3, &mut rng).unwrap();

    // The second message decrypts from the skipped cache exactly once.
    assert_eq!(bob.decrypt(&m2, &mut rng).unwrap(), b"second");
    assert_eq!(bob.decrypt(&m2, &mut rng), Err(SessionError::DecryptFailed));
}

#[test]
fn partial_pq_material_is_rejected() {
    let (mut alice, mut bob, mut rng) = establish(10);

    let mut m1 = alice.encrypt(b"opening", &mut rng).unwrap();
    m1.header.pq_ciphertext = None;

    assert_eq!(bob.decrypt(&m1, &mut rng), Err(SessionError::MissingPqCiphertext));
}

#[test]
fn long_conversation_with_alternating_epochs() {
    let (mut alice, mut bob, mut rng) = establish(11);

    for round in 0u32..20 {
        let outbound = format!("alice round {round}");
        let m = alice.encrypt(outbound.as_bytes(), &mut rng).unwrap();
        assert_eq!(bob.decrypt(&m, &mut rng).unwrap(), outbound.as_bytes());

        let inbound = format!("bob round {round}");
        let m = bob.encrypt(inbound.as_bytes(), &mut rng).unwrap();
        assert_eq!(alice.decrypt(&m, &mut rng).unwrap(), inbound.as_bytes());
    }
}
