//! End-to-end scenarios through the orchestrator: two messengers sharing a
//! directory and an in-memory transport.

use knotwire_client::{ClientError, InboundEvent, Messenger, Transport};
use knotwire_core::{
    DeviceKeystore, HandshakeError, PrekeyDirectory, ProtocolConfig, SessionError,
};
use knotwire_proto::Envelope;
use rand::{rngs::StdRng, SeedableRng};

fn network(seed: u64) -> (Messenger, Messenger, PrekeyDirectory, Transport, StdRng) {
    let mut rng = StdRng::seed_from_u64(seed);
    let config = ProtocolConfig::default();

    let directory = PrekeyDirectory::new();
    let transport = Transport::new();

    let alice = Messenger::new(
        DeviceKeystore::create("alice", config, &mut rng),
        directory.clone(),
        transport.clone(),
    );
    let bob = Messenger::new(
        DeviceKeystore::create("bob", config, &mut rng),
        directory.clone(),
        transport.clone(),
    );

    (alice, bob, directory, transport, rng)
}

fn text(peer: &str, plaintext: &str) -> InboundEvent {
    InboundEvent::Message { peer: peer.to_string(), plaintext: plaintext.as_bytes().to_vec() }
}

/// Reorder a recipient's queued payloads by index.
fn reorder(transport: &Transport, recipient: &str, order: &[usize]) {
    let queued = transport.drain(recipient);
    assert_eq!(queued.len(), order.len(), "reorder must cover the whole queue");
    for &index in order {
        transport.enqueue(recipient, queued[index].clone());
    }
}

#[test]
fn ordered_conversation() {
    let (mut alice, mut bob, _, _, mut rng) = network(1);

    alice.send("bob", b"Hi Bob!", &mut rng).unwrap();
    assert_eq!(bob.receive(&mut rng).unwrap(), vec![text("alice", "Hi Bob!")]);

    bob.send("alice", b"Hi Alice! Got your message.", &mut rng).unwrap();
    assert_eq!(
        alice.receive(&mut rng).unwrap(),
        vec![text("bob", "Hi Alice! Got your message.")],
    );

    alice.send("bob", b"Great!", &mut rng).unwrap();
    assert_eq!(bob.receive(&mut rng).unwrap(), vec![text("alice", "Great!")]);
}

#[test]
fn out_of_order_within_chain() {
    let (mut alice, mut bob, _, transport, mut rng) = network(2);

    alice.send("bob", b"First", &mut rng).unwrap();
    alice.send("bob", b"Second", &mut rng).unwrap();
    alice.send("bob", b"Third", &mut rng).unwrap();

    reorder(&transport, "bob", &[2, 0, 1]);

    // The deferred third message is retried once the opener lands.
    let events = bob.receive(&mut rng).unwrap();
    assert_eq!(
        events,
        vec![text("alice", "First"), text("alice", "Third"), text("alice", "Second")],
    );
    assert_eq!(bob.deferred_count("alice"), 0);
}

#[test]
fn old_chain_message_after_ratchet() {
    let (mut alice, mut bob, _, transport, mut rng) = network(3);

    alice.send("bob", b"Chain-A-1", &mut rng).unwrap();
    alice.send("bob", b"Chain-A-2", &mut rng).unwrap();

    // Deliver only the first; hold the second back.
    let queued = transport.drain("bob");
    transport.enqueue("bob", queued[0].clone());
    let withheld = queued[1].clone();
    assert_eq!(bob.receive(&mut rng).unwrap(), vec![text("alice", "Chain-A-1")]);

    bob.send("alice", b"Bob-Reply", &mut rng).unwrap();
    assert_eq!(alice.receive(&mut rng).unwrap(), vec![text("bob", "Bob-Reply")]);

    alice.send("bob", b"Chain-B-1", &mut rng).unwrap();

    // New-chain message first, withheld old-chain message second.
    transport.enqueue("bob", withheld);
    assert_eq!(
        bob.receive(&mut rng).unwrap(),
        vec![text("alice", "Chain-B-1"), text("alice", "Chain-A-2")],
    );
}

#[test]
fn deferred_new_chain_when_pq_ciphertext_arrives_late() {
    let (mut alice, mut bob, _, transport, mut rng) = network(4);

    // Seed a full exchange so Alice's next send opens a fresh epoch.
    alice.send("bob", b"seed", &mut rng).unwrap();
    bob.receive(&mut rng).unwrap();
    bob.send("alice", b"seed-reply", &mut rng).unwrap();
    alice.receive(&mut rng).unwrap();

    alice.send("bob", b"post-1", &mut rng).unwrap();
    alice.send("bob", b"post-2", &mut rng).unwrap();

    // Deliver the second before the first: it defers, then both open.
    reorder(&transport, "bob", &[1, 0]);
    let events = bob.receive(&mut rng).unwrap();
    assert_eq!(events, vec![text("alice", "post-1"), text("alice", "post-2")]);
}

#[test]
fn header_tampering_is_rejected() {
    let (mut alice, mut bob, _, transport, mut rng) = network(5);

    alice.send("bob", b"Seed", &mut rng).unwrap();
    assert_eq!(bob.receive(&mut rng).unwrap(), vec![text("alice", "Seed")]);

    alice.send("bob", b"Payload", &mut rng).unwrap();

    // Flip the message counter in transit.
    let queued = transport.drain("bob");
    let Envelope::Pairwise(mut envelope) = Envelope::decode(&queued[0]).unwrap() else {
        panic!("expected pairwise envelope");
    };
    envelope.message.header.n += 1;
    transport.enqueue("bob", Envelope::Pairwise(envelope).to_bytes().unwrap());

    assert_eq!(
        bob.receive(&mut rng),
        Err(ClientError::Session(SessionError::DecryptFailed)),
    );
}

#[test]
fn exhausted_one_time_prekeys_still_handshake() {
    let (mut alice, mut bob, directory, _, mut rng) = network(6);

    // Drain Bob's one-time queues through direct lookups.
    for _ in 0..10 {
        directory.fetch_bundle("bob").unwrap();
    }
    assert_eq!(directory.one_time_remaining("bob"), Some((0, 0)));

    alice.send("bob", b"no one-time keys left", &mut rng).unwrap();
    assert_eq!(bob.receive(&mut rng).unwrap(), vec![text("alice", "no one-time keys left")]);

    bob.send("alice", b"still works", &mut rng).unwrap();
    assert_eq!(alice.receive(&mut rng).unwrap(), vec![text("bob", "still works")]);
}

#[test]
fn group_send_receive_out_of_order() {
    let (mut alice, mut bob, _, transport, mut rng) = network(7);

    alice.create_group("room", &["bob"], &mut rng).unwrap();

    // Bob installs Alice's sender key from the pairwise distribution.
    let events = bob.receive(&mut rng).unwrap();
    assert_eq!(
        events,
        vec![InboundEvent::SenderKeyInstalled {
            group_id: "room".to_string(),
            sender_id: "alice".to_string(),
        }],
    );

    alice.send_group("room", b"group one", &mut rng).unwrap();
    alice.send_group("room", b"group two", &mut rng).unwrap();
    alice.send_group("room", b"group three", &mut rng).unwrap();

    reorder(&transport, "bob", &[2, 0, 1]);

    let group_text = |plaintext: &str| InboundEvent::GroupMessage {
        group_id: "room".to_string(),
        sender_id: "alice".to_string(),
        plaintext: plaintext.as_bytes().to_vec(),
    };
    assert_eq!(
        bob.receive(&mut rng).unwrap(),
        vec![group_text("group three"), group_text("group one"), group_text("group two")],
    );
}

#[test]
fn tampered_pq_prekey_signature_fails_handshake() {
    let mut rng = StdRng::seed_from_u64(8);
    let config = ProtocolConfig::default();
    let directory = PrekeyDirectory::new();
    let transport = Transport::new();

    let bob_device = DeviceKeystore::create("bob", config, &mut rng);
    let _bob = Messenger::new(bob_device.clone(), directory.clone(), transport.clone());
    let mut alice = Messenger::new(
        DeviceKeystore::create("alice", config, &mut rng),
        directory.clone(),
        transport.clone(),
    );

    // Republish Bob's record with one flipped PQ signature byte.
    let mut record = bob_device.published_prekeys();
    record.pq_prekey_signature[3] ^= 0x01;
    directory.publish(record);

    assert_eq!(
        alice.send("bob", b"will not leave", &mut rng),
        Err(ClientError::Handshake(HandshakeError::InvalidPqPreKeySignature)),
    );
}

#[test]
fn unknown_peer_without_handshake_record_is_rejected() {
    let (mut alice, mut bob, _, transport, mut rng) = network(9);

    // Establish and acknowledge a session so Alice stops attaching the
    // handshake record.
    alice.send("bob", b"hello", &mut rng).unwrap();
    bob.receive(&mut rng).unwrap();
    bob.send("alice", b"hi", &mut rng).unwrap();
    alice.receive(&mut rng).unwrap();

    alice.send("bob", b"bare", &mut rng).unwrap();

    // Rewrite the sender so Bob sees an unknown peer with no record.
    let queued = transport.drain("bob");
    let Envelope::Pairwise(mut envelope) = Envelope::decode(&queued[0]).unwrap() else {
        panic!("expected pairwise envelope");
    };
    assert!(envelope.initial.is_none());
    envelope.from = "stranger".to_string();
    transport.enqueue("bob", Envelope::Pairwise(envelope).to_bytes().unwrap());

    assert_eq!(
        bob.receive(&mut rng),
        Err(ClientError::UnknownPeerSession { peer: "stranger".to_string() }),
    );
}

#[test]
fn tampered_handshake_record_surfaces_as_mismatch() {
    let (mut alice, mut bob, _, transport, mut rng) = network(10);

    alice.send("bob", b"first contact", &mut rng).unwrap();

    // Corrupt the initiator's ephemeral in transit: both sides will derive
    // different roots, which surfaces on Bob's first decrypt.
    let queued = transport.drain("bob");
    let Envelope::Pairwise(mut envelope) = Envelope::decode(&queued[0]).unwrap() else {
        panic!("expected pairwise envelope");
    };
    envelope.initial.as_mut().unwrap().ephemeral[0] ^= 0x01;
    transport.enqueue("bob", Envelope::Pairwise(envelope).to_bytes().unwrap());

    assert_eq!(
        bob.receive(&mut rng),
        Err(ClientError::Handshake(HandshakeError::HandshakeMismatch)),
    );
    assert!(!bob.has_session("alice"));
}
