//! The pairwise ratchet session state machine.

use knotwire_crypto::{
    aead, kdf, AgreementKeyPair, KemKeyPair, KemParameterSet, KemPublicKey,
};
use knotwire_proto::{PqPublicRecord, RatchetHeader, RatchetMessage};
use rand_core::{CryptoRng, RngCore};
use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::{
    config::ProtocolConfig,
    session::{error::SessionError, SkippedKeyCache},
};

/// A per-direction symmetric chain.
struct Chain {
    key: Zeroizing<[u8; 32]>,
    next_n: u32,
}

impl Chain {
    fn new(key: [u8; 32]) -> Self {
        Self { key: Zeroizing::new(key), next_n: 0 }
    }

    /// Advance the chain one step. Returns the message key and its wire
    /// number (the pre-increment counter).
    fn step(&mut self) -> (Zeroizing<[u8; 32]>, u32) {
        let (message_key, next_key) = kdf::chain_step(&self.key);
        self.key = Zeroizing::new(next_key);

        let n = self.next_n;
        self.next_n += 1;
        (Zeroizing::new(message_key), n)
    }
}

/// PQ ratchet material staged for the next outbound message.
struct PendingPq {
    record: PqPublicRecord,
    ciphertext: Vec<u8>,
}

/// A pairwise hybrid double-ratchet session.
///
/// Created by the handshake: the initiator starts sending-only (its first
/// sending step runs at construction, reusing the handshake ephemeral as
/// its ratchet key), the responder starts uninitialized until the first
/// inbound message arrives. After the first exchange in each direction both
/// chains are live.
pub struct RatchetSession {
    peer_id: String,
    parameter_set: KemParameterSet,

    root_key: Zeroizing<[u8; 32]>,
    sending: Option<Chain>,
    receiving: Option<Chain>,
    previous_sending_n: u32,

    /// Our current DH ratchet pair. `None` only on a responder that has
    /// not completed its first receiving step.
    our_ratchet: Option<AgreementKeyPair>,
    /// The signed prekey, held by a responder for its first DH input only.
    responder_dh_secret: Option<AgreementKeyPair>,
    remote_ratchet_public: Option<[u8; 32]>,

    pq_local: KemKeyPair,
    pq_remote: Option<KemPublicKey>,
    pending_pq: Option<PendingPq>,

    skipped: SkippedKeyCache,
}

impl RatchetSession {
    /// Create the initiator side of a session.
    ///
    /// Performs the first sending ratchet step immediately: the handshake
    /// ephemeral serves as the ratchet key without rotation, a fresh PQ
    /// ratchet pair is encapsulated to the peer's handshake PQ prekey, and
    /// the resulting PQ material is staged for the first outbound message.
    pub fn new_initiator(
        peer_id: impl Into<String>,
        root_key: [u8; 32],
        ephemeral: AgreementKeyPair,
        responder_ratchet_public: [u8; 32],
        remote_pq_public: KemPublicKey,
        config: ProtocolConfig,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Self {
        let peer_id = peer_id.into();

        let pq_local = KemKeyPair::generate(config.pq_parameter_set, rng);
        let (pq_ciphertext, pq_secret) = remote_pq_public.encapsulate(rng);

        let dh = ephemeral.diffie_hellman(&responder_ratchet_public);
        let (root_key, sending_key) = kdf::root_step_hybrid(&root_key, &dh, &pq_secret);

        debug!(target: "knotwire::ratchet", peer = %peer_id, "initiator session created");

        Self {
            peer_id,
            parameter_set: config.pq_parameter_set,
            root_key: Zeroizing::new(root_key),
            sending: Some(Chain::new(sending_key)),
            receiving: None,
            previous_sending_n: 0,
            our_ratchet: Some(ephemeral),
            responder_dh_secret: None,
            remote_ratchet_public: Some(responder_ratchet_public),
            pending_pq: Some(PendingPq {
                record: pq_record(&pq_local),
                ciphertext: pq_ciphertext,
            }),
            pq_local,
            pq_remote: Some(remote_pq_public),
            skipped: SkippedKeyCache::new(config.skipped_key_cap),
        }
    }

    /// Create the responder side of a session.
    ///
    /// The session stays uninitialized (no chains) until the first inbound
    /// message triggers a receiving step; that step uses the signed prekey
    /// as the DH input, since the responder has not yet minted a ratchet
    /// key of its own.
    pub fn new_responder(
        peer_id: impl Into<String>,
        root_key: [u8; 32],
        signed_prekey: AgreementKeyPair,
        initiator_ratchet_public: [u8; 32],
        local_pq_prekey: KemKeyPair,
        config: ProtocolConfig,
    ) -> Self {
        let peer_id = peer_id.into();
        debug!(target: "knotwire::ratchet", peer = %peer_id, "responder session created");

        Self {
            peer_id,
            parameter_set: config.pq_parameter_set,
            root_key: Zeroizing::new(root_key),
            sending: None,
            receiving: None,
            previous_sending_n: 0,
            our_ratchet: None,
            responder_dh_secret: Some(signed_prekey),
            remote_ratchet_public: Some(initiator_ratchet_public),
            pq_local: local_pq_prekey,
            pq_remote: None,
            pending_pq: None,
            skipped: SkippedKeyCache::new(config.skipped_key_cap),
        }
    }

    /// The peer this session talks to.
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Whether the session can encrypt.
    pub fn has_sending_chain(&self) -> bool {
        self.sending.is_some()
    }

    /// Whether the session has accepted at least one inbound epoch.
    pub fn has_receiving_chain(&self) -> bool {
        self.receiving.is_some()
    }

    /// Number of skipped message keys currently cached.
    pub fn skipped_key_count(&self) -> usize {
        self.skipped.len()
    }

    /// Encrypt a plaintext for the peer.
    ///
    /// Advances the sending chain by one message key and binds every header
    /// field (including any staged PQ ratchet material) into the AEAD
    /// associated data. Staged PQ material rides on exactly this message
    /// and is then cleared.
    ///
    /// # Errors
    ///
    /// - `SendingChainEmpty` if no sending step has happened yet (a
    ///   responder that has not received anything)
    pub fn encrypt(
        &mut self,
        plaintext: &[u8],
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<RatchetMessage, SessionError> {
        let chain = self.sending.as_mut().ok_or(SessionError::SendingChainEmpty)?;
        let Some(ratchet) = self.our_ratchet.as_ref() else {
            unreachable!("a sending chain implies a local ratchet key");
        };

        let (message_key, n) = chain.step();

        let (pq_sender_public, pq_ciphertext) = match self.pending_pq.take() {
            Some(pending) => (Some(pending.record), Some(pending.ciphertext)),
            None => (None, None),
        };

        let header = RatchetHeader {
            sender_ratchet_public: ratchet.public_bytes(),
            n,
            pn: self.previous_sending_n,
            pq_sender_public,
            pq_ciphertext,
        };

        let payload = aead::seal(&message_key, plaintext, &header.associated_data(), rng);

        trace!(
            target: "knotwire::ratchet",
            peer = %self.peer_id,
            n,
            pq_step = header.has_pq_step(),
            "message encrypted"
        );

        Ok(RatchetMessage { header, payload })
    }

    /// Decrypt an inbound message.
    ///
    /// Tries the skipped-key cache first; otherwise detects a fresh remote
    /// epoch (running a receiving step followed immediately by a sending
    /// step), then advances the receiving chain to the message number,
    /// caching any skipped keys on the way.
    ///
    /// # Errors
    ///
    /// - `Deferred` when an epoch-opening message has not arrived yet; the
    ///   caller holds this message and retries after the next success
    /// - `MissingPqCiphertext` when the header carries partial PQ material
    /// - `DecryptFailed` on tag failure, replay, or late-and-evicted keys
    pub fn decrypt(
        &mut self,
        message: &RatchetMessage,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<Vec<u8>, SessionError> {
        let header = &message.header;
        let epoch_id = knotwire_crypto::key_id(&header.sender_ratchet_public);

        // Skipped key for an already-seen epoch?
        if let Some(message_key) = self.skipped.take(&epoch_id, header.n) {
            trace!(
                target: "knotwire::ordering",
                peer = %self.peer_id,
                n = header.n,
                "consumed skipped key"
            );
            return aead::open(&message_key, &message.payload, &header.associated_data())
                .map_err(|_| SessionError::DecryptFailed);
        }

        let fresh_epoch = self.remote_ratchet_public.is_none()
            || self.receiving.is_none()
            || self.remote_ratchet_public != Some(header.sender_ratchet_public);

        if fresh_epoch {
            match (&header.pq_sender_public, &header.pq_ciphertext) {
                (Some(_), Some(_)) => {},
                (None, None) => {
                    trace!(
                        target: "knotwire::ordering",
                        peer = %self.peer_id,
                        n = header.n,
                        "deferred: no PQ material for fresh epoch"
                    );
                    return Err(SessionError::Deferred);
                },
                _ => return Err(SessionError::MissingPqCiphertext),
            }

            self.receiving_step(header, rng)?;

            // A message queued before this epoch's cache existed may have
            // landed there during the step.
            if let Some(message_key) = self.skipped.take(&epoch_id, header.n) {
                return aead::open(&message_key, &message.payload, &header.associated_data())
                    .map_err(|_| SessionError::DecryptFailed);
            }
        }

        let Some(chain) = self.receiving.as_mut() else {
            unreachable!("receiving chain exists after an epoch step");
        };

        if header.n < chain.next_n {
            // Behind the chain with no cached key: replayed, or evicted.
            return Err(SessionError::DecryptFailed);
        }

        while chain.next_n < header.n {
            let (message_key, n) = chain.step();
            self.skipped.insert(&epoch_id, n, message_key);
        }

        let (message_key, _) = chain.step();
        aead::open(&message_key, &message.payload, &header.associated_data())
            .map_err(|_| SessionError::DecryptFailed)
    }

    /// Enter the peer's new epoch: close out the current receiving chain,
    /// braid the header's DH and PQ material into the root key, then
    /// immediately perform a sending step of our own.
    fn receiving_step(
        &mut self,
        header: &RatchetHeader,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<(), SessionError> {
        // Prefetch up to `pn` keys from the closing chain.
        if let (Some(old_remote), Some(chain)) =
            (self.remote_ratchet_public, self.receiving.as_mut())
        {
            let old_epoch_id = knotwire_crypto::key_id(&old_remote);
            while chain.next_n < header.pn {
                let (message_key, n) = chain.step();
                self.skipped.insert(&old_epoch_id, n, message_key);
            }
        }

        self.previous_sending_n = self.sending.as_ref().map_or(0, |chain| chain.next_n);

        let Some(record) = header.pq_sender_public.as_ref() else {
            unreachable!("caller checked for complete PQ material");
        };
        let Some(pq_ciphertext) = header.pq_ciphertext.as_ref() else {
            unreachable!("caller checked for complete PQ material");
        };

        let remote_set = KemParameterSet::from_name(&record.parameter_set)?;
        let remote_pq = KemPublicKey::new(remote_set, record.bytes.clone())?;

        let pq_secret = self.pq_local.decapsulate(pq_ciphertext)?;

        // First inbound step on a responder uses the signed prekey; every
        // later step uses the current ratchet key.
        let dh = match self.responder_dh_secret.take() {
            Some(signed_prekey) => signed_prekey.diffie_hellman(&header.sender_ratchet_public),
            None => {
                let Some(ratchet) = self.our_ratchet.as_ref() else {
                    unreachable!("non-responder sessions always hold a ratchet key");
                };
                ratchet.diffie_hellman(&header.sender_ratchet_public)
            },
        };

        let (root_key, receiving_key) = kdf::root_step_hybrid(&self.root_key, &dh, &pq_secret);
        self.root_key = Zeroizing::new(root_key);
        self.receiving = Some(Chain::new(receiving_key));
        self.remote_ratchet_public = Some(header.sender_ratchet_public);
        self.pq_remote = Some(remote_pq);

        debug!(
            target: "knotwire::ratchet",
            peer = %self.peer_id,
            pn = header.pn,
            "entered peer epoch"
        );

        self.sending_step(rng);
        Ok(())
    }

    /// Open a new sending epoch: mint fresh DH and PQ ratchet keys,
    /// encapsulate to the peer's latest PQ ratchet key, and stage the PQ
    /// material for the next outbound message.
    fn sending_step(&mut self, rng: &mut (impl RngCore + CryptoRng)) {
        let Some(remote_public) = self.remote_ratchet_public else {
            unreachable!("sending step runs only after a remote ratchet key is known");
        };
        let Some(remote_pq) = self.pq_remote.as_ref() else {
            unreachable!("sending step runs only after a remote PQ key is known");
        };

        let ratchet = AgreementKeyPair::generate(rng);
        let pq_local = KemKeyPair::generate(self.parameter_set, rng);
        let (pq_ciphertext, pq_secret) = remote_pq.encapsulate(rng);

        let dh = ratchet.diffie_hellman(&remote_public);
        let (root_key, sending_key) = kdf::root_step_hybrid(&self.root_key, &dh, &pq_secret);

        self.root_key = Zeroizing::new(root_key);
        self.sending = Some(Chain::new(sending_key));
        self.pending_pq =
            Some(PendingPq { record: pq_record(&pq_local), ciphertext: pq_ciphertext });
        self.our_ratchet = Some(ratchet);
        self.pq_local = pq_local;

        debug!(target: "knotwire::ratchet", peer = %self.peer_id, "opened sending epoch");
    }
}

impl std::fmt::Debug for RatchetSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatchetSession")
            .field("peer_id", &self.peer_id)
            .field("sending", &self.sending.is_some())
            .field("receiving", &self.receiving.is_some())
            .field("skipped", &self.skipped.len())
            .finish_non_exhaustive()
    }
}

/// Wire record for a PQ ratchet public key.
fn pq_record(pair: &KemKeyPair) -> PqPublicRecord {
    let public = pair.public_key();
    PqPublicRecord {
        bytes: public.as_bytes().to_vec(),
        key_id: public.key_id(),
        parameter_set: public.parameter_set().name().to_string(),
    }
}
