//! Pairwise orchestrator.
//!
//! The `Messenger` owns everything a device needs to converse: its
//! keystore, a directory handle, per-peer ratchet sessions, the group
//! sender-key registry, and the per-peer deferred-message lists. The
//! ratchet itself never buffers; messages it rejects as `Deferred` are held
//! here and retried after every successful decrypt from the same peer.
//!
//! Decrypted pairwise plaintext is dispatched by content: distribution
//! records (tagged `skdist:`) install group sender keys, everything else
//! surfaces as an application message event.

use std::collections::{HashMap, VecDeque};

use knotwire_core::{
    handshake, DeviceKeystore, GroupError, GroupKeyRegistry, HandshakeError, PrekeyDirectory,
    ProtocolConfig, RatchetSession,
};
use knotwire_proto::{
    Envelope, InitialBundle, PairwiseEnvelope, RatchetMessage, SenderKeyDistribution,
};
use rand_core::{CryptoRng, RngCore};
use tracing::{debug, trace};

use crate::{error::ClientError, event::InboundEvent, transport::Transport};

/// A live pairwise session plus its unacknowledged handshake record.
struct PeerSession {
    session: RatchetSession,
    /// Re-attached to every outbound envelope until the peer is heard
    /// from, so the responder can bootstrap from any early message.
    pending_initial: Option<InitialBundle>,
}

/// One device's messaging orchestrator.
pub struct Messenger {
    device: DeviceKeystore,
    directory: PrekeyDirectory,
    transport: Transport,
    config: ProtocolConfig,

    sessions: HashMap<String, PeerSession>,
    deferred: HashMap<String, VecDeque<RatchetMessage>>,

    groups: GroupKeyRegistry,
    group_members: HashMap<String, Vec<String>>,
}

impl Messenger {
    /// Create a messenger and publish the device's prekeys to the
    /// directory.
    pub fn new(device: DeviceKeystore, directory: PrekeyDirectory, transport: Transport) -> Self {
        directory.publish(device.published_prekeys());
        let config = device.config();

        Self {
            device,
            directory,
            transport,
            config,
            sessions: HashMap::new(),
            deferred: HashMap::new(),
            groups: GroupKeyRegistry::new(),
            group_members: HashMap::new(),
        }
    }

    /// This device's id (its transport address).
    pub fn device_id(&self) -> &str {
        self.device.device_id()
    }

    /// Whether a pairwise session exists for a peer.
    pub fn has_session(&self, peer: &str) -> bool {
        self.sessions.contains_key(peer)
    }

    /// The live session for a peer, if any.
    pub fn session(&self, peer: &str) -> Option<&RatchetSession> {
        self.sessions.get(peer).map(|entry| &entry.session)
    }

    /// Number of messages currently deferred for a peer.
    pub fn deferred_count(&self, peer: &str) -> usize {
        self.deferred.get(peer).map_or(0, VecDeque::len)
    }

    /// Send a pairwise message, establishing a session first if needed.
    ///
    /// # Errors
    ///
    /// Directory, handshake, session, and encoding failures.
    pub fn send(
        &mut self,
        peer: &str,
        plaintext: &[u8],
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<(), ClientError> {
        self.ensure_session(peer, rng)?;
        let Some(peer_session) = self.sessions.get_mut(peer) else {
            unreachable!("session exists after ensure_session");
        };

        let message = peer_session.session.encrypt(plaintext, rng)?;
        let envelope = Envelope::Pairwise(PairwiseEnvelope {
            from: self.device.device_id().to_string(),
            initial: peer_session.pending_initial.clone(),
            message,
        });

        self.transport.enqueue(peer, envelope.to_bytes()?);
        Ok(())
    }

    /// Create (or refresh membership of) a group and distribute our
    /// sender-key chain to every member over the pairwise channels.
    ///
    /// # Errors
    ///
    /// Propagates pairwise send failures for the distribution messages.
    pub fn create_group(
        &mut self,
        group_id: &str,
        members: &[&str],
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<(), ClientError> {
        let own_id = self.device.device_id().to_string();

        let (distribution, created) = {
            let (state, created) = self.groups.ensure_owner(group_id, &own_id, rng);
            (state.distribution(), created)
        };

        self.group_members
            .insert(group_id.to_string(), members.iter().map(|m| (*m).to_string()).collect());

        if created {
            debug!(target: "knotwire::group", group = %group_id, "distributing sender key");
            let plaintext = distribution.to_plaintext();
            for member in members {
                self.send(member, &plaintext, rng)?;
            }
        }
        Ok(())
    }

    /// Encrypt a group message with our sender-key chain and queue it for
    /// every member.
    ///
    /// # Errors
    ///
    /// - `UnknownGroup` if [`Self::create_group`] has not run for the group
    pub fn send_group(
        &mut self,
        group_id: &str,
        plaintext: &[u8],
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<(), ClientError> {
        let members = self
            .group_members
            .get(group_id)
            .cloned()
            .ok_or_else(|| ClientError::UnknownGroup { group_id: group_id.to_string() })?;

        let own_id = self.device.device_id().to_string();
        let message = {
            let state = self.groups.state_mut(group_id, &own_id)?;
            state.encrypt(plaintext, rng).map_err(GroupError::from)?
        };

        let bytes = Envelope::Group(message).to_bytes()?;
        for member in members {
            self.transport.enqueue(&member, bytes.clone());
        }
        Ok(())
    }

    /// Drain this device's transport queue and process every envelope.
    ///
    /// Pairwise plaintext is dispatched to the application inbox or the
    /// group installer; messages rejected as deferred are queued and
    /// retried after each later success from the same peer.
    ///
    /// # Errors
    ///
    /// The first terminal failure aborts the drain; already-produced
    /// events are lost with it, matching the all-errors-surface policy.
    pub fn receive(
        &mut self,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<Vec<InboundEvent>, ClientError> {
        let own_id = self.device.device_id().to_string();
        let mut events = Vec::new();

        for payload in self.transport.drain(&own_id) {
            match Envelope::decode(&payload)? {
                Envelope::Pairwise(envelope) => {
                    self.process_pairwise(envelope, rng, &mut events)?;
                },
                Envelope::Group(message) => {
                    let state = self.groups.state_mut(&message.group_id, &message.sender_id)?;
                    let plaintext = state.decrypt(&message).map_err(GroupError::from)?;
                    events.push(InboundEvent::GroupMessage {
                        group_id: message.group_id,
                        sender_id: message.sender_id,
                        plaintext,
                    });
                },
            }
        }

        Ok(events)
    }

    /// Establish an initiator session for a peer if none exists.
    fn ensure_session(
        &mut self,
        peer: &str,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<(), ClientError> {
        if self.sessions.contains_key(peer) {
            return Ok(());
        }

        let bundle = self.directory.fetch_bundle(peer)?;
        let initiator = handshake::initiate(&self.device, &bundle, rng)?;
        let (session, initial) = initiator.into_session(self.config, rng);

        self.sessions
            .insert(peer.to_string(), PeerSession { session, pending_initial: Some(initial) });
        Ok(())
    }

    /// Process one inbound pairwise envelope.
    fn process_pairwise(
        &mut self,
        envelope: PairwiseEnvelope,
        rng: &mut (impl RngCore + CryptoRng),
        events: &mut Vec<InboundEvent>,
    ) -> Result<(), ClientError> {
        let peer = envelope.from.clone();

        let freshly_accepted = if self.sessions.contains_key(&peer) {
            false
        } else {
            let Some(initial) = envelope.initial.as_ref() else {
                return Err(ClientError::UnknownPeerSession { peer });
            };
            let responder = handshake::respond(&self.device, initial)?;
            let session = responder.into_session(peer.clone(), self.config);
            self.sessions
                .insert(peer.clone(), PeerSession { session, pending_initial: None });
            true
        };

        let Some(peer_session) = self.sessions.get_mut(&peer) else {
            unreachable!("session inserted above");
        };

        match peer_session.session.decrypt(&envelope.message, rng) {
            Ok(plaintext) => {
                // Any valid inbound message proves the peer has a session;
                // stop re-attaching the handshake record.
                peer_session.pending_initial = None;
                self.dispatch_plaintext(&peer, plaintext, events)?;
                self.retry_deferred(&peer, rng, events)
            },
            Err(err) if err.is_deferred() => {
                trace!(
                    target: "knotwire::ordering",
                    peer = %peer,
                    queued = self.deferred_count(&peer) + 1,
                    "holding deferred message"
                );
                self.deferred.entry(peer).or_default().push_back(envelope.message);
                Ok(())
            },
            Err(_) if freshly_accepted => {
                // The first message of a just-accepted session must open;
                // failure means the two sides derived different roots.
                self.sessions.remove(&peer);
                Err(HandshakeError::HandshakeMismatch.into())
            },
            Err(err) => Err(err.into()),
        }
    }

    /// Route decrypted pairwise plaintext by content.
    fn dispatch_plaintext(
        &mut self,
        peer: &str,
        plaintext: Vec<u8>,
        events: &mut Vec<InboundEvent>,
    ) -> Result<(), ClientError> {
        if SenderKeyDistribution::matches(&plaintext) {
            let record = SenderKeyDistribution::from_plaintext(&plaintext)?;
            self.groups.install(&record)?;
            events.push(InboundEvent::SenderKeyInstalled {
                group_id: record.group_id,
                sender_id: record.sender_id,
            });
        } else {
            events.push(InboundEvent::Message { peer: peer.to_string(), plaintext });
        }
        Ok(())
    }

    /// Retry a peer's deferred messages until a pass makes no progress.
    fn retry_deferred(
        &mut self,
        peer: &str,
        rng: &mut (impl RngCore + CryptoRng),
        events: &mut Vec<InboundEvent>,
    ) -> Result<(), ClientError> {
        loop {
            let mut queue = self.deferred.remove(peer).unwrap_or_default();
            if queue.is_empty() {
                return Ok(());
            }

            let mut progressed = false;
            let mut held = VecDeque::new();
            let mut failure = None;

            while let Some(message) = queue.pop_front() {
                let Some(peer_session) = self.sessions.get_mut(peer) else {
                    held.push_back(message);
                    continue;
                };

                match peer_session.session.decrypt(&message, rng) {
                    Ok(plaintext) => {
                        progressed = true;
                        if let Err(err) = self.dispatch_plaintext(peer, plaintext, events) {
                            failure = Some(err);
                            break;
                        }
                    },
                    Err(err) if err.is_deferred() => held.push_back(message),
                    Err(err) => {
                        failure = Some(err.into());
                        break;
                    },
                }
            }

            held.extend(queue);
            if !held.is_empty() {
                self.deferred.insert(peer.to_string(), held);
            }

            if let Some(err) = failure {
                return Err(err);
            }
            if !progressed {
                return Ok(());
            }
        }
    }
}

impl std::fmt::Debug for Messenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("device_id", &self.device.device_id())
            .field("sessions", &self.sessions.len())
            .field("groups", &self.groups.len())
            .finish_non_exhaustive()
    }
}
