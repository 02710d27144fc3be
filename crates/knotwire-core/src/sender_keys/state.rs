//! Per-(group, sender) chain state.

use std::collections::{HashMap, VecDeque};

use base64::{engine::general_purpose::STANDARD, Engine};
use knotwire_crypto::{aead, kdf, verify, SigningKeyPair};
use knotwire_proto::{group_associated_data, SenderKeyDistribution, SenderKeyMessage};
use rand_core::{CryptoRng, RngCore};
use tracing::trace;
use zeroize::Zeroizing;

use crate::sender_keys::error::SenderKeyError;

/// Skipped-key capacity per sender chain, oldest-out.
const SKIPPED_CAP: usize = 50;

/// Counter-keyed skipped message keys with an eviction floor.
///
/// Insertions arrive in increasing counter order (the chain is advanced
/// monotonically), so FIFO eviction removes the lowest counters first. The
/// floor records the lowest counter the cache could still hold, which
/// separates "definitely evicted" from "consumed or replayed".
struct SkippedMessageKeys {
    keys: HashMap<u32, Zeroizing<[u8; 32]>>,
    order: VecDeque<u32>,
    floor: u32,
}

impl SkippedMessageKeys {
    fn new() -> Self {
        Self { keys: HashMap::new(), order: VecDeque::new(), floor: 0 }
    }

    fn insert(&mut self, counter: u32, key: Zeroizing<[u8; 32]>) {
        while self.keys.len() >= SKIPPED_CAP {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.keys.remove(&oldest);
            self.floor = self.floor.max(oldest.saturating_add(1));
        }

        self.order.push_back(counter);
        self.keys.insert(counter, key);
    }

    fn take(&mut self, counter: u32) -> Option<Zeroizing<[u8; 32]>> {
        let key = self.keys.remove(&counter)?;
        self.order.retain(|&entry| entry != counter);
        Some(key)
    }

    fn len(&self) -> usize {
        self.keys.len()
    }

    fn contains(&self, counter: u32) -> bool {
        self.keys.contains_key(&counter)
    }
}

/// One sender's chain within one group.
///
/// The owning sender holds the signing key and encrypts; members installed
/// from a distribution record hold only the verifying key and decrypt.
pub struct SenderKeyState {
    group_id: String,
    sender_id: String,

    signing_public: [u8; 32],
    signing: Option<SigningKeyPair>,

    initial_chain_key: Zeroizing<[u8; 32]>,
    chain_key: Zeroizing<[u8; 32]>,
    counter: u32,

    skipped: SkippedMessageKeys,
}

impl SenderKeyState {
    /// Create the owning sender's state with a fresh signing pair and chain
    /// key.
    pub fn new_owner(
        group_id: impl Into<String>,
        sender_id: impl Into<String>,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Self {
        let signing = SigningKeyPair::generate(rng);

        let mut chain_key = Zeroizing::new([0u8; 32]);
        rng.fill_bytes(&mut *chain_key);

        Self {
            group_id: group_id.into(),
            sender_id: sender_id.into(),
            signing_public: signing.public_bytes(),
            signing: Some(signing),
            initial_chain_key: chain_key.clone(),
            chain_key,
            counter: 0,
            skipped: SkippedMessageKeys::new(),
        }
    }

    /// Install a receiver-side state from distributed material.
    pub fn new_receiver(
        group_id: impl Into<String>,
        sender_id: impl Into<String>,
        signing_public: [u8; 32],
        chain_key: [u8; 32],
    ) -> Self {
        let chain_key = Zeroizing::new(chain_key);
        Self {
            group_id: group_id.into(),
            sender_id: sender_id.into(),
            signing_public,
            signing: None,
            initial_chain_key: chain_key.clone(),
            chain_key,
            counter: 0,
            skipped: SkippedMessageKeys::new(),
        }
    }

    /// Group this chain belongs to.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Owning sender's device id.
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Current chain position.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Whether this side owns the chain (can encrypt).
    pub fn is_owner(&self) -> bool {
        self.signing.is_some()
    }

    /// Number of skipped keys currently cached.
    pub fn skipped_len(&self) -> usize {
        self.skipped.len()
    }

    /// Whether a skipped key for the counter is cached.
    pub fn has_skipped(&self, counter: u32) -> bool {
        self.skipped.contains(counter)
    }

    /// The introduction record for distributing this chain to a member.
    ///
    /// Carries the chain's initial key, so any member can reconstruct the
    /// full key sequence regardless of when it installs.
    pub fn distribution(&self) -> SenderKeyDistribution {
        SenderKeyDistribution {
            group_id: self.group_id.clone(),
            sender_id: self.sender_id.clone(),
            signing_public: STANDARD.encode(self.signing_public),
            chain_key: STANDARD.encode(*self.initial_chain_key),
        }
    }

    /// Encrypt a group message as the owning sender.
    ///
    /// Advances the chain, binds (group, sender, counter) as associated
    /// data, and signs `nonce ‖ ciphertext ‖ tag`.
    ///
    /// # Errors
    ///
    /// - `ReceiveOnly` if this state has no signing key
    pub fn encrypt(
        &mut self,
        plaintext: &[u8],
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<SenderKeyMessage, SenderKeyError> {
        let signing = self.signing.as_ref().ok_or(SenderKeyError::ReceiveOnly)?;

        let (message_key, next_chain) = kdf::chain_step(&self.chain_key);
        self.chain_key = Zeroizing::new(next_chain);

        let counter = self.counter;
        self.counter += 1;

        let associated_data = group_associated_data(&self.group_id, &self.sender_id, counter);
        let payload = aead::seal(&message_key, plaintext, &associated_data, rng);
        let signature = signing.sign(&payload).to_vec();

        trace!(
            target: "knotwire::group",
            group = %self.group_id,
            counter,
            "group message encrypted"
        );

        Ok(SenderKeyMessage {
            group_id: self.group_id.clone(),
            sender_id: self.sender_id.clone(),
            counter,
            signature,
            payload,
        })
    }

    /// Decrypt a group message from this chain's sender.
    ///
    /// # Errors
    ///
    /// - `InvalidGroupSignature` if the signature does not verify
    /// - `MessageTooOld` / `Discarded` for counters behind the chain whose
    ///   keys are gone
    /// - `DecryptFailed` on an AEAD tag failure
    pub fn decrypt(&mut self, message: &SenderKeyMessage) -> Result<Vec<u8>, SenderKeyError> {
        verify(&self.signing_public, &message.payload, &message.signature)
            .map_err(|_| SenderKeyError::InvalidGroupSignature)?;

        let message_key = self.receiver_message_key(message.counter)?;
        let associated_data =
            group_associated_data(&message.group_id, &message.sender_id, message.counter);

        aead::open(&message_key, &message.payload, &associated_data)
            .map_err(|_| SenderKeyError::DecryptFailed)
    }

    /// Produce the message key for a counter, advancing the chain and
    /// caching skipped keys as needed.
    ///
    /// Exposed so the receive path and tests share one advancement rule.
    ///
    /// # Errors
    ///
    /// - `MessageTooOld` if the counter is below the cache's eviction floor
    /// - `Discarded` if the counter is behind the chain and its key was
    ///   already consumed
    pub fn receiver_message_key(
        &mut self,
        counter: u32,
    ) -> Result<Zeroizing<[u8; 32]>, SenderKeyError> {
        if counter < self.counter {
            if let Some(key) = self.skipped.take(counter) {
                return Ok(key);
            }
            if counter < self.skipped.floor {
                return Err(SenderKeyError::MessageTooOld {
                    counter,
                    floor: self.skipped.floor,
                });
            }
            return Err(SenderKeyError::Discarded);
        }

        while self.counter < counter {
            let (skipped_key, next_chain) = kdf::chain_step(&self.chain_key);
            self.chain_key = Zeroizing::new(next_chain);
            self.skipped.insert(self.counter, skipped_key.into());
            self.counter += 1;
        }

        let (message_key, next_chain) = kdf::chain_step(&self.chain_key);
        self.chain_key = Zeroizing::new(next_chain);
        self.counter += 1;

        Ok(message_key.into())
    }
}

impl std::fmt::Debug for SenderKeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderKeyState")
            .field("group_id", &self.group_id)
            .field("sender_id", &self.sender_id)
            .field("counter", &self.counter)
            .field("owner", &self.is_owner())
            .finish_non_exhaustive()
    }
}
