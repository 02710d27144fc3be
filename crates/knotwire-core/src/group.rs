//! Group key distribution over pairwise channels.
//!
//! A sender-key chain reaches other members as ordinary pairwise plaintext:
//! the owner wraps an introduction record behind the `skdist:` tag, each
//! member's decrypt path spots the tag and installs a receiver state. The
//! registry keys every state by `(group_id, sender_id)`.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use knotwire_proto::SenderKeyDistribution;
use rand_core::{CryptoRng, RngCore};
use thiserror::Error;
use tracing::debug;

use crate::sender_keys::{SenderKeyError, SenderKeyState};

/// Errors from the group distribution layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GroupError {
    /// No sender-key state is installed for the message's (group, sender)
    #[error("unknown sender key state: group {group_id}, sender {sender_id}")]
    UnknownSenderKeyState {
        /// Group id of the orphaned message
        group_id: String,
        /// Sender id of the orphaned message
        sender_id: String,
    },

    /// A distribution record could not be decoded into key material
    #[error("malformed distribution record: {0}")]
    MalformedDistribution(String),

    /// A sender-key operation failed
    #[error(transparent)]
    SenderKey(#[from] SenderKeyError),
}

/// Registry of sender-key states, keyed by `(group_id, sender_id)`.
#[derive(Default)]
pub struct GroupKeyRegistry {
    states: HashMap<(String, String), SenderKeyState>,
}

impl GroupKeyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the local sender's own chain for a group.
    ///
    /// Returns the state and whether it was newly created; a new chain
    /// still has to be distributed to the members.
    pub fn ensure_owner(
        &mut self,
        group_id: &str,
        sender_id: &str,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> (&mut SenderKeyState, bool) {
        let key = (group_id.to_string(), sender_id.to_string());
        let created = !self.states.contains_key(&key);
        let state = self
            .states
            .entry(key)
            .or_insert_with(|| SenderKeyState::new_owner(group_id, sender_id, rng));
        (state, created)
    }

    /// Install a receiver state from a distribution record, replacing any
    /// previous state for the same (group, sender).
    ///
    /// # Errors
    ///
    /// - `MalformedDistribution` if the record's key material does not
    ///   decode to the right lengths
    pub fn install(&mut self, record: &SenderKeyDistribution) -> Result<(), GroupError> {
        let signing_public = decode_key(&record.signing_public, "signing_public")?;
        let chain_key = decode_key(&record.chain_key, "chain_key")?;

        let state = SenderKeyState::new_receiver(
            record.group_id.clone(),
            record.sender_id.clone(),
            signing_public,
            chain_key,
        );

        debug!(
            target: "knotwire::group",
            group = %record.group_id,
            sender = %record.sender_id,
            "sender key installed"
        );

        self.states
            .insert((record.group_id.clone(), record.sender_id.clone()), state);
        Ok(())
    }

    /// Look up the state for a (group, sender) pair.
    ///
    /// # Errors
    ///
    /// - `UnknownSenderKeyState` if nothing is installed
    pub fn state_mut(
        &mut self,
        group_id: &str,
        sender_id: &str,
    ) -> Result<&mut SenderKeyState, GroupError> {
        self.states
            .get_mut(&(group_id.to_string(), sender_id.to_string()))
            .ok_or_else(|| GroupError::UnknownSenderKeyState {
                group_id: group_id.to_string(),
                sender_id: sender_id.to_string(),
            })
    }

    /// Whether a state exists for a (group, sender) pair.
    pub fn contains(&self, group_id: &str, sender_id: &str) -> bool {
        self.states.contains_key(&(group_id.to_string(), sender_id.to_string()))
    }

    /// Number of installed states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Decode a base64 field into a 32-byte key.
fn decode_key(encoded: &str, field: &str) -> Result<[u8; 32], GroupError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| GroupError::MalformedDistribution(format!("{field}: {e}")))?;

    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
        GroupError::MalformedDistribution(format!(
            "{field}: expected 32 bytes, got {}",
            bytes.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn test_rng() -> StdRng {
        StdRng::seed_from_u64(0x736b646973)
    }

    #[test]
    fn ensure_owner_creates_once() {
        let mut registry = GroupKeyRegistry::new();
        let mut rng = test_rng();

        let (_, created) = registry.ensure_owner("room", "alice", &mut rng);
        assert!(created);
        let (_, created) = registry.ensure_owner("room", "alice", &mut rng);
        assert!(!created);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn install_then_decrypt() {
        let mut registry = GroupKeyRegistry::new();
        let mut rng = test_rng();

        let mut owner = SenderKeyState::new_owner("room", "alice", &mut rng);
        registry.install(&owner.distribution()).unwrap();

        let message = owner.encrypt(b"to the group", &mut rng).unwrap();
        let state = registry.state_mut("room", "alice").unwrap();
        assert_eq!(state.decrypt(&message).unwrap(), b"to the group");
    }

    #[test]
    fn unknown_state_is_reported() {
        let mut registry = GroupKeyRegistry::new();
        assert_eq!(
            registry.state_mut("room", "mallory").err(),
            Some(GroupError::UnknownSenderKeyState {
                group_id: "room".to_string(),
                sender_id: "mallory".to_string(),
            }),
        );
    }

    #[test]
    fn malformed_chain_key_is_rejected() {
        let mut registry = GroupKeyRegistry::new();
        let mut rng = test_rng();

        let owner = SenderKeyState::new_owner("room", "alice", &mut rng);
        let mut record = owner.distribution();
        record.chain_key = "dG9vc2hvcnQ=".to_string(); // "tooshort"

        assert!(matches!(
            registry.install(&record),
            Err(GroupError::MalformedDistribution(_)),
        ));
    }

    #[test]
    fn malformed_base64_is_rejected() {
        let mut registry = GroupKeyRegistry::new();
        let mut rng = test_rng();

        let owner = SenderKeyState::new_owner("room", "alice", &mut rng);
        let mut record = owner.distribution();
        record.signing_public = "%%%not-base64%%%".to_string();

        assert!(matches!(
            registry.install(&record),
            Err(GroupError::MalformedDistribution(_)),
        ));
    }

    #[test]
    fn distribution_plaintext_round_trips_through_install() {
        let mut registry = GroupKeyRegistry::new();
        let mut rng = test_rng();

        let mut owner = SenderKeyState::new_owner("room", "alice", &mut rng);
        let plaintext = owner.distribution().to_plaintext();

        assert!(SenderKeyDistribution::matches(&plaintext));
        let record = SenderKeyDistribution::from_plaintext(&plaintext).unwrap();
        registry.install(&record).unwrap();

        let message = owner.encrypt(b"after install", &mut rng).unwrap();
        let state = registry.state_mut("room", "alice").unwrap();
        assert_eq!(state.decrypt(&message).unwrap(), b"after install");
    }
}
