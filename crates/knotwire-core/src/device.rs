//! Per-device key material.
//!
//! A device mints its identity material once: a long-term signing pair, a
//! long-term agreement pair, a signed medium-term prekey, a signed ML-KEM
//! identity prekey, and batches of classical and PQ one-time prekeys. The
//! public halves are published to the directory; the private halves stay
//! here. One-time keys are consumed at most once.
//!
//! # Invariants
//!
//! - Consumption is atomic: of two concurrent consumers of the same key id,
//!   exactly one receives the key and the other gets `KeyNotFound`.
//! - The PQ identity prekey is never consumed; it is reused until rotated.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use knotwire_crypto::{AgreementKeyPair, KemKeyPair, SigningKeyPair, SIGNATURE_SIZE};
use knotwire_proto::PqPublicRecord;
use rand_core::{CryptoRng, RngCore};
use thiserror::Error;

use crate::config::ProtocolConfig;

/// Errors from keystore operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeystoreError {
    /// The named one-time key is absent: never issued, or already consumed
    #[error("one-time key not found: {key_id}")]
    KeyNotFound {
        /// Id of the missing key
        key_id: String,
    },
}

/// A one-time agreement prekey as served to initiators (public half).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneTimePrekey {
    /// Key id (base64 of the public bytes).
    pub key_id: String,
    /// Raw X25519 public key.
    pub public: [u8; 32],
}

/// The public record a device publishes to the directory.
#[derive(Debug, Clone)]
pub struct DevicePrekeys {
    /// Publishing device.
    pub device_id: String,
    /// Long-term Ed25519 verifying key.
    pub identity_signing: [u8; 32],
    /// Long-term X25519 agreement public key.
    pub identity_agreement: [u8; 32],
    /// Medium-term signed prekey public half.
    pub signed_prekey: [u8; 32],
    /// Identity signature over the signed prekey public bytes.
    pub signed_prekey_signature: Vec<u8>,
    /// Fresh classical one-time prekeys, oldest first.
    pub one_time_prekeys: Vec<OneTimePrekey>,
    /// ML-KEM identity prekey public half (reusable).
    pub pq_prekey: PqPublicRecord,
    /// Identity signature over the encoded PQ prekey public bytes.
    pub pq_prekey_signature: Vec<u8>,
    /// Fresh PQ one-time prekeys, oldest first.
    pub pq_one_time_prekeys: Vec<PqPublicRecord>,
}

/// A device's private key material.
///
/// Cloning shares the one-time key tables, so a clone observes (and races
/// on) the same consumption state.
#[derive(Clone)]
pub struct DeviceKeystore {
    device_id: String,
    config: ProtocolConfig,

    identity_signing: SigningKeyPair,
    identity_agreement: AgreementKeyPair,

    signed_prekey: AgreementKeyPair,
    signed_prekey_signature: [u8; SIGNATURE_SIZE],

    pq_identity_prekey: KemKeyPair,
    pq_identity_signature: [u8; SIGNATURE_SIZE],

    one_time_prekeys: Arc<Mutex<HashMap<String, AgreementKeyPair>>>,
    pq_one_time_prekeys: Arc<Mutex<HashMap<String, KemKeyPair>>>,
}

impl DeviceKeystore {
    /// Mint a device's initial key material.
    ///
    /// Generates the long-term pairs, signs the medium-term and PQ prekeys
    /// with the identity signing key, and fills both one-time tables with
    /// `config.one_time_prekey_count` entries each.
    pub fn create(
        device_id: impl Into<String>,
        config: ProtocolConfig,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Self {
        let identity_signing = SigningKeyPair::generate(rng);
        let identity_agreement = AgreementKeyPair::generate(rng);

        let signed_prekey = AgreementKeyPair::generate(rng);
        let signed_prekey_signature = identity_signing.sign(&signed_prekey.public_bytes());

        let pq_identity_prekey = KemKeyPair::generate(config.pq_parameter_set, rng);
        let pq_identity_signature =
            identity_signing.sign(pq_identity_prekey.public_key().as_bytes());

        let mut one_time = HashMap::with_capacity(config.one_time_prekey_count);
        for _ in 0..config.one_time_prekey_count {
            let pair = AgreementKeyPair::generate(rng);
            one_time.insert(pair.key_id(), pair);
        }

        let mut pq_one_time = HashMap::with_capacity(config.one_time_prekey_count);
        for _ in 0..config.one_time_prekey_count {
            let pair = KemKeyPair::generate(config.pq_parameter_set, rng);
            pq_one_time.insert(pair.key_id(), pair);
        }

        Self {
            device_id: device_id.into(),
            config,
            identity_signing,
            identity_agreement,
            signed_prekey,
            signed_prekey_signature,
            pq_identity_prekey,
            pq_identity_signature,
            one_time_prekeys: Arc::new(Mutex::new(one_time)),
            pq_one_time_prekeys: Arc::new(Mutex::new(pq_one_time)),
        }
    }

    /// This device's id.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The device's protocol configuration.
    pub fn config(&self) -> ProtocolConfig {
        self.config
    }

    /// Long-term signing pair.
    pub fn identity_signing(&self) -> &SigningKeyPair {
        &self.identity_signing
    }

    /// Long-term agreement pair.
    pub fn identity_agreement(&self) -> &AgreementKeyPair {
        &self.identity_agreement
    }

    /// Medium-term signed prekey pair.
    pub fn signed_prekey(&self) -> &AgreementKeyPair {
        &self.signed_prekey
    }

    /// Reusable ML-KEM identity prekey pair.
    pub fn pq_identity_prekey(&self) -> &KemKeyPair {
        &self.pq_identity_prekey
    }

    /// Assemble the public record for publication to the directory.
    ///
    /// Includes every one-time key currently unconsumed.
    ///
    /// # Panics
    ///
    /// Panics if a one-time table mutex is poisoned.
    pub fn published_prekeys(&self) -> DevicePrekeys {
        let one_time = self.one_time_prekeys.lock().expect("one-time table mutex poisoned");
        let pq_one_time =
            self.pq_one_time_prekeys.lock().expect("PQ one-time table mutex poisoned");

        let pq_public = self.pq_identity_prekey.public_key();

        DevicePrekeys {
            device_id: self.device_id.clone(),
            identity_signing: self.identity_signing.public_bytes(),
            identity_agreement: self.identity_agreement.public_bytes(),
            signed_prekey: self.signed_prekey.public_bytes(),
            signed_prekey_signature: self.signed_prekey_signature.to_vec(),
            one_time_prekeys: one_time
                .values()
                .map(|pair| OneTimePrekey { key_id: pair.key_id(), public: pair.public_bytes() })
                .collect(),
            pq_prekey: PqPublicRecord {
                bytes: pq_public.as_bytes().to_vec(),
                key_id: pq_public.key_id(),
                parameter_set: pq_public.parameter_set().name().to_string(),
            },
            pq_prekey_signature: self.pq_identity_signature.to_vec(),
            pq_one_time_prekeys: pq_one_time
                .values()
                .map(|pair| {
                    let public = pair.public_key();
                    PqPublicRecord {
                        bytes: public.as_bytes().to_vec(),
                        key_id: public.key_id(),
                        parameter_set: public.parameter_set().name().to_string(),
                    }
                })
                .collect(),
        }
    }

    /// Consume a classical one-time prekey by id.
    ///
    /// Removes the pair from the table and returns it. A second consumer of
    /// the same id fails.
    ///
    /// # Errors
    ///
    /// - `KeyNotFound` if the id is absent
    ///
    /// # Panics
    ///
    /// Panics if the one-time table mutex is poisoned.
    pub fn consume_one_time(&self, key_id: &str) -> Result<AgreementKeyPair, KeystoreError> {
        self.one_time_prekeys
            .lock()
            .expect("one-time table mutex poisoned")
            .remove(key_id)
            .ok_or_else(|| KeystoreError::KeyNotFound { key_id: key_id.to_string() })
    }

    /// Consume a PQ one-time prekey by id.
    ///
    /// # Errors
    ///
    /// - `KeyNotFound` if the id is absent
    ///
    /// # Panics
    ///
    /// Panics if the PQ one-time table mutex is poisoned.
    pub fn consume_pq_one_time(&self, key_id: &str) -> Result<KemKeyPair, KeystoreError> {
        self.pq_one_time_prekeys
            .lock()
            .expect("PQ one-time table mutex poisoned")
            .remove(key_id)
            .ok_or_else(|| KeystoreError::KeyNotFound { key_id: key_id.to_string() })
    }

    /// Number of unconsumed classical one-time prekeys.
    ///
    /// # Panics
    ///
    /// Panics if the one-time table mutex is poisoned.
    pub fn one_time_remaining(&self) -> usize {
        self.one_time_prekeys.lock().expect("one-time table mutex poisoned").len()
    }

    /// Number of unconsumed PQ one-time prekeys.
    ///
    /// # Panics
    ///
    /// Panics if the PQ one-time table mutex is poisoned.
    pub fn pq_one_time_remaining(&self) -> usize {
        self.pq_one_time_prekeys.lock().expect("PQ one-time table mutex poisoned").len()
    }
}

impl std::fmt::Debug for DeviceKeystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceKeystore")
            .field("device_id", &self.device_id)
            .field("pq_parameter_set", &self.config.pq_parameter_set)
            .finish_non_exhaustive()
    }
}
