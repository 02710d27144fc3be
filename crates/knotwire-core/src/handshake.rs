//! Hybrid PQXDH handshake.
//!
//! Derives the initial session root key from a fetched prekey bundle, the
//! initiator's ephemerals, and one ML-KEM encapsulation. Four X25519 shares
//! are computed in fixed order (DH4 omitted when the bundle carried no
//! one-time key), concatenated with the ML-KEM shared secret, and fed
//! through HKDF. The root key stays confidential while either the classical
//! or the PQ component remains secret.

use knotwire_crypto::{
    kdf, verify, AgreementKeyPair, CryptoError, KemKeyPair, KemParameterSet, KemPublicKey,
};
use knotwire_proto::InitialBundle;
use rand_core::{CryptoRng, RngCore};
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

use crate::{
    config::ProtocolConfig,
    device::{DeviceKeystore, KeystoreError},
    directory::PrekeyBundle,
    session::RatchetSession,
};

/// Errors from session establishment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// The bundle's signed prekey signature did not verify
    #[error("invalid signed prekey signature")]
    InvalidSignedPreKeySignature,

    /// The bundle's PQ prekey signature did not verify
    #[error("invalid PQ prekey signature")]
    InvalidPqPreKeySignature,

    /// The initiator named a one-time key this device no longer holds
    #[error("missing one-time key: {key_id}")]
    MissingOneTimeKey {
        /// Id of the consumed or unknown key
        key_id: String,
    },

    /// The handshake ML-KEM ciphertext could not be decapsulated
    #[error("PQ decapsulation failed")]
    PqDecapsulationFailed,

    /// The bundle named a parameter set this build does not support
    #[error("unsupported PQ parameter set: {name}")]
    UnsupportedPqParameter {
        /// The offending parameter set name
        name: String,
    },

    /// The peer PQ public key was malformed
    #[error("invalid PQ public key in bundle")]
    InvalidPqPublic,

    /// The two sides derived different root keys
    ///
    /// Detected downstream: the responder's first decrypt fails its AEAD
    /// check when the roots disagree.
    #[error("handshake mismatch: derived root keys differ")]
    HandshakeMismatch,
}

impl From<KeystoreError> for HandshakeError {
    fn from(err: KeystoreError) -> Self {
        match err {
            KeystoreError::KeyNotFound { key_id } => Self::MissingOneTimeKey { key_id },
        }
    }
}

/// Initiator-side handshake output.
///
/// Holds everything needed to construct the initiator's session and the
/// [`InitialBundle`] the responder needs to do the same.
pub struct InitiatorHandshake {
    /// The responder's device id.
    pub peer_device_id: String,
    /// Derived session root key.
    pub root_key: Zeroizing<[u8; 32]>,
    /// Handshake ephemeral; becomes the initiator's first ratchet key.
    pub ephemeral: AgreementKeyPair,
    /// Responder's signed prekey public: its initial ratchet key.
    pub responder_ratchet_public: [u8; 32],
    /// Selected responder PQ prekey: the first PQ ratchet target.
    pub remote_pq_public: KemPublicKey,
    /// Record the responder needs to derive the same root key.
    pub initial: InitialBundle,
}

impl InitiatorHandshake {
    /// Construct the initiator's ratchet session (performing its first
    /// sending step) and hand back the [`InitialBundle`] for the wire.
    pub fn into_session(
        self,
        config: ProtocolConfig,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> (RatchetSession, InitialBundle) {
        let session = RatchetSession::new_initiator(
            self.peer_device_id,
            *self.root_key,
            self.ephemeral,
            self.responder_ratchet_public,
            self.remote_pq_public,
            config,
            rng,
        );
        (session, self.initial)
    }
}

/// Responder-side handshake output.
pub struct ResponderHandshake {
    /// Derived session root key (byte-equal to the initiator's).
    pub root_key: Zeroizing<[u8; 32]>,
    /// The initiator's ephemeral: its initial ratchet public key.
    pub initiator_ratchet_public: [u8; 32],
    /// The PQ prekey the initiator encapsulated to; the responder's initial
    /// PQ ratchet key.
    pub local_pq_prekey: KemKeyPair,
    /// Signed prekey pair: the responder's first DH ratchet input.
    pub signed_prekey: AgreementKeyPair,
}

impl ResponderHandshake {
    /// Construct the responder's (still receive-less) ratchet session.
    pub fn into_session(self, peer_device_id: impl Into<String>, config: ProtocolConfig) -> RatchetSession {
        RatchetSession::new_responder(
            peer_device_id,
            *self.root_key,
            self.signed_prekey,
            self.initiator_ratchet_public,
            self.local_pq_prekey,
            config,
        )
    }
}

/// Run the initiator side of the handshake against a fetched bundle.
///
/// Verifies both bundle signatures, computes the four DH shares in fixed
/// order, encapsulates to the selected PQ prekey (one-time if offered, else
/// identity), and derives the root key.
///
/// # Errors
///
/// - `InvalidSignedPreKeySignature` / `InvalidPqPreKeySignature` on a bad
///   bundle signature; the PQ check runs whether or not a one-time PQ key
///   was selected
/// - `UnsupportedPqParameter` / `InvalidPqPublic` on a malformed PQ record
pub fn initiate(
    local: &DeviceKeystore,
    bundle: &PrekeyBundle,
    rng: &mut (impl RngCore + CryptoRng),
) -> Result<InitiatorHandshake, HandshakeError> {
    verify(&bundle.identity_signing, &bundle.signed_prekey, &bundle.signed_prekey_signature)
        .map_err(|_| HandshakeError::InvalidSignedPreKeySignature)?;
    verify(&bundle.identity_signing, &bundle.pq_prekey.bytes, &bundle.pq_prekey_signature)
        .map_err(|_| HandshakeError::InvalidPqPreKeySignature)?;

    let ephemeral = AgreementKeyPair::generate(rng);

    // DH1..DH4 in fixed order; DH4 only when the bundle offered a one-time
    // key.
    let mut ikm = Zeroizing::new(Vec::with_capacity(4 * 32 + 32));
    ikm.extend_from_slice(&local.identity_agreement().diffie_hellman(&bundle.signed_prekey));
    ikm.extend_from_slice(&ephemeral.diffie_hellman(&bundle.identity_agreement));
    ikm.extend_from_slice(&ephemeral.diffie_hellman(&bundle.signed_prekey));
    if let Some(one_time) = &bundle.one_time_prekey {
        ikm.extend_from_slice(&ephemeral.diffie_hellman(&one_time.public));
    }

    // PQ target: the one-time prekey when offered, else the identity
    // prekey.
    let (pq_record, pq_is_one_time) = match &bundle.pq_one_time_prekey {
        Some(record) => (record, true),
        None => (&bundle.pq_prekey, false),
    };
    let remote_pq_public = pq_public_from_record(&pq_record.parameter_set, &pq_record.bytes)?;
    let (pq_ciphertext, pq_secret) = remote_pq_public.encapsulate(rng);

    ikm.extend_from_slice(&pq_secret);
    let root_key = Zeroizing::new(kdf::derive_handshake_secret(&ikm));

    debug!(
        target: "knotwire::session",
        peer = %bundle.device_id,
        one_time = bundle.one_time_prekey.is_some(),
        pq_one_time = pq_is_one_time,
        "handshake initiated"
    );

    let initial = InitialBundle {
        initiator_device_id: local.device_id().to_string(),
        identity_agreement: local.identity_agreement().public_bytes(),
        ephemeral: ephemeral.public_bytes(),
        one_time_key_id: bundle.one_time_prekey.as_ref().map(|k| k.key_id.clone()),
        pq_ciphertext,
        pq_key_id: pq_record.key_id.clone(),
        pq_is_one_time,
    };

    Ok(InitiatorHandshake {
        peer_device_id: bundle.device_id.clone(),
        root_key,
        ephemeral,
        responder_ratchet_public: bundle.signed_prekey,
        remote_pq_public,
        initial,
    })
}

/// Run the responder side of the handshake from a received
/// [`InitialBundle`].
///
/// Consumes the named one-time keys from the local keystore, computes the
/// mirrored DH shares, decapsulates the handshake ciphertext, and derives
/// the same root key.
///
/// # Errors
///
/// - `MissingOneTimeKey` if a named one-time key was already consumed
/// - `PqDecapsulationFailed` if the ciphertext does not fit the prekey
pub fn respond(
    local: &DeviceKeystore,
    initial: &InitialBundle,
) -> Result<ResponderHandshake, HandshakeError> {
    let signed_prekey = local.signed_prekey().clone();

    // Mirrored DH1..DH4.
    let mut ikm = Zeroizing::new(Vec::with_capacity(4 * 32 + 32));
    ikm.extend_from_slice(&signed_prekey.diffie_hellman(&initial.identity_agreement));
    ikm.extend_from_slice(&local.identity_agreement().diffie_hellman(&initial.ephemeral));
    ikm.extend_from_slice(&signed_prekey.diffie_hellman(&initial.ephemeral));
    if let Some(key_id) = &initial.one_time_key_id {
        let one_time = local.consume_one_time(key_id)?;
        ikm.extend_from_slice(&one_time.diffie_hellman(&initial.ephemeral));
    }

    let local_pq_prekey = if initial.pq_is_one_time {
        local.consume_pq_one_time(&initial.pq_key_id)?
    } else {
        local.pq_identity_prekey().clone()
    };

    let pq_secret = local_pq_prekey
        .decapsulate(&initial.pq_ciphertext)
        .map_err(|_| HandshakeError::PqDecapsulationFailed)?;

    ikm.extend_from_slice(&pq_secret);
    let root_key = Zeroizing::new(kdf::derive_handshake_secret(&ikm));

    debug!(
        target: "knotwire::session",
        peer = %initial.initiator_device_id,
        one_time = initial.one_time_key_id.is_some(),
        pq_one_time = initial.pq_is_one_time,
        "handshake accepted"
    );

    Ok(ResponderHandshake {
        root_key,
        initiator_ratchet_public: initial.ephemeral,
        local_pq_prekey,
        signed_prekey,
    })
}

/// Reconstruct a typed PQ public key from a wire record.
fn pq_public_from_record(
    parameter_set: &str,
    bytes: &[u8],
) -> Result<KemPublicKey, HandshakeError> {
    let parameter_set = KemParameterSet::from_name(parameter_set).map_err(|err| match err {
        CryptoError::UnsupportedPqParameter { name } => {
            HandshakeError::UnsupportedPqParameter { name }
        },
        _ => HandshakeError::InvalidPqPublic,
    })?;

    KemPublicKey::new(parameter_set, bytes.to_vec())
        .map_err(|_| HandshakeError::InvalidPqPublic)
}
