//! Error types for pairwise ratchet operations

use knotwire_crypto::CryptoError;
use thiserror::Error;

/// Errors from ratchet session operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Encrypt was called before the session's first sending ratchet step
    #[error("sending chain is empty")]
    SendingChainEmpty,

    /// A message for a fresh remote ratchet key arrived without any PQ
    /// material; the epoch cannot be entered yet. The caller should hold
    /// the message and retry it after the next successful decrypt from the
    /// same peer.
    #[error("deferred: epoch-opening message has not arrived yet")]
    Deferred,

    /// The header carried partial PQ material (a ratchet step needs both
    /// the sender's PQ public key and a ciphertext)
    #[error("missing PQ ciphertext for ratchet step")]
    MissingPqCiphertext,

    /// AEAD open failed: tampered header or body, wrong key, replay, or a
    /// late message whose skipped key was already evicted
    #[error("decrypt failed")]
    DecryptFailed,

    /// The header's PQ ratchet public key was malformed
    #[error("invalid PQ ratchet public key")]
    InvalidPqPublic,

    /// The header named a PQ parameter set this build does not support
    #[error("unsupported PQ parameter set: {name}")]
    UnsupportedPqParameter {
        /// The offending parameter set name
        name: String,
    },
}

impl SessionError {
    /// Returns true for the soft, retry-later signal.
    ///
    /// Every other variant is terminal for the message that produced it.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred)
    }
}

impl From<CryptoError> for SessionError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::UnsupportedPqParameter { name } => Self::UnsupportedPqParameter { name },
            CryptoError::InvalidPqPublic { .. } => Self::InvalidPqPublic,
            // A wrong-length PQ ciphertext and a failed tag check both mean
            // the message cannot be decrypted as sent.
            CryptoError::PqDecapsulationFailed { .. } | CryptoError::AeadOpenFailed => {
                Self::DecryptFailed
            },
            CryptoError::InvalidKeyLength { .. } | CryptoError::SignatureInvalid => {
                Self::DecryptFailed
            },
        }
    }
}
