//! Error types for primitive operations

use thiserror::Error;

/// Errors from the cryptographic primitives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD open failed (truncated input or authentication tag mismatch)
    #[error("aead open failed")]
    AeadOpenFailed,

    /// Key material had the wrong length for its algorithm
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length in bytes
        expected: usize,
        /// Actual length in bytes
        actual: usize,
    },

    /// A signature did not verify over the given message
    #[error("signature verification failed")]
    SignatureInvalid,

    /// ML-KEM parameter set name was not recognized
    #[error("unsupported ML-KEM parameter set: {name}")]
    UnsupportedPqParameter {
        /// The parameter set name that was requested
        name: String,
    },

    /// An ML-KEM public key was malformed for its declared parameter set
    #[error("invalid ML-KEM public key: expected {expected} bytes, got {actual}")]
    InvalidPqPublic {
        /// Expected encoded length for the parameter set
        expected: usize,
        /// Actual encoded length
        actual: usize,
    },

    /// An ML-KEM ciphertext could not be decapsulated
    ///
    /// ML-KEM decapsulation itself is implicit-rejection and never fails;
    /// this is raised when the ciphertext does not even have the right shape
    /// for the key's parameter set.
    #[error("ML-KEM decapsulation failed: ciphertext length {actual}, expected {expected}")]
    PqDecapsulationFailed {
        /// Expected ciphertext length for the parameter set
        expected: usize,
        /// Actual ciphertext length
        actual: usize,
    },
}
