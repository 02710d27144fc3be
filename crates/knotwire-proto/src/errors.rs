//! Error types for wire coding

use thiserror::Error;

/// Result alias for wire coding operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors from envelope and record coding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Envelope exceeded the maximum accepted size
    #[error("envelope too large: {size} bytes exceeds {max}")]
    EnvelopeTooLarge {
        /// Size of the rejected envelope
        size: usize,
        /// Maximum accepted size
        max: usize,
    },

    /// CBOR serialization failed
    #[error("cbor encode: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed
    #[error("cbor decode: {0}")]
    CborDecode(String),

    /// A tagged distribution payload was not a valid record
    #[error("malformed distribution record: {0}")]
    MalformedDistribution(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::EnvelopeTooLarge { size: 10, max: 5 };
        assert_eq!(err.to_string(), "envelope too large: 10 bytes exceeds 5");
    }
}
