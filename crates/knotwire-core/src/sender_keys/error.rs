//! Error types for sender-key operations

use thiserror::Error;

/// Errors from sender-key encryption and decryption.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SenderKeyError {
    /// The message signature did not verify under the sender's chain
    /// signing key
    #[error("invalid group message signature")]
    InvalidGroupSignature,

    /// AEAD open failed (tampered payload or wrong key)
    #[error("group message decrypt failed")]
    DecryptFailed,

    /// The message's counter is behind the chain and its key is gone:
    /// replayed, or evicted and indistinguishable from a replay
    #[error("group message discarded (replay or consumed key)")]
    Discarded,

    /// The message's counter is below everything the skipped cache could
    /// still hold
    #[error("group message too old: counter {counter} below eviction floor {floor}")]
    MessageTooOld {
        /// The message's counter
        counter: u32,
        /// Lowest counter the cache can still serve
        floor: u32,
    },

    /// Encrypt was called on a receiver-side state with no signing key
    #[error("sender key state is receive-only")]
    ReceiveOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SenderKeyError::MessageTooOld { counter: 3, floor: 10 };
        assert_eq!(err.to_string(), "group message too old: counter 3 below eviction floor 10");
    }
}
