//! Error types for the client layer

use knotwire_core::{DirectoryError, GroupError, HandshakeError, SessionError};
use knotwire_proto::ProtocolError;
use thiserror::Error;

/// Errors from messenger operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Directory lookup failed
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Session establishment failed
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// A ratchet operation failed terminally (`Deferred` is handled
    /// internally and never surfaces here)
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A group operation failed
    #[error(transparent)]
    Group(#[from] GroupError),

    /// An envelope or record could not be coded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A pairwise envelope arrived from a peer with no session and no
    /// handshake record
    #[error("no session for peer {peer} and no handshake record attached")]
    UnknownPeerSession {
        /// The orphaned peer id
        peer: String,
    },

    /// A group send was attempted without a member list for the group
    #[error("unknown group: {group_id}")]
    UnknownGroup {
        /// The unknown group id
        group_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_wrapping_preserves_messages() {
        let err = ClientError::from(SessionError::DecryptFailed);
        assert_eq!(err.to_string(), "decrypt failed");
    }
}
