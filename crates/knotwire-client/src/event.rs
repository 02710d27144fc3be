//! Events surfaced to the application.

/// A decrypted inbound item, produced by [`crate::Messenger::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A pairwise application message.
    Message {
        /// Sending peer's device id.
        peer: String,
        /// Decrypted plaintext.
        plaintext: Vec<u8>,
    },

    /// A sender-key chain was installed from a distribution record.
    SenderKeyInstalled {
        /// Group the chain belongs to.
        group_id: String,
        /// Owning sender's device id.
        sender_id: String,
    },

    /// A group application message.
    GroupMessage {
        /// Group the message belongs to.
        group_id: String,
        /// Sending device id.
        sender_id: String,
        /// Decrypted plaintext.
        plaintext: Vec<u8>,
    },
}
