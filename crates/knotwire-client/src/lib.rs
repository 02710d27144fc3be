//! Knotwire client orchestration.
//!
//! The collaborators the protocol core consumes by interface: an in-memory
//! [`transport::Transport`] queue, and the [`messenger::Messenger`]
//! orchestrator that owns the per-peer ratchet sessions, holds the
//! deferred-message list, retries it on every successful decrypt, and
//! dispatches decrypted plaintext either to the application inbox or to the
//! group key installer.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod event;
pub mod messenger;
pub mod transport;

pub use error::ClientError;
pub use event::InboundEvent;
pub use messenger::Messenger;
pub use transport::Transport;
