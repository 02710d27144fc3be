//! Sender-key distribution record.
//!
//! A sender introduces its group chain to each member through the pairwise
//! channel: the record rides as ordinary pairwise plaintext, prefixed with a
//! recognizable tag so the receiving side can divert it from the
//! application inbox to the group key installer.

use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Tag prefixing a distribution record inside pairwise plaintext.
pub const DISTRIBUTION_TAG: &[u8] = b"skdist:";

/// Introduction of one sender's group chain to another member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderKeyDistribution {
    /// Group the chain belongs to.
    pub group_id: String,
    /// Owning sender's device id.
    pub sender_id: String,
    /// Sender's Ed25519 verifying key, base64.
    pub signing_public: String,
    /// Initial 32-byte chain key, base64.
    pub chain_key: String,
}

impl SenderKeyDistribution {
    /// Serialize into tagged pairwise plaintext: `skdist:` + JSON body.
    #[must_use]
    pub fn to_plaintext(&self) -> Vec<u8> {
        let Ok(body) = serde_json::to_vec(self) else {
            unreachable!("distribution record serialization cannot fail");
        };

        let mut plaintext = Vec::with_capacity(DISTRIBUTION_TAG.len() + body.len());
        plaintext.extend_from_slice(DISTRIBUTION_TAG);
        plaintext.extend_from_slice(&body);
        plaintext
    }

    /// Whether a pairwise plaintext carries a distribution record.
    #[must_use]
    pub fn matches(plaintext: &[u8]) -> bool {
        plaintext.starts_with(DISTRIBUTION_TAG)
    }

    /// Parse a tagged pairwise plaintext back into a record.
    ///
    /// Callers should gate on [`Self::matches`] first; untagged plaintext is
    /// an application message, not a malformed record.
    ///
    /// # Errors
    ///
    /// - `MalformedDistribution` if the plaintext is untagged or the JSON
    ///   body does not parse
    pub fn from_plaintext(plaintext: &[u8]) -> Result<Self> {
        let body = plaintext
            .strip_prefix(DISTRIBUTION_TAG)
            .ok_or_else(|| ProtocolError::MalformedDistribution("missing tag".to_string()))?;

        serde_json::from_slice(body)
            .map_err(|e| ProtocolError::MalformedDistribution(e.to_string()))
    }
}
