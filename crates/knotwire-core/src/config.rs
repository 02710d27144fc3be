//! Protocol configuration.

use knotwire_crypto::KemParameterSet;

/// Protocol-level tunables, fixed at device creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Maximum concurrent skipped message keys per chain. Oldest insertion
    /// is evicted when the cap is exceeded.
    pub skipped_key_cap: usize,

    /// ML-KEM security level used for all of the device's PQ prekeys and
    /// ratchet keys.
    pub pq_parameter_set: KemParameterSet,

    /// Number of classical and PQ one-time prekeys generated at device
    /// birth.
    pub one_time_prekey_count: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            skipped_key_cap: 50,
            pq_parameter_set: KemParameterSet::MlKem512,
            one_time_prekey_count: 10,
        }
    }
}
