//! Bounded skipped-key cache for out-of-order delivery.
//!
//! Keys are indexed by (peer ratchet key id, message number), where the key
//! id is the base64 of the peer's raw ratchet public bytes: the logical
//! identity of an epoch. A FIFO tracks insertion order for oldest-out
//! eviction; consuming an entry removes it from both the map and the FIFO.
//!
//! # Invariants
//!
//! - The cache never holds more than `cap` entries.
//! - An entry is consumed at most once; replaying a decrypted message finds
//!   nothing.

use std::collections::{HashMap, VecDeque};

use zeroize::Zeroizing;

/// Cache id: (peer ratchet key id, message number).
type CacheId = (String, u32);

/// FIFO-bounded map from (epoch, message number) to a one-shot message key.
pub(crate) struct SkippedKeyCache {
    keys: HashMap<CacheId, Zeroizing<[u8; 32]>>,
    order: VecDeque<CacheId>,
    cap: usize,
}

impl SkippedKeyCache {
    /// Create an empty cache with the given capacity.
    pub(crate) fn new(cap: usize) -> Self {
        Self { keys: HashMap::new(), order: VecDeque::new(), cap }
    }

    /// Insert a speculative message key, evicting the oldest insertion when
    /// the cap would be exceeded.
    pub(crate) fn insert(&mut self, epoch_id: &str, n: u32, key: Zeroizing<[u8; 32]>) {
        while self.keys.len() >= self.cap {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.keys.remove(&oldest);
        }

        let id = (epoch_id.to_string(), n);
        self.order.push_back(id.clone());
        self.keys.insert(id, key);
    }

    /// Consume the key for (epoch, n), removing it from the map and the
    /// FIFO.
    pub(crate) fn take(&mut self, epoch_id: &str, n: u32) -> Option<Zeroizing<[u8; 32]>> {
        let id = (epoch_id.to_string(), n);
        let key = self.keys.remove(&id)?;
        self.order.retain(|entry| entry != &id);
        Some(key)
    }

    /// Number of cached keys.
    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }
}
