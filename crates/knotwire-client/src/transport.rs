//! In-memory message transport.
//!
//! A per-recipient FIFO of opaque envelope bytes. The transport knows
//! nothing about sessions or ciphertext structure; endpoints share a clone
//! of the same queue map.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

/// Shared in-memory transport queue.
#[derive(Clone, Default)]
pub struct Transport {
    inner: Arc<Mutex<HashMap<String, VecDeque<Vec<u8>>>>>,
}

impl Transport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a payload for a recipient.
    ///
    /// # Panics
    ///
    /// Panics if the queue mutex is poisoned.
    pub fn enqueue(&self, recipient: &str, payload: Vec<u8>) {
        self.inner
            .lock()
            .expect("transport mutex poisoned")
            .entry(recipient.to_string())
            .or_default()
            .push_back(payload);
    }

    /// Take everything queued for a recipient, in arrival order.
    ///
    /// # Panics
    ///
    /// Panics if the queue mutex is poisoned.
    pub fn drain(&self, recipient: &str) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .expect("transport mutex poisoned")
            .remove(recipient)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Number of payloads waiting for a recipient.
    ///
    /// # Panics
    ///
    /// Panics if the queue mutex is poisoned.
    pub fn pending(&self, recipient: &str) -> usize {
        self.inner
            .lock()
            .expect("transport mutex poisoned")
            .get(recipient)
            .map_or(0, VecDeque::len)
    }
}
