//! Prekey directory.
//!
//! Holds the current published record for each device and serves bundles to
//! initiators. Each lookup dequeues at most one classical and one PQ
//! one-time key; a one-time id is never served twice. Publication is an
//! idempotent replace.
//!
//! Thread-safe via `Arc<Mutex<_>>`; clones share the same storage, so every
//! handle observes the same queue state.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use knotwire_proto::PqPublicRecord;
use thiserror::Error;

use crate::device::{DevicePrekeys, OneTimePrekey};

/// Errors from directory lookups.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The device has never published a record
    #[error("unknown device: {device_id}")]
    UnknownDevice {
        /// The device id that was looked up
        device_id: String,
    },
}

/// The bundle served to an initiator for one handshake.
///
/// One-time fields are absent when the corresponding queue is empty.
#[derive(Debug, Clone)]
pub struct PrekeyBundle {
    /// Target device.
    pub device_id: String,
    /// Long-term Ed25519 verifying key.
    pub identity_signing: [u8; 32],
    /// Long-term X25519 agreement public key.
    pub identity_agreement: [u8; 32],
    /// Medium-term signed prekey public half.
    pub signed_prekey: [u8; 32],
    /// Identity signature over the signed prekey public bytes.
    pub signed_prekey_signature: Vec<u8>,
    /// Dequeued classical one-time prekey, if any remained.
    pub one_time_prekey: Option<OneTimePrekey>,
    /// ML-KEM identity prekey (always present).
    pub pq_prekey: PqPublicRecord,
    /// Identity signature over the encoded PQ prekey public bytes.
    pub pq_prekey_signature: Vec<u8>,
    /// Dequeued PQ one-time prekey, if any remained.
    pub pq_one_time_prekey: Option<PqPublicRecord>,
}

/// Per-device stored state: the static record plus one-time queues.
struct DeviceEntry {
    identity_signing: [u8; 32],
    identity_agreement: [u8; 32],
    signed_prekey: [u8; 32],
    signed_prekey_signature: Vec<u8>,
    one_time_queue: VecDeque<OneTimePrekey>,
    pq_prekey: PqPublicRecord,
    pq_prekey_signature: Vec<u8>,
    pq_one_time_queue: VecDeque<PqPublicRecord>,
}

/// In-memory prekey directory.
#[derive(Clone, Default)]
pub struct PrekeyDirectory {
    inner: Arc<Mutex<HashMap<String, DeviceEntry>>>,
}

impl PrekeyDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a device's record, replacing any previous one.
    ///
    /// Replacement resets both one-time queues to the published contents.
    ///
    /// # Panics
    ///
    /// Panics if the directory mutex is poisoned.
    pub fn publish(&self, record: DevicePrekeys) {
        let entry = DeviceEntry {
            identity_signing: record.identity_signing,
            identity_agreement: record.identity_agreement,
            signed_prekey: record.signed_prekey,
            signed_prekey_signature: record.signed_prekey_signature,
            one_time_queue: record.one_time_prekeys.into(),
            pq_prekey: record.pq_prekey,
            pq_prekey_signature: record.pq_prekey_signature,
            pq_one_time_queue: record.pq_one_time_prekeys.into(),
        };

        self.inner
            .lock()
            .expect("directory mutex poisoned")
            .insert(record.device_id, entry);
    }

    /// Fetch a bundle for a device, dequeuing one key from each one-time
    /// queue.
    ///
    /// # Errors
    ///
    /// - `UnknownDevice` if the device has never published
    ///
    /// # Panics
    ///
    /// Panics if the directory mutex is poisoned.
    pub fn fetch_bundle(&self, device_id: &str) -> Result<PrekeyBundle, DirectoryError> {
        let mut devices = self.inner.lock().expect("directory mutex poisoned");
        let entry = devices
            .get_mut(device_id)
            .ok_or_else(|| DirectoryError::UnknownDevice { device_id: device_id.to_string() })?;

        Ok(PrekeyBundle {
            device_id: device_id.to_string(),
            identity_signing: entry.identity_signing,
            identity_agreement: entry.identity_agreement,
            signed_prekey: entry.signed_prekey,
            signed_prekey_signature: entry.signed_prekey_signature.clone(),
            one_time_prekey: entry.one_time_queue.pop_front(),
            pq_prekey: entry.pq_prekey.clone(),
            pq_prekey_signature: entry.pq_prekey_signature.clone(),
            pq_one_time_prekey: entry.pq_one_time_queue.pop_front(),
        })
    }

    /// Remaining queued one-time keys for a device: `(classical, pq)`.
    /// `None` if the device never published.
    ///
    /// # Panics
    ///
    /// Panics if the directory mutex is poisoned.
    pub fn one_time_remaining(&self, device_id: &str) -> Option<(usize, usize)> {
        let devices = self.inner.lock().expect("directory mutex poisoned");
        devices
            .get(device_id)
            .map(|entry| (entry.one_time_queue.len(), entry.pq_one_time_queue.len()))
    }
}
