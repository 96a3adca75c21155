// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-device publish-dedup store.
//!
//! Tracks, for every device, the last successfully published [`DeviceState`]
//! and when it was published. The broker consults it to suppress publishes of
//! unchanged data and to decide when a heartbeat republish is due; a `resync`
//! command clears it so the next poll republishes everything.
//!
//! This is the single necessarily-shared mutable map in the gateway: many bus
//! workers read it on every poll, writes happen only on successful publishes.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tokio::time::Instant;

use crate::types::DeviceState;

/// Last-published snapshot and timestamp per device.
///
/// Read-mostly; guarded by a read-write lock. Entries are created on the
/// first successful publish and removed only by [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct EdgeStateStore {
    inner: RwLock<HashMap<String, Entry>>,
}

#[derive(Debug, Clone)]
struct Entry {
    state: DeviceState,
    published_at: Instant,
}

impl EdgeStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last published state and publish time for a device.
    pub fn get_last(&self, device_name: &str) -> Option<(DeviceState, Instant)> {
        self.inner
            .read()
            .expect("state store lock poisoned")
            .get(device_name)
            .map(|e| (e.state.clone(), e.published_at))
    }

    /// Records a successful publish.
    ///
    /// The snapshot and the publish timestamp are written under one lock
    /// acquisition so readers never observe a torn pair.
    pub fn update(&self, state: DeviceState) {
        let mut inner = self.inner.write().expect("state store lock poisoned");
        inner.insert(
            state.name.clone(),
            Entry {
                state,
                published_at: Instant::now(),
            },
        );
    }

    /// Returns `true` if `state` differs from the last published snapshot.
    ///
    /// A device with no prior entry always counts as changed. Comparison is
    /// byte-for-byte over the four banks plus the status string; timestamp
    /// and errors are excluded.
    pub fn has_changed(&self, state: &DeviceState) -> bool {
        let inner = self.inner.read().expect("state store lock poisoned");
        match inner.get(&state.name) {
            Some(entry) => !entry.state.same_payload(state),
            None => true,
        }
    }

    /// Decides whether `state` should go out, applying both the change
    /// dedup and the heartbeat rule.
    ///
    /// Publish when the payload changed; otherwise only when heartbeats are
    /// enabled (`heartbeat_interval > 0`) and the last publish is older than
    /// the interval (or the device has never been published).
    pub fn needs_publish(&self, state: &DeviceState, heartbeat_interval: Duration) -> bool {
        if self.has_changed(state) {
            return true;
        }
        if heartbeat_interval.is_zero() {
            return false;
        }
        match self.get_last(&state.name) {
            None => true,
            Some((_, published_at)) => published_at.elapsed() > heartbeat_interval,
        }
    }

    /// Forgets everything; the next poll republishes every device.
    pub fn clear(&self) {
        self.inner
            .write()
            .expect("state store lock poisoned")
            .clear();
    }

    /// Number of devices with a published entry.
    pub fn len(&self) -> usize {
        self.inner.read().expect("state store lock poisoned").len()
    }

    /// Returns `true` if no device has been published yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceStatus;

    fn state_with_coils(name: &str, coils: &[u8]) -> DeviceState {
        let mut state = DeviceState::now(name);
        state.digital_outputs = Some(coils.to_vec());
        state
    }

    #[test]
    fn test_first_state_is_always_changed() {
        let store = EdgeStateStore::new();
        assert!(store.has_changed(&state_with_coils("d1", &[0x01])));
    }

    #[test]
    fn test_identical_payload_is_unchanged() {
        let store = EdgeStateStore::new();
        store.update(state_with_coils("d1", &[0x05]));

        // Fresh timestamp, new error strings, same data.
        let mut next = state_with_coils("d1", &[0x05]);
        next.errors = vec!["digitalInputs: flaky".to_string()];
        assert!(!store.has_changed(&next));
    }

    #[test]
    fn test_bank_or_status_change_detected() {
        let store = EdgeStateStore::new();
        store.update(state_with_coils("d1", &[0x05]));

        assert!(store.has_changed(&state_with_coils("d1", &[0x04])));

        let mut degraded = state_with_coils("d1", &[0x05]);
        degraded.status = DeviceStatus::PartialError;
        assert!(store.has_changed(&degraded));
    }

    #[test]
    fn test_clear_resets_dedup() {
        let store = EdgeStateStore::new();
        let state = state_with_coils("d1", &[0x05]);
        store.update(state.clone());
        assert!(!store.has_changed(&state));

        store.clear();
        assert!(store.is_empty());
        assert!(store.has_changed(&state));
    }

    #[tokio::test]
    async fn test_get_last_returns_publish_instant() {
        let store = EdgeStateStore::new();
        assert!(store.get_last("d1").is_none());

        let before = Instant::now();
        store.update(state_with_coils("d1", &[0x01]));
        let (state, at) = store.get_last("d1").unwrap();
        assert_eq!(state.name, "d1");
        assert!(at >= before);
    }
}
