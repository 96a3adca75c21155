// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Mock implementations of the gateway's seams.
//!
//! - [`MockDeviceClient`] scripts bank data and error injection per device
//!   and records every bus operation with a timestamp.
//! - [`MockPublisher`] captures every published state unconditionally.
//! - [`DedupPublisher`] applies the real dedup/heartbeat rules through
//!   [`EdgeStateStore`], for end-to-end publish-count scenarios.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use uhn_config::DeviceSpec;
use uhn_core::error::{BrokerResult, ClientError, ClientResult};
use uhn_core::state::EdgeStateStore;
use uhn_core::traits::EdgePublisher;
use uhn_core::types::DeviceState;
use uhn_poller::DeviceClient;

// =============================================================================
// MockDeviceClient
// =============================================================================

/// Bank identifiers used for scripting.
pub const DIGITAL_OUTPUTS: &str = "digitalOutputs";
/// See [`DIGITAL_OUTPUTS`].
pub const DIGITAL_INPUTS: &str = "digitalInputs";
/// See [`DIGITAL_OUTPUTS`].
pub const ANALOG_OUTPUTS: &str = "analogOutputs";
/// See [`DIGITAL_OUTPUTS`].
pub const ANALOG_INPUTS: &str = "analogInputs";

/// One recorded bus operation.
#[derive(Debug, Clone)]
pub struct RecordedOp {
    /// Operation description, e.g. `write d1@3=true`.
    pub what: String,
    /// When it happened (tokio clock, honors paused time).
    pub at: Instant,
}

/// Shared, inspectable state of a [`MockDeviceClient`].
#[derive(Default)]
pub struct MockClientState {
    /// Every operation in order.
    pub ops: Vec<RecordedOp>,
    /// Scripted bank bytes, keyed by (device, bank).
    pub banks: HashMap<(String, &'static str), Vec<u8>>,
    /// Injected bank errors, keyed by (device, bank).
    pub bank_errors: HashMap<(String, &'static str), String>,
    /// Commanded coil values, keyed by (device, address).
    pub coils: HashMap<(String, u16), bool>,
    /// Toggle invocation counter per (device, address).
    pub toggles: HashMap<(String, u16), u32>,
    /// Set once `close` has been called.
    pub closed: bool,
}

impl MockClientState {
    /// Operations as plain strings, for order assertions.
    pub fn op_names(&self) -> Vec<String> {
        self.ops.iter().map(|op| op.what.clone()).collect()
    }
}

/// Scripted [`DeviceClient`] double.
pub struct MockDeviceClient {
    state: Arc<Mutex<MockClientState>>,
}

impl MockDeviceClient {
    /// Creates the mock and a handle to its shared state.
    pub fn new() -> (Self, Arc<Mutex<MockClientState>>) {
        let state = Arc::new(Mutex::new(MockClientState::default()));
        (Self { state: Arc::clone(&state) }, state)
    }

    fn record(&self, what: impl Into<String>) {
        self.state.lock().unwrap().ops.push(RecordedOp {
            what: what.into(),
            at: Instant::now(),
        });
    }

    fn bank(&self, device: &DeviceSpec, bank: &'static str) -> ClientResult<Vec<u8>> {
        self.record(format!("read {} {}", device.name, bank));
        let state = self.state.lock().unwrap();
        if let Some(message) = state.bank_errors.get(&(device.name.clone(), bank)) {
            return Err(ClientError::read(0, 0, message.clone()));
        }
        Ok(state
            .banks
            .get(&(device.name.clone(), bank))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl DeviceClient for MockDeviceClient {
    async fn ensure_connected(&mut self, _cancel: &CancellationToken) -> ClientResult<()> {
        Ok(())
    }

    async fn close(&mut self) {
        self.state.lock().unwrap().closed = true;
    }

    async fn read_single_digital_output(
        &mut self,
        _cancel: &CancellationToken,
        device: &DeviceSpec,
        address: u16,
    ) -> ClientResult<bool> {
        self.record(format!("read-single {}@{}", device.name, address));
        let state = self.state.lock().unwrap();
        Ok(state
            .coils
            .get(&(device.name.clone(), address))
            .copied()
            .unwrap_or(false))
    }

    async fn read_single_digital_input(
        &mut self,
        _cancel: &CancellationToken,
        device: &DeviceSpec,
        address: u16,
    ) -> ClientResult<bool> {
        self.record(format!("read-single-input {}@{}", device.name, address));
        Ok(false)
    }

    async fn write_single_digital_output(
        &mut self,
        _cancel: &CancellationToken,
        device: &DeviceSpec,
        address: u16,
        value: bool,
    ) -> ClientResult<()> {
        self.record(format!("write {}@{}={}", device.name, address, value));
        self.state
            .lock()
            .unwrap()
            .coils
            .insert((device.name.clone(), address), value);
        Ok(())
    }

    async fn toggle_single_digital_output(
        &mut self,
        _cancel: &CancellationToken,
        device: &DeviceSpec,
        address: u16,
    ) -> ClientResult<()> {
        self.record(format!("toggle {}@{}", device.name, address));
        let mut state = self.state.lock().unwrap();
        let key = (device.name.clone(), address);
        *state.toggles.entry(key.clone()).or_insert(0) += 1;
        let current = state.coils.get(&key).copied().unwrap_or(false);
        state.coils.insert(key, !current);
        Ok(())
    }

    async fn read_device_digital_output(
        &mut self,
        _cancel: &CancellationToken,
        device: &DeviceSpec,
    ) -> ClientResult<Vec<u8>> {
        self.bank(device, DIGITAL_OUTPUTS)
    }

    async fn read_device_digital_input(
        &mut self,
        _cancel: &CancellationToken,
        device: &DeviceSpec,
    ) -> ClientResult<Vec<u8>> {
        self.bank(device, DIGITAL_INPUTS)
    }

    async fn read_device_analog_output(
        &mut self,
        _cancel: &CancellationToken,
        device: &DeviceSpec,
    ) -> ClientResult<Vec<u8>> {
        self.bank(device, ANALOG_OUTPUTS)
    }

    async fn read_device_analog_input(
        &mut self,
        _cancel: &CancellationToken,
        device: &DeviceSpec,
    ) -> ClientResult<Vec<u8>> {
        self.bank(device, ANALOG_INPUTS)
    }
}

// =============================================================================
// MockPublisher
// =============================================================================

/// Captures every published state, no dedup.
#[derive(Default)]
pub struct MockPublisher {
    states: Mutex<Vec<DeviceState>>,
    clears: AtomicUsize,
}

impl MockPublisher {
    /// Creates an empty publisher.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All captured states, in publish order.
    pub fn states(&self) -> Vec<DeviceState> {
        self.states.lock().unwrap().clone()
    }

    /// The most recent state for a device.
    pub fn last_for(&self, device: &str) -> Option<DeviceState> {
        self.states
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.name == device)
            .cloned()
    }

    /// How many times the dedup store was cleared.
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EdgePublisher for MockPublisher {
    async fn publish_device_state(&self, state: DeviceState) -> BrokerResult<()> {
        self.states.lock().unwrap().push(state);
        Ok(())
    }

    fn clear_published_state(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// DedupPublisher
// =============================================================================

/// A publisher with the real dedup/heartbeat behavior but no transport.
pub struct DedupPublisher {
    store: EdgeStateStore,
    heartbeat_interval: Duration,
    published: Mutex<Vec<DeviceState>>,
}

impl DedupPublisher {
    /// Creates the publisher; zero `heartbeat_interval` disables heartbeats.
    pub fn new(heartbeat_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            store: EdgeStateStore::new(),
            heartbeat_interval,
            published: Mutex::new(Vec::new()),
        })
    }

    /// States that actually went out (survived dedup).
    pub fn published(&self) -> Vec<DeviceState> {
        self.published.lock().unwrap().clone()
    }

    /// Count of emitted publishes for one device.
    pub fn publish_count_for(&self, device: &str) -> usize {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.name == device)
            .count()
    }
}

#[async_trait]
impl EdgePublisher for DedupPublisher {
    async fn publish_device_state(&self, state: DeviceState) -> BrokerResult<()> {
        if self.store.needs_publish(&state, self.heartbeat_interval) {
            self.published.lock().unwrap().push(state.clone());
            self.store.update(state);
        }
        Ok(())
    }

    fn clear_published_state(&self) {
        self.store.clear();
    }
}
