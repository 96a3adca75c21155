// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The per-bus event loop.
//!
//! `BusPoller::run` owns the device client for its bus and multiplexes
//! three inputs with fixed priority: cancellation, queued commands, and the
//! poll signal. The poll ticker lives on a side task and feeds a single-slot
//! channel with drop-if-full semantics, so at most one poll can ever be
//! pending even when polling overruns the cadence.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use uhn_config::{BusSpec, DeviceSpec, Range};
use uhn_core::traits::EdgePublisher;
use uhn_core::types::{DeviceState, DeviceStatus};

use crate::client::DeviceClient;
use crate::command::DeviceCommand;
use crate::scheduler::CommandScheduler;

// =============================================================================
// BusPoller
// =============================================================================

/// Polls every device of one bus and executes its commands, sequentially.
pub struct BusPoller {
    bus: Arc<BusSpec>,
    devices: Vec<Arc<DeviceSpec>>,
    poll_period: Duration,
    client: Box<dyn DeviceClient>,
    scheduler: CommandScheduler,
    publisher: Arc<dyn EdgePublisher>,
    cmd_tx: mpsc::Sender<DeviceCommand>,
    cmd_rx: mpsc::Receiver<DeviceCommand>,
    poll_tx: mpsc::Sender<()>,
    poll_rx: mpsc::Receiver<()>,
}

impl BusPoller {
    /// Creates a poller for `bus` over the given client.
    pub fn new(
        bus: Arc<BusSpec>,
        devices: Vec<Arc<DeviceSpec>>,
        poll_period: Duration,
        client: Box<dyn DeviceClient>,
        publisher: Arc<dyn EdgePublisher>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(bus.command_buffer_size.max(1));
        // Single slot: a pending poll signal absorbs all further ticks.
        let (poll_tx, poll_rx) = mpsc::channel(1);
        let scheduler = CommandScheduler::new(cmd_tx.clone());

        Self {
            bus,
            devices,
            poll_period,
            client,
            scheduler,
            publisher,
            cmd_tx,
            cmd_rx,
            poll_tx,
            poll_rx,
        }
    }

    /// The bus this poller serves.
    pub fn bus(&self) -> &Arc<BusSpec> {
        &self.bus
    }

    /// Devices on this bus, poll order.
    pub fn devices(&self) -> &[Arc<DeviceSpec>] {
        &self.devices
    }

    /// A handle for non-blocking command enqueueing.
    ///
    /// `try_send` on this handle returns an error when the bounded buffer is
    /// full; the caller decides whether that is worth a warning.
    pub fn command_sender(&self) -> mpsc::Sender<DeviceCommand> {
        self.cmd_tx.clone()
    }

    /// Runs the poller until `cancel` fires, then releases the scheduler and
    /// the device client.
    pub async fn run(mut self, cancel: CancellationToken) {
        let ticker = self.spawn_ticker(cancel.clone());

        let address = match self.bus.bus_type {
            uhn_config::BusType::Rtu => self.bus.port.clone(),
            uhn_config::BusType::Tcp => self.bus.tcp_addr.clone(),
        };
        info!(
            bus = %self.bus.bus_id,
            address = %address,
            poll_ms = self.poll_period.as_millis() as u64,
            devices = self.devices.len(),
            "BusPoller started"
        );

        loop {
            tokio::select! {
                // Priority: cancellation, then commands, then the poll tick.
                // Commands never starve polls because each loop turn services
                // exactly one input and the poll slot stays set meanwhile.
                biased;

                _ = cancel.cancelled() => {
                    debug!(bus = %self.bus.bus_id, "BusPoller cancellation received");
                    break;
                }
                Some(cmd) = self.cmd_rx.recv() => {
                    self.handle_command(&cancel, cmd).await;
                }
                Some(()) = self.poll_rx.recv() => {
                    self.poll_once(&cancel).await;
                }
            }
        }

        ticker.abort();
        self.scheduler.stop();
        self.client.close().await;
        info!(bus = %self.bus.bus_id, "BusPoller stopped");
    }

    fn spawn_ticker(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let poll_tx = self.poll_tx.clone();
        let period = self.poll_period;
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticks = tokio::time::interval_at(start, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticks.tick() => {
                        // Drop the signal if one is already queued.
                        let _ = poll_tx.try_send(());
                    }
                }
            }
        })
    }

    // =========================================================================
    // Polling
    // =========================================================================

    async fn poll_once(&mut self, cancel: &CancellationToken) {
        let devices = self.devices.clone();
        for device in devices {
            if cancel.is_cancelled() {
                return;
            }

            let (ok, state) = self.try_poll_device(cancel, &device).await;
            if !ok {
                warn!(
                    bus = %self.bus.bus_id,
                    device = %device.name,
                    errors = ?state.errors,
                    "Poll failed"
                );
            }

            if let Err(e) = self.publisher.publish_device_state(state).await {
                warn!(
                    bus = %self.bus.bus_id,
                    device = %device.name,
                    error = %e,
                    "Failed to publish state"
                );
            }
        }
    }

    async fn try_poll_device(
        &mut self,
        cancel: &CancellationToken,
        device: &Arc<DeviceSpec>,
    ) -> (bool, DeviceState) {
        let mut state = DeviceState::now(&device.name);
        let mut successful_reads = 0u32;
        let mut failed_reads = 0u32;

        if declared(device.catalog.digital_outputs) {
            match self.client.read_device_digital_output(cancel, device).await {
                Ok(data) => {
                    state.digital_outputs = Some(data);
                    successful_reads += 1;
                }
                Err(e) => {
                    error!(bus = %self.bus.bus_id, device = %device.name, error = %e,
                        "Error reading digital outputs");
                    state.errors.push(format!("digitalOutputs: {}", e));
                    failed_reads += 1;
                }
            }
        }

        if declared(device.catalog.digital_inputs) {
            match self.client.read_device_digital_input(cancel, device).await {
                Ok(data) => {
                    state.digital_inputs = Some(data);
                    successful_reads += 1;
                }
                Err(e) => {
                    error!(bus = %self.bus.bus_id, device = %device.name, error = %e,
                        "Error reading digital inputs");
                    state.errors.push(format!("digitalInputs: {}", e));
                    failed_reads += 1;
                }
            }
        }

        if declared(device.catalog.analog_outputs) {
            match self.client.read_device_analog_output(cancel, device).await {
                Ok(data) => {
                    state.analog_outputs = Some(data);
                    successful_reads += 1;
                }
                Err(e) => {
                    error!(bus = %self.bus.bus_id, device = %device.name, error = %e,
                        "Error reading analog outputs");
                    state.errors.push(format!("analogOutputs: {}", e));
                    failed_reads += 1;
                }
            }
        }

        if declared(device.catalog.analog_inputs) {
            match self.client.read_device_analog_input(cancel, device).await {
                Ok(data) => {
                    state.analog_inputs = Some(data);
                    successful_reads += 1;
                }
                Err(e) => {
                    error!(bus = %self.bus.bus_id, device = %device.name, error = %e,
                        "Error reading analog inputs");
                    state.errors.push(format!("analogInputs: {}", e));
                    failed_reads += 1;
                }
            }
        }

        state.status = DeviceStatus::from_counts(successful_reads, failed_reads);
        (successful_reads > 0, state)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    async fn handle_command(&mut self, cancel: &CancellationToken, cmd: DeviceCommand) {
        match cmd.action.to_lowercase().as_str() {
            "setdigitaloutput" => self.handle_set_digital_output(cancel, cmd).await,
            other => {
                warn!(bus = %self.bus.bus_id, action = %other, "Unknown command action");
            }
        }
    }

    async fn handle_set_digital_output(&mut self, cancel: &CancellationToken, cmd: DeviceCommand) {
        match cmd.value {
            0 | 1 => {
                let value = cmd.value == 1;
                self.scheduler.clear_pulse(&cmd);

                if let Err(e) = self
                    .client
                    .write_single_digital_output(cancel, &cmd.device, cmd.address, value)
                    .await
                {
                    error!(
                        bus = %self.bus.bus_id,
                        device = %cmd.device.name,
                        address = cmd.address,
                        error = %e,
                        "Coil write failed"
                    );
                }

                if cmd.pulse_ms > 0 {
                    let mut revert = cmd.clone();
                    revert.value = cmd.revert_value();
                    revert.pulse_ms = 0;
                    self.scheduler
                        .schedule_pulse(revert, Duration::from_millis(cmd.pulse_ms));
                }
            }
            2 => {
                self.scheduler.clear_pulse(&cmd);

                if let Err(e) = self
                    .client
                    .toggle_single_digital_output(cancel, &cmd.device, cmd.address)
                    .await
                {
                    error!(
                        bus = %self.bus.bus_id,
                        device = %cmd.device.name,
                        address = cmd.address,
                        error = %e,
                        "Coil toggle failed"
                    );
                }

                if cmd.pulse_ms > 0 {
                    // The revert of a toggle is a second toggle.
                    let mut revert = cmd.clone();
                    revert.pulse_ms = 0;
                    self.scheduler
                        .schedule_pulse(revert, Duration::from_millis(cmd.pulse_ms));
                }
            }
            other => {
                warn!(
                    bus = %self.bus.bus_id,
                    device = %cmd.device.name,
                    value = other,
                    "Unsupported setDigitalOutput value"
                );
            }
        }
    }
}

fn declared(range: Option<Range>) -> bool {
    range.map(|r| r.count > 0).unwrap_or(false)
}

impl std::fmt::Debug for BusPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusPoller")
            .field("bus", &self.bus.bus_id)
            .field("devices", &self.devices.len())
            .field("poll_period", &self.poll_period)
            .finish()
    }
}
