// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The bus-pollers registry.
//!
//! Owns every [`BusPoller`], fans out start/stop, resolves device names to
//! their owning bus, and implements the command plane: device commands are
//! coerced from their loose wire shape and enqueued on the owning bus's
//! bounded channel, and the global `resync` action clears the northbound
//! publish-dedup store.

use std::sync::Mutex;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use uhn_config::{DeviceSpec, ResolvedConfig};
use uhn_core::error::{CommandError, CommandResult};
use uhn_core::traits::{EdgePublisher, EdgeSubscriber};
use uhn_core::types::{coerce_u16, coerce_u64, IncomingCommand, IncomingDeviceCommand};
use uhn_modbus::ModbusDeviceClient;

use crate::command::DeviceCommand;
use crate::poller::BusPoller;

// =============================================================================
// BusPollers
// =============================================================================

struct PollerHandle {
    bus_id: String,
    devices: Vec<Arc<DeviceSpec>>,
    cmd_tx: mpsc::Sender<DeviceCommand>,
}

/// Registry of all bus pollers plus the command-plane entry points.
pub struct BusPollers {
    handles: Vec<PollerHandle>,
    pending: Mutex<Vec<BusPoller>>,
    running: Mutex<Vec<JoinHandle<()>>>,
    publisher: Arc<dyn EdgePublisher>,
}

impl BusPollers {
    /// Builds one poller per configured bus with a real Modbus client.
    pub fn new(config: &ResolvedConfig, publisher: Arc<dyn EdgePublisher>) -> Self {
        let pollers = config
            .buses
            .iter()
            .map(|bus| {
                let client = Box::new(ModbusDeviceClient::for_bus(Arc::clone(&bus.spec)));
                BusPoller::new(
                    Arc::clone(&bus.spec),
                    bus.devices.clone(),
                    bus.poll_period(config.poll_interval),
                    client,
                    Arc::clone(&publisher),
                )
            })
            .collect();

        Self::with_pollers(pollers, publisher)
    }

    /// Builds the registry from pre-constructed pollers (tests, simulators).
    pub fn with_pollers(pollers: Vec<BusPoller>, publisher: Arc<dyn EdgePublisher>) -> Self {
        let handles = pollers
            .iter()
            .map(|p| PollerHandle {
                bus_id: p.bus().bus_id.clone(),
                devices: p.devices().to_vec(),
                cmd_tx: p.command_sender(),
            })
            .collect();

        Self {
            handles,
            pending: Mutex::new(pollers),
            running: Mutex::new(Vec::new()),
            publisher,
        }
    }

    /// Spawns every poller onto the runtime, bound to `cancel`.
    pub fn start_all(&self, cancel: &CancellationToken) {
        let pollers: Vec<BusPoller> = self
            .pending
            .lock()
            .expect("poller registry lock poisoned")
            .drain(..)
            .collect();

        let mut running = self.running.lock().expect("poller registry lock poisoned");
        for poller in pollers {
            let token = cancel.clone();
            running.push(tokio::spawn(poller.run(token)));
        }
        info!(buses = running.len(), "All bus pollers started");
    }

    /// Waits for every started poller to finish its shutdown sequence.
    ///
    /// Call after cancelling the token passed to [`start_all`](Self::start_all).
    pub async fn stop_all(&self) {
        let joins: Vec<JoinHandle<()>> = {
            let mut running = self.running.lock().expect("poller registry lock poisoned");
            running.drain(..).collect()
        };
        for join in joins {
            if let Err(e) = join.await {
                warn!(error = %e, "bus poller task ended abnormally");
            }
        }
        info!("All bus pollers stopped");
    }

    /// Resolves a device name to its owning bus and spec.
    pub fn find_poller_and_device_by_device_name(
        &self,
        device_name: &str,
    ) -> Option<(&str, mpsc::Sender<DeviceCommand>, Arc<DeviceSpec>)> {
        for handle in &self.handles {
            for device in &handle.devices {
                if device.name == device_name {
                    return Some((
                        handle.bus_id.as_str(),
                        handle.cmd_tx.clone(),
                        Arc::clone(device),
                    ));
                }
            }
        }
        None
    }

    /// Number of registered buses.
    pub fn bus_count(&self) -> usize {
        self.handles.len()
    }
}

// =============================================================================
// Command plane
// =============================================================================

#[async_trait]
impl EdgeSubscriber for BusPollers {
    async fn on_device_command(&self, command: IncomingDeviceCommand) -> CommandResult<()> {
        let Some((bus_id, cmd_tx, device)) =
            self.find_poller_and_device_by_device_name(&command.device)
        else {
            return Err(CommandError::device_not_found(&command.device));
        };

        debug!(
            bus = %bus_id,
            device = %command.device,
            action = %command.action,
            "Received device command"
        );

        let cmd = DeviceCommand {
            id: command.id,
            device,
            action: command.action,
            address: coerce_u16(&command.address),
            value: coerce_u16(&command.value),
            pulse_ms: coerce_u64(&command.pulse_ms),
        };

        cmd_tx
            .try_send(cmd)
            .map_err(|_| CommandError::queue_full(&command.device))
    }

    async fn on_command(&self, command: IncomingCommand) -> CommandResult<()> {
        if command.action == "resync" {
            info!("Received resync command");
            self.publisher.clear_published_state();
        }
        Ok(())
    }
}

impl std::fmt::Debug for BusPollers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusPollers")
            .field("buses", &self.handles.len())
            .finish()
    }
}
