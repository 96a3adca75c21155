// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The immutable, `Arc`-shared spec graph the runtime holds.
//!
//! The raw [`EdgeConfig`](crate::schema::EdgeConfig) references things by
//! name (devices point at catalog keys and bus ids). Resolution replaces the
//! names with shared references: a [`DeviceSpec`] carries its bus and catalog
//! entry directly, so runtime code never performs map lookups on the hot
//! path. The graph is built once after validation and never mutated.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{BusConfig, CatalogDeviceSpec, EdgeConfig};

/// A validated bus definition.
pub type BusSpec = BusConfig;

/// A validated catalog entry.
pub type CatalogSpec = CatalogDeviceSpec;

/// One device with its bus and catalog entry resolved.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    /// Globally unique device name.
    pub name: String,

    /// Modbus unit id.
    pub unit_id: u8,

    /// Catalog type key this device was declared with.
    pub type_key: String,

    /// Extra per-device retries on top of the single transient retry.
    pub retry_count: u32,

    /// Verbose logging for this device.
    pub debug: bool,

    /// The bus this device hangs off.
    pub bus: Arc<BusSpec>,

    /// The device-type catalog entry.
    pub catalog: Arc<CatalogSpec>,
}

impl DeviceSpec {
    /// Settle gap before a request: first non-zero of catalog, then bus.
    pub fn settle_before_request(&self) -> Duration {
        first_non_zero(
            self.catalog.timings.settle_before_request(),
            self.bus.settle_before_request(),
        )
    }

    /// Settle gap after a write: first non-zero of catalog, then bus.
    pub fn settle_after_write(&self) -> Duration {
        first_non_zero(
            self.catalog.timings.settle_after_write(),
            self.bus.settle_after_write(),
        )
    }

    /// Per-request timeout: first non-zero of catalog, then bus.
    pub fn request_timeout(&self) -> Duration {
        first_non_zero(self.catalog.timings.timeout(), self.bus.timeout())
    }
}

/// Returns the first non-zero duration, or zero if both are zero.
fn first_non_zero(a: Duration, b: Duration) -> Duration {
    if !a.is_zero() {
        a
    } else {
        b
    }
}

/// One bus plus its devices, in declaration (poll) order.
#[derive(Debug, Clone)]
pub struct ResolvedBus {
    /// The bus definition.
    pub spec: Arc<BusSpec>,

    /// Devices on this bus, poll order.
    pub devices: Vec<Arc<DeviceSpec>>,
}

impl ResolvedBus {
    /// Effective poll cadence: bus override or the global interval.
    pub fn poll_period(&self, global_poll_interval: Duration) -> Duration {
        if self.spec.poll_interval_ms > 0 {
            Duration::from_millis(self.spec.poll_interval_ms)
        } else {
            global_poll_interval
        }
    }
}

/// The whole resolved configuration.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Buses in declaration order.
    pub buses: Vec<ResolvedBus>,

    /// Global poll cadence.
    pub poll_interval: Duration,

    /// Heartbeat interval; zero disables heartbeats.
    pub heartbeat_interval: Duration,
}

impl ResolvedConfig {
    /// Iterates over every device of every bus.
    pub fn all_devices(&self) -> impl Iterator<Item = &Arc<DeviceSpec>> {
        self.buses.iter().flat_map(|b| b.devices.iter())
    }
}

impl EdgeConfig {
    /// Builds the immutable spec graph from a validated configuration.
    ///
    /// Call [`validate`](EdgeConfig::validate) (or load through the loader)
    /// first; resolution trusts the catalog keys and bus ids to exist.
    pub fn resolve(&self) -> ConfigResult<ResolvedConfig> {
        let catalog: std::collections::HashMap<&str, Arc<CatalogSpec>> = self
            .catalog
            .iter()
            .map(|(k, v)| (k.as_str(), Arc::new(v.clone())))
            .collect();

        let mut buses = Vec::with_capacity(self.buses.len());
        for bus_config in &self.buses {
            let bus = Arc::new(bus_config.clone());

            let mut devices = Vec::new();
            if let Some(list) = self.devices.get(&bus.bus_id) {
                devices.reserve(list.len());
                for d in list {
                    let spec = catalog.get(d.device_type.as_str()).ok_or_else(|| {
                        ConfigError::Validation {
                            errors: vec![format!(
                                "devices[{}]: unknown catalog type {:?}",
                                bus.bus_id, d.device_type
                            )],
                        }
                    })?;

                    devices.push(Arc::new(DeviceSpec {
                        name: d.name.clone(),
                        unit_id: d.unit_id,
                        type_key: d.device_type.clone(),
                        retry_count: d.retry_count,
                        debug: d.debug,
                        bus: Arc::clone(&bus),
                        catalog: Arc::clone(spec),
                    }));
                }
            }

            buses.push(ResolvedBus { spec: bus, devices });
        }

        Ok(ResolvedConfig {
            buses,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval.max(0) as u64),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
