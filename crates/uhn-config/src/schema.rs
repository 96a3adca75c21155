// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Raw configuration schema with strict parsing and whole-document
//! validation.
//!
//! Every struct here mirrors one JSON object of the edge configuration.
//! Unknown fields are rejected at parse time; semantic rules are checked by
//! [`EdgeConfig::validate`], which collects every violation instead of
//! stopping at the first one.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigResult, ValidationErrors};

// =============================================================================
// EdgeConfig
// =============================================================================

/// Top-level edge configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EdgeConfig {
    /// Fieldbus definitions.
    pub buses: Vec<BusConfig>,

    /// Device-type catalog, keyed by type name.
    pub catalog: HashMap<String, CatalogDeviceSpec>,

    /// Devices per bus, keyed by `busId`. Order within a bus is poll order.
    pub devices: HashMap<String, Vec<DeviceConfig>>,

    /// Global poll cadence in milliseconds; buses may override.
    pub poll_interval_ms: u64,

    /// Heartbeat republish interval in seconds; 0 disables heartbeats.
    #[serde(default)]
    pub heartbeat_interval: i64,
}

impl EdgeConfig {
    /// Applies defaults and validates the whole document.
    ///
    /// Returns a [`ConfigError::Validation`](crate::ConfigError::Validation)
    /// listing every violated rule.
    pub fn validate(&mut self) -> ConfigResult<()> {
        let mut errs = ValidationErrors::new();

        self.validate_buses(&mut errs);
        self.validate_poll(&mut errs);
        self.validate_catalog(&mut errs);
        self.validate_devices(&mut errs);

        errs.into_result()
    }

    fn validate_buses(&mut self, errs: &mut ValidationErrors) {
        if self.buses.is_empty() {
            errs.add("buses cannot be empty");
            return;
        }

        let mut seen: HashMap<String, usize> = HashMap::new();
        for i in 0..self.buses.len() {
            let bus = &mut self.buses[i];

            if bus.bus_id.trim().is_empty() {
                errs.add(format!("buses[{}]: busId is required", i));
            } else if let Some(j) = seen.get(&bus.bus_id) {
                errs.add(format!(
                    "buses[{}]: duplicate busId {:?} (also at buses[{}])",
                    i, bus.bus_id, j
                ));
            } else {
                seen.insert(bus.bus_id.clone(), i);
            }

            match bus.bus_type {
                BusType::Tcp => {
                    if bus.tcp_addr.trim().is_empty() {
                        errs.add(format!(
                            "buses[{}/{}]: tcpAddr is required for type=tcp",
                            i, bus.bus_id
                        ));
                    }
                }
                BusType::Rtu => {
                    if bus.port.trim().is_empty() {
                        errs.add(format!(
                            "buses[{}/{}]: port is required for type=rtu",
                            i, bus.bus_id
                        ));
                    }
                    if bus.baud == 0 {
                        errs.add(format!(
                            "buses[{}/{}]: baud must be > 0 for type=rtu",
                            i, bus.bus_id
                        ));
                    }
                    if bus.data_bits == 0 {
                        bus.data_bits = 8;
                    }
                    if bus.stop_bits == 0 {
                        bus.stop_bits = 1;
                    }
                    if bus.parity.is_empty() {
                        bus.parity = "N".to_string();
                    }
                    if !matches!(bus.parity.to_uppercase().as_str(), "N" | "E" | "O") {
                        errs.add(format!(
                            "buses[{}/{}]: parity must be one of N,E,O",
                            i, bus.bus_id
                        ));
                    }
                }
            }

            if bus.timeout_ms <= 0 {
                bus.timeout_ms = 150;
            }
            if bus.settle_before_request_ms < 0 || bus.settle_after_write_ms < 0 {
                errs.add(format!(
                    "buses[{}/{}]: settle timings cannot be negative",
                    i, bus.bus_id
                ));
            }
            if bus.command_buffer_size == 0 {
                bus.command_buffer_size = 8;
            }
        }
    }

    fn validate_poll(&mut self, errs: &mut ValidationErrors) {
        if self.poll_interval_ms == 0 {
            errs.add("pollIntervalMs must be > 0 (e.g., 100)");
        }
        if self.heartbeat_interval < 0 {
            self.heartbeat_interval = 60;
        }
        if self.heartbeat_interval == 0 {
            tracing::warn!("heartbeatInterval=0 configured, heartbeats disabled");
        }
    }

    fn validate_catalog(&self, errs: &mut ValidationErrors) {
        if self.catalog.is_empty() {
            errs.add("catalog cannot be empty");
            return;
        }

        for (key, spec) in &self.catalog {
            if spec.vendor.is_empty() || spec.model.is_empty() {
                errs.add(format!("catalog[{}]: vendor and model are required", key));
            }

            for (bank, range) in [
                ("digitalOutputs", &spec.digital_outputs),
                ("digitalInputs", &spec.digital_inputs),
                ("analogOutputs", &spec.analog_outputs),
                ("analogInputs", &spec.analog_inputs),
            ] {
                if let Some(r) = range {
                    if r.count == 0 {
                        errs.add(format!("catalog[{}].{}.count must be > 0", key, bank));
                    }
                }
            }

            let lim = &spec.limits;
            if lim.max_coils_per_read <= 0 || lim.max_coils_per_read > 2000 {
                errs.add(format!(
                    "catalog[{}].limits.maxCoilsPerRead must be 1..2000",
                    key
                ));
            }
            if lim.max_inputs_per_read <= 0 || lim.max_inputs_per_read > 2000 {
                errs.add(format!(
                    "catalog[{}].limits.maxInputsPerRead must be 1..2000",
                    key
                ));
            }
            if lim.max_registers_per_read <= 0 || lim.max_registers_per_read > 125 {
                errs.add(format!(
                    "catalog[{}].limits.maxRegistersPerRead must be 1..125",
                    key
                ));
            }

            if spec.timings.settle_before_request_ms < 0 || spec.timings.settle_after_write_ms < 0 {
                errs.add(format!(
                    "catalog[{}].settle timings values cannot be negative",
                    key
                ));
            }
        }
    }

    fn validate_devices(&self, errs: &mut ValidationErrors) {
        if self.devices.is_empty() {
            errs.add("devices cannot be empty");
            return;
        }

        let bus_ids: Vec<&str> = self.buses.iter().map(|b| b.bus_id.as_str()).collect();
        for bus_id in self.devices.keys() {
            if !bus_ids.contains(&bus_id.as_str()) {
                errs.add(format!("devices[{}]: busId not defined in buses[*].busId", bus_id));
            }
        }

        // Device names are unique across ALL buses.
        let mut seen_names: HashMap<&str, &str> = HashMap::new();
        for (bus_id, list) in &self.devices {
            for (i, device) in list.iter().enumerate() {
                if device.name.trim().is_empty() {
                    errs.add(format!("devices[{}][{}]: name is required", bus_id, i));
                } else if let Some(other_bus) = seen_names.get(device.name.as_str()) {
                    errs.add(format!(
                        "devices[{}][{}/{}]: duplicate device name (already in bus {})",
                        bus_id, i, device.name, other_bus
                    ));
                } else {
                    seen_names.insert(device.name.as_str(), bus_id.as_str());
                }

                if device.unit_id == 0 || device.unit_id > 247 {
                    errs.add(format!(
                        "devices[{}][{}/{}]: unitId must be 1..247",
                        bus_id, i, device.name
                    ));
                }

                if device.device_type.is_empty() {
                    errs.add(format!(
                        "devices[{}][{}/{}]: type is required",
                        bus_id, i, device.name
                    ));
                } else if !self.catalog.contains_key(&device.device_type) {
                    errs.add(format!(
                        "devices[{}][{}/{}]: unknown catalog type {:?}",
                        bus_id, i, device.name, device.device_type
                    ));
                }
            }
        }
    }
}

// =============================================================================
// BusConfig
// =============================================================================

/// Transport kind of a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusType {
    /// Modbus RTU over a serial line.
    Rtu,
    /// Modbus TCP.
    Tcp,
}

/// One fieldbus: transport parameters, pacing, and queue sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BusConfig {
    /// Unique bus identifier.
    pub bus_id: String,

    /// Transport kind.
    #[serde(rename = "type")]
    pub bus_type: BusType,

    /// `host:port` for TCP buses.
    #[serde(default)]
    pub tcp_addr: String,

    /// Serial port path for RTU buses.
    #[serde(default)]
    pub port: String,

    /// Baud rate for RTU buses.
    #[serde(default)]
    pub baud: u32,

    /// Serial data bits; defaults to 8.
    #[serde(default)]
    pub data_bits: u8,

    /// Serial stop bits; defaults to 1.
    #[serde(default)]
    pub stop_bits: u8,

    /// Serial parity, one of `N`, `E`, `O`; defaults to `N`.
    #[serde(default)]
    pub parity: String,

    /// Per-request I/O timeout in milliseconds; defaults to 150.
    #[serde(default)]
    pub timeout_ms: i64,

    /// Quiet gap before each request, milliseconds.
    #[serde(default)]
    pub settle_before_request_ms: i64,

    /// Quiet gap after each write, milliseconds.
    #[serde(default)]
    pub settle_after_write_ms: i64,

    /// Per-bus override of the global poll cadence; 0 means use the global.
    #[serde(default)]
    pub poll_interval_ms: u64,

    /// Capacity of the bus command queue; defaults to 8.
    #[serde(default)]
    pub command_buffer_size: usize,

    /// Enables transport-level debug logging for this bus.
    #[serde(default)]
    pub debug: bool,
}

impl BusConfig {
    /// Per-request I/O timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(0) as u64)
    }

    /// Quiet gap before each request.
    pub fn settle_before_request(&self) -> Duration {
        Duration::from_millis(self.settle_before_request_ms.max(0) as u64)
    }

    /// Quiet gap after each write.
    pub fn settle_after_write(&self) -> Duration {
        Duration::from_millis(self.settle_after_write_ms.max(0) as u64)
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Contiguous address window `[start, start+count)` within a bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Range {
    /// First address of the window.
    pub start: u16,
    /// Number of addresses in the window.
    pub count: u16,
}

/// Per-request size caps for a device type, in bits / registers.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CatalogLimits {
    /// Maximum coils per FC1 request (1..=2000).
    #[serde(default)]
    pub max_coils_per_read: i64,
    /// Maximum discrete inputs per FC2 request (1..=2000).
    #[serde(default)]
    pub max_inputs_per_read: i64,
    /// Maximum registers per FC3/FC4 request (1..=125).
    #[serde(default)]
    pub max_registers_per_read: i64,
}

/// Per-device-type timing overrides; 0 falls back to the bus setting.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CatalogTimings {
    /// Per-request I/O timeout override, milliseconds.
    #[serde(default)]
    pub timeout_ms: i64,
    /// Settle gap override before each request, milliseconds.
    #[serde(default)]
    pub settle_before_request_ms: i64,
    /// Settle gap override after each write, milliseconds.
    #[serde(default)]
    pub settle_after_write_ms: i64,
}

impl CatalogTimings {
    /// Per-request timeout override, zero when unset.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(0) as u64)
    }

    /// Settle-before override, zero when unset.
    pub fn settle_before_request(&self) -> Duration {
        Duration::from_millis(self.settle_before_request_ms.max(0) as u64)
    }

    /// Settle-after-write override, zero when unset.
    pub fn settle_after_write(&self) -> Duration {
        Duration::from_millis(self.settle_after_write_ms.max(0) as u64)
    }
}

/// Transport quirks a device type supports.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CatalogCapabilities {
    /// Magic FC5 word the device interprets as "toggle this coil";
    /// 0 means the capability is absent and toggles are emulated by a
    /// read-then-complement sequence.
    #[serde(default)]
    pub toggle_word: u16,
}

/// One device type: bank windows, chunking limits, timings, capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CatalogDeviceSpec {
    /// Manufacturer name (informational, required).
    pub vendor: String,

    /// Model name (informational, required).
    pub model: String,

    /// Coil window (FC1), if the type has digital outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_outputs: Option<Range>,

    /// Discrete-input window (FC2), if the type has digital inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_inputs: Option<Range>,

    /// Holding-register window (FC3), if the type has analog outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analog_outputs: Option<Range>,

    /// Input-register window (FC4), if the type has analog inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analog_inputs: Option<Range>,

    /// Chunking limits; required, bounded by the Modbus spec.
    pub limits: CatalogLimits,

    /// Timing overrides.
    #[serde(default)]
    pub timings: CatalogTimings,

    /// Device capabilities.
    #[serde(default)]
    pub capabilities: CatalogCapabilities,

    /// Enables verbose logging for devices of this type.
    #[serde(default)]
    pub debug: bool,
}

// =============================================================================
// DeviceConfig
// =============================================================================

/// One Modbus slave on a bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeviceConfig {
    /// Device name, globally unique across all buses.
    pub name: String,

    /// Modbus unit id (1..=247).
    pub unit_id: u8,

    /// Catalog type key.
    #[serde(rename = "type")]
    pub device_type: String,

    /// Extra per-device retries on top of the client's single transient retry.
    #[serde(default)]
    pub retry_count: u32,

    /// Enables verbose logging for this device.
    #[serde(default)]
    pub debug: bool,
}

// =============================================================================
// Tests
// =============================================================================
