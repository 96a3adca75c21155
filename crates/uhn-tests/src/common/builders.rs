// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Fluent builders for spec fixtures.
//!
//! Defaults are chosen so a test only states what it cares about: an RTU bus
//! at 19200 baud with zero settle gaps, a catalog with no banks, a device at
//! unit 1.

use std::sync::Arc;

use uhn_config::{
    BusConfig, BusSpec, BusType, CatalogCapabilities, CatalogDeviceSpec, CatalogLimits,
    CatalogSpec, CatalogTimings, DeviceSpec, Range,
};

// =============================================================================
// BusSpecBuilder
// =============================================================================

/// Builds an [`Arc<BusSpec>`] with sensible test defaults.
pub struct BusSpecBuilder {
    spec: BusConfig,
}

impl BusSpecBuilder {
    /// An RTU bus named `bus_id`.
    pub fn rtu(bus_id: &str) -> Self {
        Self {
            spec: BusConfig {
                bus_id: bus_id.to_string(),
                bus_type: BusType::Rtu,
                tcp_addr: String::new(),
                port: "/dev/ttyUSB0".to_string(),
                baud: 19200,
                data_bits: 8,
                stop_bits: 1,
                parity: "N".to_string(),
                timeout_ms: 150,
                settle_before_request_ms: 0,
                settle_after_write_ms: 0,
                poll_interval_ms: 0,
                command_buffer_size: 8,
                debug: false,
            },
        }
    }

    /// A TCP bus named `bus_id`.
    pub fn tcp(bus_id: &str, addr: &str) -> Self {
        let mut builder = Self::rtu(bus_id);
        builder.spec.bus_type = BusType::Tcp;
        builder.spec.tcp_addr = addr.to_string();
        builder.spec.port.clear();
        builder.spec.baud = 0;
        builder
    }

    /// Sets the command buffer capacity.
    pub fn command_buffer_size(mut self, size: usize) -> Self {
        self.spec.command_buffer_size = size;
        self
    }

    /// Sets the settle gap before requests, milliseconds.
    pub fn settle_before_request_ms(mut self, ms: i64) -> Self {
        self.spec.settle_before_request_ms = ms;
        self
    }

    /// Finishes the bus spec.
    pub fn build(self) -> Arc<BusSpec> {
        Arc::new(self.spec)
    }
}

// =============================================================================
// CatalogSpecBuilder
// =============================================================================

/// Builds an [`Arc<CatalogSpec>`].
pub struct CatalogSpecBuilder {
    spec: CatalogDeviceSpec,
}

impl CatalogSpecBuilder {
    /// A catalog entry with no banks and generous chunk limits.
    pub fn new() -> Self {
        Self {
            spec: CatalogDeviceSpec {
                vendor: "acme".to_string(),
                model: "TEST".to_string(),
                digital_outputs: None,
                digital_inputs: None,
                analog_outputs: None,
                analog_inputs: None,
                limits: CatalogLimits {
                    max_coils_per_read: 16,
                    max_inputs_per_read: 16,
                    max_registers_per_read: 8,
                },
                timings: CatalogTimings::default(),
                capabilities: CatalogCapabilities::default(),
                debug: false,
            },
        }
    }

    /// Declares the coil bank.
    pub fn digital_outputs(mut self, start: u16, count: u16) -> Self {
        self.spec.digital_outputs = Some(Range { start, count });
        self
    }

    /// Declares the discrete-input bank.
    pub fn digital_inputs(mut self, start: u16, count: u16) -> Self {
        self.spec.digital_inputs = Some(Range { start, count });
        self
    }

    /// Declares the holding-register bank.
    pub fn analog_outputs(mut self, start: u16, count: u16) -> Self {
        self.spec.analog_outputs = Some(Range { start, count });
        self
    }

    /// Declares the input-register bank.
    pub fn analog_inputs(mut self, start: u16, count: u16) -> Self {
        self.spec.analog_inputs = Some(Range { start, count });
        self
    }

    /// Declares the toggle capability word.
    pub fn toggle_word(mut self, word: u16) -> Self {
        self.spec.capabilities.toggle_word = word;
        self
    }

    /// Finishes the catalog spec.
    pub fn build(self) -> Arc<CatalogSpec> {
        Arc::new(self.spec)
    }
}

impl Default for CatalogSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// DeviceSpecBuilder
// =============================================================================

/// Builds an [`Arc<DeviceSpec>`] bound to a bus and catalog entry.
pub struct DeviceSpecBuilder {
    spec: DeviceSpec,
}

impl DeviceSpecBuilder {
    /// A device named `name` on `bus` with catalog entry `catalog`.
    pub fn new(name: &str, bus: Arc<BusSpec>, catalog: Arc<CatalogSpec>) -> Self {
        Self {
            spec: DeviceSpec {
                name: name.to_string(),
                unit_id: 1,
                type_key: "test-type".to_string(),
                retry_count: 0,
                debug: false,
                bus,
                catalog,
            },
        }
    }

    /// Sets the unit id.
    pub fn unit_id(mut self, unit_id: u8) -> Self {
        self.spec.unit_id = unit_id;
        self
    }

    /// Finishes the device spec.
    pub fn build(self) -> Arc<DeviceSpec> {
        Arc::new(self.spec)
    }
}
