// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus RTU transport over a serial line.
//!
//! Wraps `tokio-serial` + `tokio-modbus`. Serial parameters come from the
//! bus configuration; the per-request timeout starts at the bus default and
//! is adjusted per device by the client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_modbus::prelude::*;
use tokio_serial::{
    DataBits as SerialDataBits, Parity as SerialParity, SerialPortBuilderExt,
    StopBits as SerialStopBits,
};

use uhn_config::BusSpec;
use uhn_core::error::{ClientError, ClientResult};

use crate::transport::{BusTransport, ContextOps};

// =============================================================================
// RtuTransport
// =============================================================================

/// Modbus RTU transport for one serial bus.
pub struct RtuTransport {
    bus: Arc<BusSpec>,
    ops: ContextOps,
}

impl RtuTransport {
    /// Creates a disconnected RTU transport from the bus definition.
    pub fn new(bus: Arc<BusSpec>) -> Self {
        let timeout = bus.timeout();
        Self {
            bus,
            ops: ContextOps::new(timeout),
        }
    }

    fn serial_data_bits(&self) -> SerialDataBits {
        match self.bus.data_bits {
            5 => SerialDataBits::Five,
            6 => SerialDataBits::Six,
            7 => SerialDataBits::Seven,
            _ => SerialDataBits::Eight,
        }
    }

    fn serial_parity(&self) -> SerialParity {
        match self.bus.parity.to_uppercase().as_str() {
            "E" => SerialParity::Even,
            "O" => SerialParity::Odd,
            _ => SerialParity::None,
        }
    }

    fn serial_stop_bits(&self) -> SerialStopBits {
        match self.bus.stop_bits {
            2 => SerialStopBits::Two,
            _ => SerialStopBits::One,
        }
    }
}

#[async_trait]
impl BusTransport for RtuTransport {
    async fn connect(&mut self) -> ClientResult<()> {
        if self.ops.is_connected() {
            return Ok(());
        }

        let builder = tokio_serial::new(&self.bus.port, self.bus.baud)
            .data_bits(self.serial_data_bits())
            .parity(self.serial_parity())
            .stop_bits(self.serial_stop_bits());

        let serial = builder.open_native_async().map_err(|e| {
            ClientError::connect(format!("open serial port {}: {}", self.bus.port, e))
        })?;

        let ctx = rtu::attach_slave(serial, Slave(1));
        self.ops.attach(ctx);

        tracing::info!(
            bus = %self.bus.bus_id,
            port = %self.bus.port,
            baud = self.bus.baud,
            "Connected to Modbus RTU bus"
        );

        Ok(())
    }

    async fn disconnect(&mut self) -> ClientResult<()> {
        self.ops.detach().await;
        tracing::debug!(bus = %self.bus.bus_id, port = %self.bus.port, "Disconnected RTU bus");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.ops.is_connected()
    }

    fn select_slave(&mut self, unit_id: u8) {
        self.ops.select_slave(unit_id);
    }

    fn set_request_timeout(&mut self, timeout: Duration) {
        self.ops.request_timeout = timeout;
    }

    async fn read_coils(&mut self, address: u16, count: u16) -> ClientResult<Vec<bool>> {
        self.ops.read_coils(address, count).await
    }

    async fn read_discrete_inputs(&mut self, address: u16, count: u16) -> ClientResult<Vec<bool>> {
        self.ops.read_discrete_inputs(address, count).await
    }

    async fn read_holding_registers(&mut self, address: u16, count: u16) -> ClientResult<Vec<u16>> {
        self.ops.read_holding_registers(address, count).await
    }

    async fn read_input_registers(&mut self, address: u16, count: u16) -> ClientResult<Vec<u16>> {
        self.ops.read_input_registers(address, count).await
    }

    async fn write_single_coil(&mut self, address: u16, value: bool) -> ClientResult<()> {
        self.ops.write_single_coil(address, value).await
    }

    async fn write_coil_word(&mut self, address: u16, word: u16) -> ClientResult<()> {
        self.ops.write_coil_word(address, word).await
    }

    fn display_name(&self) -> String {
        format!(
            "rtu {} @{}bps ({}{}{})",
            self.bus.port, self.bus.baud, self.bus.data_bits, self.bus.parity, self.bus.stop_bits
        )
    }
}

impl std::fmt::Debug for RtuTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtuTransport")
            .field("bus", &self.bus.bus_id)
            .field("port", &self.bus.port)
            .field("connected", &self.ops.is_connected())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uhn_config::{BusConfig, BusType};

    fn rtu_bus() -> Arc<BusSpec> {
        Arc::new(BusConfig {
            bus_id: "bus1".to_string(),
            bus_type: BusType::Rtu,
            tcp_addr: String::new(),
            port: "/dev/ttyUSB0".to_string(),
            baud: 19200,
            data_bits: 8,
            stop_bits: 1,
            parity: "E".to_string(),
            timeout_ms: 150,
            settle_before_request_ms: 0,
            settle_after_write_ms: 0,
            poll_interval_ms: 0,
            command_buffer_size: 8,
            debug: false,
        })
    }

    #[test]
    fn test_serial_parameter_mapping() {
        let transport = RtuTransport::new(rtu_bus());
        assert!(matches!(transport.serial_data_bits(), SerialDataBits::Eight));
        assert!(matches!(transport.serial_parity(), SerialParity::Even));
        assert!(matches!(transport.serial_stop_bits(), SerialStopBits::One));
    }

    #[test]
    fn test_display_name() {
        let transport = RtuTransport::new(rtu_bus());
        assert_eq!(transport.display_name(), "rtu /dev/ttyUSB0 @19200bps (8E1)");
    }

    #[test]
    fn test_starts_disconnected() {
        let transport = RtuTransport::new(rtu_bus());
        assert!(!transport.is_connected());
    }
}
