// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The device-client seam of the bus poller.
//!
//! The trait is defined here, on the consumer side: the poller cares about
//! bank reads and single-coil writes, not about transports or backoff. The
//! production implementation is [`ModbusDeviceClient`]; tests substitute
//! scripted mocks.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use uhn_config::DeviceSpec;
use uhn_core::error::ClientResult;
use uhn_modbus::ModbusDeviceClient;

/// Everything the bus poller needs from a Modbus client.
#[async_trait]
pub trait DeviceClient: Send {
    /// Idempotently establishes the bus transport.
    async fn ensure_connected(&mut self, cancel: &CancellationToken) -> ClientResult<()>;

    /// Releases the bus transport.
    async fn close(&mut self);

    /// Reads one coil.
    async fn read_single_digital_output(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
        address: u16,
    ) -> ClientResult<bool>;

    /// Reads one discrete input.
    async fn read_single_digital_input(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
        address: u16,
    ) -> ClientResult<bool>;

    /// Writes one coil.
    async fn write_single_digital_output(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
        address: u16,
        value: bool,
    ) -> ClientResult<()>;

    /// Toggles one coil (capability word or read-then-complement).
    async fn toggle_single_digital_output(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
        address: u16,
    ) -> ClientResult<()>;

    /// Reads the whole coil bank as packed bytes.
    async fn read_device_digital_output(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
    ) -> ClientResult<Vec<u8>>;

    /// Reads the whole discrete-input bank as packed bytes.
    async fn read_device_digital_input(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
    ) -> ClientResult<Vec<u8>>;

    /// Reads the whole holding-register bank as big-endian bytes.
    async fn read_device_analog_output(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
    ) -> ClientResult<Vec<u8>>;

    /// Reads the whole input-register bank as big-endian bytes.
    async fn read_device_analog_input(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
    ) -> ClientResult<Vec<u8>>;
}

#[async_trait]
impl DeviceClient for ModbusDeviceClient {
    async fn ensure_connected(&mut self, cancel: &CancellationToken) -> ClientResult<()> {
        ModbusDeviceClient::ensure_connected(self, cancel).await
    }

    async fn close(&mut self) {
        ModbusDeviceClient::close(self).await;
    }

    async fn read_single_digital_output(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
        address: u16,
    ) -> ClientResult<bool> {
        ModbusDeviceClient::read_single_digital_output(self, cancel, device, address).await
    }

    async fn read_single_digital_input(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
        address: u16,
    ) -> ClientResult<bool> {
        ModbusDeviceClient::read_single_digital_input(self, cancel, device, address).await
    }

    async fn write_single_digital_output(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
        address: u16,
        value: bool,
    ) -> ClientResult<()> {
        ModbusDeviceClient::write_single_digital_output(self, cancel, device, address, value).await
    }

    async fn toggle_single_digital_output(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
        address: u16,
    ) -> ClientResult<()> {
        ModbusDeviceClient::toggle_single_digital_output(self, cancel, device, address).await
    }

    async fn read_device_digital_output(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
    ) -> ClientResult<Vec<u8>> {
        ModbusDeviceClient::read_device_digital_output(self, cancel, device).await
    }

    async fn read_device_digital_input(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
    ) -> ClientResult<Vec<u8>> {
        ModbusDeviceClient::read_device_digital_input(self, cancel, device).await
    }

    async fn read_device_analog_output(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
    ) -> ClientResult<Vec<u8>> {
        ModbusDeviceClient::read_device_analog_output(self, cancel, device).await
    }

    async fn read_device_analog_input(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
    ) -> ClientResult<Vec<u8>> {
        ModbusDeviceClient::read_device_analog_input(self, cancel, device).await
    }
}
