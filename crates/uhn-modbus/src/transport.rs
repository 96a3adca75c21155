// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Abstract transport layer for one Modbus bus.
//!
//! [`BusTransport`] is the seam between the device client and the wire. Both
//! implementations wrap a `tokio-modbus` context; [`ContextOps`] holds the
//! shared request plumbing (per-request timeout, error and exception
//! mapping) so the RTU and TCP files only differ in how they connect.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tokio_modbus::client::{Context as ModbusContext, Reader, Writer};
use tokio_modbus::prelude::*;
use tokio_modbus::{Error as TokioModbusError, ExceptionCode};

use uhn_core::error::{ClientError, ClientResult};

// =============================================================================
// BusTransport
// =============================================================================

/// One Modbus transport (serial line or TCP connection).
///
/// Operations take `&mut self`: a bus admits at most one in-flight
/// transaction, and the single-owner discipline of the bus poller makes that
/// a compile-time property instead of a lock.
#[async_trait]
pub trait BusTransport: Send {
    /// Establishes the transport. Idempotent when already connected.
    async fn connect(&mut self) -> ClientResult<()>;

    /// Releases the transport (closes the serial port / TCP socket).
    async fn disconnect(&mut self) -> ClientResult<()>;

    /// Returns `true` while the transport is established.
    fn is_connected(&self) -> bool;

    /// Selects the slave (unit id) for subsequent requests.
    fn select_slave(&mut self, unit_id: u8);

    /// Sets the per-request timeout for subsequent requests.
    fn set_request_timeout(&mut self, timeout: Duration);

    /// Reads coils (FC1).
    async fn read_coils(&mut self, address: u16, count: u16) -> ClientResult<Vec<bool>>;

    /// Reads discrete inputs (FC2).
    async fn read_discrete_inputs(&mut self, address: u16, count: u16) -> ClientResult<Vec<bool>>;

    /// Reads holding registers (FC3).
    async fn read_holding_registers(&mut self, address: u16, count: u16) -> ClientResult<Vec<u16>>;

    /// Reads input registers (FC4).
    async fn read_input_registers(&mut self, address: u16, count: u16) -> ClientResult<Vec<u16>>;

    /// Writes a single coil (FC5) with the standard on/off words.
    async fn write_single_coil(&mut self, address: u16, value: bool) -> ClientResult<()>;

    /// Writes a single coil (FC5) with an arbitrary on-wire word.
    ///
    /// Needed for device types whose catalog declares a toggle capability
    /// word outside the standard `0x0000`/`0xFF00` pair.
    async fn write_coil_word(&mut self, address: u16, word: u16) -> ClientResult<()>;

    /// Human-readable transport identity for logs.
    fn display_name(&self) -> String;
}

// =============================================================================
// ContextOps — shared tokio-modbus plumbing
// =============================================================================

/// The connected tokio-modbus context plus request settings.
pub(crate) struct ContextOps {
    pub context: Option<ModbusContext>,
    pub request_timeout: Duration,
    pub unit_id: u8,
}

impl ContextOps {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            context: None,
            request_timeout,
            unit_id: 1,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    /// Stores the context and applies the currently selected slave.
    pub fn attach(&mut self, mut context: ModbusContext) {
        context.set_slave(Slave(self.unit_id));
        self.context = Some(context);
    }

    /// Selects the slave id, applying it to a live context immediately.
    pub fn select_slave(&mut self, unit_id: u8) {
        self.unit_id = unit_id;
        if let Some(ctx) = self.context.as_mut() {
            ctx.set_slave(Slave(unit_id));
        }
    }

    pub async fn detach(&mut self) {
        if let Some(mut ctx) = self.context.take() {
            if let Err(e) = ctx.disconnect().await {
                tracing::debug!(error = %e, "Error disconnecting Modbus context");
            }
        }
    }

    fn context_mut(&mut self) -> ClientResult<&mut ModbusContext> {
        self.context.as_mut().ok_or(ClientError::NotConnected)
    }

    pub async fn read_coils(&mut self, address: u16, count: u16) -> ClientResult<Vec<bool>> {
        let deadline = self.request_timeout;
        let ctx = self.context_mut()?;
        timeout(deadline, ctx.read_coils(address, count))
            .await
            .map_err(|_| ClientError::Timeout { duration: deadline })?
            .map_err(|e| map_transport_error(e, || ClientError::read(address, count, "read_coils")))?
            .map_err(map_exception)
    }

    pub async fn read_discrete_inputs(&mut self, address: u16, count: u16) -> ClientResult<Vec<bool>> {
        let deadline = self.request_timeout;
        let ctx = self.context_mut()?;
        timeout(deadline, ctx.read_discrete_inputs(address, count))
            .await
            .map_err(|_| ClientError::Timeout { duration: deadline })?
            .map_err(|e| {
                map_transport_error(e, || ClientError::read(address, count, "read_discrete_inputs"))
            })?
            .map_err(map_exception)
    }

    pub async fn read_holding_registers(&mut self, address: u16, count: u16) -> ClientResult<Vec<u16>> {
        let deadline = self.request_timeout;
        let ctx = self.context_mut()?;
        timeout(deadline, ctx.read_holding_registers(address, count))
            .await
            .map_err(|_| ClientError::Timeout { duration: deadline })?
            .map_err(|e| {
                map_transport_error(e, || ClientError::read(address, count, "read_holding_registers"))
            })?
            .map_err(map_exception)
    }

    pub async fn read_input_registers(&mut self, address: u16, count: u16) -> ClientResult<Vec<u16>> {
        let deadline = self.request_timeout;
        let ctx = self.context_mut()?;
        timeout(deadline, ctx.read_input_registers(address, count))
            .await
            .map_err(|_| ClientError::Timeout { duration: deadline })?
            .map_err(|e| {
                map_transport_error(e, || ClientError::read(address, count, "read_input_registers"))
            })?
            .map_err(map_exception)
    }

    pub async fn write_single_coil(&mut self, address: u16, value: bool) -> ClientResult<()> {
        let deadline = self.request_timeout;
        let ctx = self.context_mut()?;
        timeout(deadline, ctx.write_single_coil(address, value))
            .await
            .map_err(|_| ClientError::Timeout { duration: deadline })?
            .map_err(|e| map_transport_error(e, || ClientError::write(address, "write_single_coil")))?
            .map_err(map_exception)
    }

    pub async fn write_coil_word(&mut self, address: u16, word: u16) -> ClientResult<()> {
        // The typed API only speaks the standard pair; anything else is a
        // raw FC5 frame.
        match word {
            0xFF00 => return self.write_single_coil(address, true).await,
            0x0000 => return self.write_single_coil(address, false).await,
            _ => {}
        }

        let deadline = self.request_timeout;
        let ctx = self.context_mut()?;
        let frame = vec![
            (address >> 8) as u8,
            (address & 0xFF) as u8,
            (word >> 8) as u8,
            (word & 0xFF) as u8,
        ];

        let response = timeout(deadline, ctx.call(Request::Custom(0x05, Cow::Owned(frame))))
            .await
            .map_err(|_| ClientError::Timeout { duration: deadline })?
            .map_err(|e| map_transport_error(e, || ClientError::write(address, "write_coil_word")))?
            .map_err(map_exception)?;

        // FC5 echoes the request; the payload carries no further information.
        let _ = response;
        Ok(())
    }
}

// =============================================================================
// Error mapping
// =============================================================================

/// Maps a tokio-modbus transport error into a [`ClientError`], preserving the
/// underlying I/O message (the transient classifier keys off it).
fn map_transport_error(
    error: TokioModbusError,
    shape: impl FnOnce() -> ClientError,
) -> ClientError {
    let message = match &error {
        TokioModbusError::Transport(io_error) => io_error.to_string(),
        TokioModbusError::Protocol(protocol_error) => format!("{:?}", protocol_error),
    };

    match shape() {
        ClientError::Read { address, count, .. } => ClientError::read(address, count, message),
        ClientError::Write { address, .. } => ClientError::write(address, message),
        other => other,
    }
}

/// Maps a Modbus exception response into a [`ClientError`].
fn map_exception(code: ExceptionCode) -> ClientError {
    ClientError::Exception {
        code: exception_code_to_u8(code),
    }
}

fn exception_code_to_u8(code: ExceptionCode) -> u8 {
    match code {
        ExceptionCode::IllegalFunction => 0x01,
        ExceptionCode::IllegalDataAddress => 0x02,
        ExceptionCode::IllegalDataValue => 0x03,
        ExceptionCode::ServerDeviceFailure => 0x04,
        ExceptionCode::Acknowledge => 0x05,
        ExceptionCode::ServerDeviceBusy => 0x06,
        ExceptionCode::MemoryParityError => 0x08,
        ExceptionCode::GatewayPathUnavailable => 0x0A,
        ExceptionCode::GatewayTargetDevice => 0x0B,
        _ => 0xFF,
    }
}

// =============================================================================
// Tests
// =============================================================================
