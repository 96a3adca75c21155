// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Modbus TCP transport.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_modbus::prelude::*;

use uhn_config::BusSpec;
use uhn_core::error::{ClientError, ClientResult};

use crate::transport::{BusTransport, ContextOps};

// =============================================================================
// TcpTransport
// =============================================================================

/// Modbus TCP transport for one bus.
///
/// The bus I/O timeout bounds both the dial and every request, matching the
/// serial transport's behavior where a single timeout governs the line.
pub struct TcpTransport {
    bus: Arc<BusSpec>,
    ops: ContextOps,
}

impl TcpTransport {
    /// Creates a disconnected TCP transport from the bus definition.
    pub fn new(bus: Arc<BusSpec>) -> Self {
        let request_timeout = bus.timeout();
        Self {
            bus,
            ops: ContextOps::new(request_timeout),
        }
    }

    async fn resolve_address(bus: &BusSpec) -> ClientResult<SocketAddr> {
        if let Ok(addr) = bus.tcp_addr.parse::<SocketAddr>() {
            return Ok(addr);
        }

        let mut addrs = tokio::net::lookup_host(&bus.tcp_addr)
            .await
            .map_err(|e| ClientError::connect(format!("resolve {}: {}", bus.tcp_addr, e)))?;

        addrs
            .next()
            .ok_or_else(|| ClientError::connect(format!("resolve {}: no addresses", bus.tcp_addr)))
    }
}

#[async_trait]
impl BusTransport for TcpTransport {
    async fn connect(&mut self) -> ClientResult<()> {
        if self.ops.is_connected() {
            return Ok(());
        }

        let socket_addr = Self::resolve_address(&self.bus).await?;
        let dial_timeout = self.bus.timeout();

        let stream = timeout(dial_timeout, TcpStream::connect(socket_addr))
            .await
            .map_err(|_| {
                ClientError::connect(format!(
                    "dial {}: connection timeout after {:?}",
                    self.bus.tcp_addr, dial_timeout
                ))
            })?
            .map_err(|e| ClientError::connect(format!("dial {}: {}", self.bus.tcp_addr, e)))?;

        stream.set_nodelay(true).ok();

        let ctx = tcp::attach_slave(stream, Slave(1));
        self.ops.attach(ctx);

        tracing::info!(
            bus = %self.bus.bus_id,
            addr = %self.bus.tcp_addr,
            "Connected to Modbus TCP bus"
        );

        Ok(())
    }

    async fn disconnect(&mut self) -> ClientResult<()> {
        self.ops.detach().await;
        tracing::debug!(bus = %self.bus.bus_id, addr = %self.bus.tcp_addr, "Disconnected TCP bus");
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
        format!("tcp {}", self.bus.tcp_addr)
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("bus", &self.bus.bus_id)
            .field("addr", &self.bus.tcp_addr)
            .field("connected", &self.ops.is_connected())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
