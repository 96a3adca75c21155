// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The resilient per-bus device client.
//!
//! `ModbusDeviceClient` sits between the bus poller and a [`BusTransport`]
//! and owns everything that makes a real fieldbus usable:
//!
//! - connection lifecycle with exponential backoff (200 ms doubling to 5 s)
//! - per-device slave selection and timeout precedence (catalog, then bus)
//! - settle gaps before requests and after writes
//! - chunked bank reads bounded by the catalog's per-request limits
//! - one-shot reconnect-and-retry on transient transport errors
//!
//! Bank reads return the on-wire byte layout: digital banks are packed
//! LSB-first per chunk and concatenated in address order, analog banks are
//! big-endian words. Higher layers treat these buffers as opaque payload.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use uhn_config::{BusSpec, BusType, DeviceSpec, Range};
use uhn_core::error::{ClientError, ClientResult};

use crate::rtu::RtuTransport;
use crate::tcp::TcpTransport;
use crate::transport::BusTransport;

/// First reconnect delay after a failure.
pub const BACKOFF_MIN: Duration = Duration::from_millis(200);

/// Reconnect delay ceiling.
pub const BACKOFF_MAX: Duration = Duration::from_secs(5);

// Modbus protocol caps for a single read request.
const MAX_DIGITAL_BITS_PER_READ: u16 = 2000;
const MAX_ANALOG_WORDS_PER_READ: u16 = 125;

// =============================================================================
// Request plumbing
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy)]
enum FcRequest {
    ReadCoils(u16, u16),
    ReadDiscreteInputs(u16, u16),
    ReadHoldingRegisters(u16, u16),
    ReadInputRegisters(u16, u16),
    WriteSingleCoil(u16, bool),
    ToggleCoil { address: u16, toggle_word: u16 },
}

enum FcResponse {
    Bits(Vec<bool>),
    Words(Vec<u16>),
    Done,
}

// =============================================================================
// ModbusDeviceClient
// =============================================================================

/// Resilient Modbus client for a single bus.
///
/// All devices of the bus go through one instance; the slave id is switched
/// between transactions. The owning bus poller is the only caller, which
/// keeps transactions on the bus strictly sequential.
pub struct ModbusDeviceClient {
    transport: Box<dyn BusTransport>,
    bus_id: String,
    conn_ok: bool,
    backoff: Duration,
    last_conn_err: Option<String>,
}

impl ModbusDeviceClient {
    /// Creates the client for a bus, picking the transport from its type.
    pub fn for_bus(bus: Arc<BusSpec>) -> Self {
        let transport: Box<dyn BusTransport> = match bus.bus_type {
            BusType::Rtu => Box::new(RtuTransport::new(Arc::clone(&bus))),
            BusType::Tcp => Box::new(TcpTransport::new(Arc::clone(&bus))),
        };
        Self::with_transport(bus.bus_id.clone(), transport)
    }

    /// Creates the client over an explicit transport (tests, simulators).
    pub fn with_transport(bus_id: impl Into<String>, transport: Box<dyn BusTransport>) -> Self {
        Self {
            transport,
            bus_id: bus_id.into(),
            conn_ok: false,
            backoff: Duration::ZERO,
            last_conn_err: None,
        }
    }

    /// Current reconnect backoff; zero means "ready to try now".
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// The last connection failure, if the client is in backoff.
    pub fn last_connect_error(&self) -> Option<&str> {
        self.last_conn_err.as_deref()
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Idempotently establishes the transport.
    ///
    /// Waits out the current backoff first (honoring cancellation), drops any
    /// stale transport, then connects. Success clears the backoff; failure
    /// doubles it up to [`BACKOFF_MAX`] and propagates the error.
    pub async fn ensure_connected(&mut self, cancel: &CancellationToken) -> ClientResult<()> {
        if self.conn_ok {
            return Ok(());
        }

        if !self.backoff.is_zero() {
            sleep_cancellable(cancel, self.backoff).await?;
        }

        // Drop anything stale before dialing again.
        let _ = self.transport.disconnect().await;

        match self.transport.connect().await {
            Ok(()) => {
                self.conn_ok = true;
                self.backoff = Duration::ZERO;
                self.last_conn_err = None;
                Ok(())
            }
            Err(err) => {
                self.bump_backoff(&err);
                Err(err)
            }
        }
    }

    /// Releases the transport and marks the client disconnected.
    pub async fn close(&mut self) {
        let _ = self.transport.disconnect().await;
        self.conn_ok = false;
    }

    fn bump_backoff(&mut self, err: &ClientError) {
        self.conn_ok = false;
        self.last_conn_err = Some(err.to_string());
        self.backoff = if self.backoff.is_zero() {
            BACKOFF_MIN
        } else {
            (self.backoff * 2).min(BACKOFF_MAX)
        };
    }

    // =========================================================================
    // Single-point operations
    // =========================================================================

    /// Reads one coil (FC1, qty 1).
    pub async fn read_single_digital_output(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
        address: u16,
    ) -> ClientResult<bool> {
        let response = self
            .invoke(cancel, device, Access::Read, FcRequest::ReadCoils(address, 1))
            .await?;
        first_bit(response)
    }

    /// Reads one discrete input (FC2, qty 1).
    pub async fn read_single_digital_input(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
        address: u16,
    ) -> ClientResult<bool> {
        let response = self
            .invoke(
                cancel,
                device,
                Access::Read,
                FcRequest::ReadDiscreteInputs(address, 1),
            )
            .await?;
        first_bit(response)
    }

    /// Writes one coil (FC5); `true` is `0xFF00` on the wire, `false` is
    /// `0x0000`.
    pub async fn write_single_digital_output(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
        address: u16,
        value: bool,
    ) -> ClientResult<()> {
        self.invoke(
            cancel,
            device,
            Access::Write,
            FcRequest::WriteSingleCoil(address, value),
        )
        .await
        .map(|_| ())
    }

    /// Toggles one coil.
    ///
    /// Device types whose catalog declares a non-zero `toggleWord` get that
    /// word written via FC5 and the device flips the coil itself. Everything
    /// else is emulated: read the coil, write its complement. Both wire
    /// exchanges happen inside one settle/retry envelope.
    pub async fn toggle_single_digital_output(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
        address: u16,
    ) -> ClientResult<()> {
        self.invoke(
            cancel,
            device,
            Access::Write,
            FcRequest::ToggleCoil {
                address,
                toggle_word: device.catalog.capabilities.toggle_word,
            },
        )
        .await
        .map(|_| ())
    }

    // =========================================================================
    // Bank reads (chunked)
    // =========================================================================

    /// Reads the coil bank (FC1) as packed bytes.
    pub async fn read_device_digital_output(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
    ) -> ClientResult<Vec<u8>> {
        let range = device.catalog.digital_outputs;
        let chunk = clamp_chunk(device.catalog.limits.max_coils_per_read, MAX_DIGITAL_BITS_PER_READ);
        self.read_digital_chunked(cancel, device, range, chunk, false).await
    }

    /// Reads the discrete-input bank (FC2) as packed bytes.
    pub async fn read_device_digital_input(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
    ) -> ClientResult<Vec<u8>> {
        let range = device.catalog.digital_inputs;
        let chunk = clamp_chunk(device.catalog.limits.max_inputs_per_read, MAX_DIGITAL_BITS_PER_READ);
        self.read_digital_chunked(cancel, device, range, chunk, true).await
    }

    /// Reads the holding-register bank (FC3) as big-endian bytes.
    pub async fn read_device_analog_output(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
    ) -> ClientResult<Vec<u8>> {
        let range = device.catalog.analog_outputs;
        let chunk =
            clamp_chunk(device.catalog.limits.max_registers_per_read, MAX_ANALOG_WORDS_PER_READ);
        self.read_analog_chunked(cancel, device, range, chunk, false).await
    }

    /// Reads the input-register bank (FC4) as big-endian bytes.
    pub async fn read_device_analog_input(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
    ) -> ClientResult<Vec<u8>> {
        let range = device.catalog.analog_inputs;
        let chunk =
            clamp_chunk(device.catalog.limits.max_registers_per_read, MAX_ANALOG_WORDS_PER_READ);
        self.read_analog_chunked(cancel, device, range, chunk, true).await
    }

    async fn read_digital_chunked(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
        range: Option<Range>,
        chunk_size: u16,
        input: bool,
    ) -> ClientResult<Vec<u8>> {
        let Some(range) = range else {
            return Ok(Vec::new());
        };
        if range.count == 0 {
            return Ok(Vec::new());
        }

        let mut buf = Vec::with_capacity((range.count as usize + 7) / 8);
        for (addr, qty) in chunks(range.start, range.count, chunk_size) {
            let request = if input {
                FcRequest::ReadDiscreteInputs(addr, qty)
            } else {
                FcRequest::ReadCoils(addr, qty)
            };

            match self.invoke(cancel, device, Access::Read, request).await {
                Ok(FcResponse::Bits(bits)) => buf.extend_from_slice(&pack_bits(&bits)),
                Ok(_) => return Err(ClientError::read(addr, qty, "unexpected response shape")),
                Err(err) => {
                    tracing::error!(
                        bus = %self.bus_id,
                        device = %device.name,
                        addr,
                        qty,
                        error = %err,
                        "read bits failed"
                    );
                    // First failure aborts the whole bank read.
                    return Err(err);
                }
            }
        }
        Ok(buf)
    }

    async fn read_analog_chunked(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
        range: Option<Range>,
        chunk_size: u16,
        input: bool,
    ) -> ClientResult<Vec<u8>> {
        let Some(range) = range else {
            return Ok(Vec::new());
        };
        if range.count == 0 {
            return Ok(Vec::new());
        }

        let mut buf = Vec::with_capacity(range.count as usize * 2);
        for (addr, qty) in chunks(range.start, range.count, chunk_size) {
            let request = if input {
                FcRequest::ReadInputRegisters(addr, qty)
            } else {
                FcRequest::ReadHoldingRegisters(addr, qty)
            };

            match self.invoke(cancel, device, Access::Read, request).await {
                Ok(FcResponse::Words(words)) => buf.extend_from_slice(&pack_words(&words)),
                Ok(_) => return Err(ClientError::read(addr, qty, "unexpected response shape")),
                Err(err) => {
                    tracing::error!(
                        bus = %self.bus_id,
                        device = %device.name,
                        addr,
                        qty,
                        error = %err,
                        "read regs failed"
                    );
                    return Err(err);
                }
            }
        }
        Ok(buf)
    }

    // =========================================================================
    // Core invoke path
    // =========================================================================

    /// Runs one FC transaction with the full resilience envelope.
    async fn invoke(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
        access: Access,
        request: FcRequest,
    ) -> ClientResult<FcResponse> {
        self.ensure_connected(cancel).await?;
        self.prepare_for(device);

        if device.debug || device.bus.debug {
            tracing::debug!(
                bus = %self.bus_id,
                device = %device.name,
                unit = device.unit_id,
                ?request,
                "Modbus transaction"
            );
        }

        match self.attempt(cancel, device, access, request).await {
            Ok(response) => Ok(response),
            Err(err) => {
                tracing::warn!(
                    bus = %self.bus_id,
                    device = %device.name,
                    error = %err,
                    "Modbus operation failed, evaluating retry"
                );
                if err.is_transient() {
                    self.bump_backoff(&err);
                    if self.ensure_connected(cancel).await.is_ok() {
                        self.prepare_for(device);
                        return self.attempt(cancel, device, access, request).await;
                    }
                }
                Err(err)
            }
        }
    }

    fn prepare_for(&mut self, device: &DeviceSpec) {
        self.transport.select_slave(device.unit_id);
        self.transport.set_request_timeout(device.request_timeout());
    }

    /// Settle, dispatch, settle-after-write. No retry at this level.
    async fn attempt(
        &mut self,
        cancel: &CancellationToken,
        device: &DeviceSpec,
        access: Access,
        request: FcRequest,
    ) -> ClientResult<FcResponse> {
        sleep_cancellable(cancel, device.settle_before_request()).await?;

        let response = self.dispatch(request).await?;

        if access == Access::Write {
            sleep_cancellable(cancel, device.settle_after_write()).await?;
        }
        Ok(response)
    }

    async fn dispatch(&mut self, request: FcRequest) -> ClientResult<FcResponse> {
        match request {
            FcRequest::ReadCoils(addr, qty) => {
                Ok(FcResponse::Bits(self.transport.read_coils(addr, qty).await?))
            }
            FcRequest::ReadDiscreteInputs(addr, qty) => Ok(FcResponse::Bits(
                self.transport.read_discrete_inputs(addr, qty).await?,
            )),
            FcRequest::ReadHoldingRegisters(addr, qty) => Ok(FcResponse::Words(
                self.transport.read_holding_registers(addr, qty).await?,
            )),
            FcRequest::ReadInputRegisters(addr, qty) => Ok(FcResponse::Words(
                self.transport.read_input_registers(addr, qty).await?,
            )),
            FcRequest::WriteSingleCoil(addr, value) => {
                self.transport.write_single_coil(addr, value).await?;
                Ok(FcResponse::Done)
            }
            FcRequest::ToggleCoil { address, toggle_word } => {
                let word = if toggle_word != 0 {
                    toggle_word
                } else {
                    let bits = self.transport.read_coils(address, 1).await?;
                    match bits.first() {
                        Some(true) => 0x0000,
                        Some(false) => 0xFF00,
                        None => return Err(ClientError::EmptyResponse),
                    }
                };
                self.transport.write_coil_word(address, word).await?;
                Ok(FcResponse::Done)
            }
        }
    }
}

impl std::fmt::Debug for ModbusDeviceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusDeviceClient")
            .field("bus", &self.bus_id)
            .field("conn_ok", &self.conn_ok)
            .field("backoff", &self.backoff)
            .finish()
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Sleeps for `duration`, surfacing cancellation immediately.
async fn sleep_cancellable(cancel: &CancellationToken, duration: Duration) -> ClientResult<()> {
    if duration.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

fn first_bit(response: FcResponse) -> ClientResult<bool> {
    match response {
        FcResponse::Bits(bits) => bits.first().copied().ok_or(ClientError::EmptyResponse),
        _ => Err(ClientError::EmptyResponse),
    }
}

/// Clamps a configured per-request limit into the protocol's legal window.
fn clamp_chunk(configured: i64, protocol_max: u16) -> u16 {
    configured.clamp(1, protocol_max as i64) as u16
}

/// Splits `[start, start+total)` into `(addr, qty)` chunks of at most
/// `chunk_size`, in address order.
fn chunks(start: u16, total: u16, chunk_size: u16) -> Vec<(u16, u16)> {
    if total == 0 || chunk_size == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity((total as usize).div_ceil(chunk_size as usize));
    let mut addr = start as u32;
    let mut left = total;
    while left > 0 {
        let step = left.min(chunk_size);
        out.push((addr as u16, step));
        addr += step as u32;
        left -= step;
    }
    out
}

/// Packs bits LSB-first into `ceil(len/8)` bytes, the FC1/FC2 wire layout.
fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// Packs 16-bit words as big-endian bytes, the FC3/FC4 wire layout.
fn pack_words(words: &[u16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for word in words {
        bytes.extend_from_slice(&word.to_be_bytes());
    }
    bytes
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use uhn_config::{BusConfig, CatalogCapabilities, CatalogDeviceSpec, CatalogLimits, CatalogTimings};

    // -------------------------------------------------------------------------
    // Scripted fake transport
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct FakeState {
        log: Vec<String>,
        connects: u32,
        fail_connects: u32,
        bit_results: VecDeque<ClientResult<Vec<bool>>>,
        word_results: VecDeque<ClientResult<Vec<u16>>>,
        write_results: VecDeque<ClientResult<()>>,
        connected: bool,
    }

    struct FakeTransport {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeTransport {
        fn new() -> (Self, Arc<Mutex<FakeState>>) {
            let state = Arc::new(Mutex::new(FakeState::default()));
            (Self { state: Arc::clone(&state) }, state)
        }
    }

    #[async_trait]
    impl BusTransport for FakeTransport {
        async fn connect(&mut self) -> ClientResult<()> {
            let mut s = self.state.lock().unwrap();
            s.connects += 1;
            if s.fail_connects > 0 {
                s.fail_connects -= 1;
                return Err(ClientError::connect("connection refused"));
            }
            s.connected = true;
            Ok(())
        }

        async fn disconnect(&mut self) -> ClientResult<()> {
            self.state.lock().unwrap().connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.state.lock().unwrap().connected
        }

        fn select_slave(&mut self, unit_id: u8) {
            self.state.lock().unwrap().log.push(format!("slave {}", unit_id));
        }

        fn set_request_timeout(&mut self, _timeout: Duration) {}

        async fn read_coils(&mut self, address: u16, count: u16) -> ClientResult<Vec<bool>> {
            let mut s = self.state.lock().unwrap();
            s.log.push(format!("fc1 {}+{}", address, count));
            s.bit_results.pop_front().unwrap_or_else(|| Ok(vec![false; count as usize]))
        }

        async fn read_discrete_inputs(&mut self, address: u16, count: u16) -> ClientResult<Vec<bool>> {
            let mut s = self.state.lock().unwrap();
            s.log.push(format!("fc2 {}+{}", address, count));
            s.bit_results.pop_front().unwrap_or_else(|| Ok(vec![false; count as usize]))
        }

        async fn read_holding_registers(&mut self, address: u16, count: u16) -> ClientResult<Vec<u16>> {
            let mut s = self.state.lock().unwrap();
            s.log.push(format!("fc3 {}+{}", address, count));
            s.word_results.pop_front().unwrap_or_else(|| Ok(vec![0; count as usize]))
        }

        async fn read_input_registers(&mut self, address: u16, count: u16) -> ClientResult<Vec<u16>> {
            let mut s = self.state.lock().unwrap();
            s.log.push(format!("fc4 {}+{}", address, count));
            s.word_results.pop_front().unwrap_or_else(|| Ok(vec![0; count as usize]))
        }

        async fn write_single_coil(&mut self, address: u16, value: bool) -> ClientResult<()> {
            let mut s = self.state.lock().unwrap();
            s.log.push(format!("fc5 {} {}", address, if value { "0xFF00" } else { "0x0000" }));
            s.write_results.pop_front().unwrap_or(Ok(()))
        }

        async fn write_coil_word(&mut self, address: u16, word: u16) -> ClientResult<()> {
            let mut s = self.state.lock().unwrap();
            s.log.push(format!("fc5 {} {:#06X}", address, word));
            s.write_results.pop_front().unwrap_or(Ok(()))
        }

        fn display_name(&self) -> String {
            "fake".to_string()
        }
    }

    // -------------------------------------------------------------------------
    // Fixtures
    // -------------------------------------------------------------------------

    fn bus() -> Arc<BusSpec> {
        Arc::new(BusConfig {
            bus_id: "bus1".to_string(),
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
        })
    }

    fn device(toggle_word: u16, max_coils: i64) -> DeviceSpec {
        DeviceSpec {
            name: "d1".to_string(),
            unit_id: 3,
            type_key: "t".to_string(),
            retry_count: 0,
            debug: false,
            bus: bus(),
            catalog: Arc::new(CatalogDeviceSpec {
                vendor: "acme".to_string(),
                model: "T".to_string(),
                digital_outputs: Some(Range { start: 0, count: 20 }),
                digital_inputs: None,
                analog_outputs: Some(Range { start: 100, count: 5 }),
                analog_inputs: None,
                limits: CatalogLimits {
                    max_coils_per_read: max_coils,
                    max_inputs_per_read: 16,
                    max_registers_per_read: 2,
                },
                timings: CatalogTimings::default(),
                capabilities: CatalogCapabilities { toggle_word },
                debug: false,
            }),
        }
    }

    fn client_with_fake() -> (ModbusDeviceClient, Arc<Mutex<FakeState>>) {
        let (transport, state) = FakeTransport::new();
        (ModbusDeviceClient::with_transport("bus1", Box::new(transport)), state)
    }

    fn log_of(state: &Arc<Mutex<FakeState>>) -> Vec<String> {
        state.lock().unwrap().log.clone()
    }

    // -------------------------------------------------------------------------
    // Pure helpers
    // -------------------------------------------------------------------------

    #[test]
    fn test_chunks_cover_range_in_order() {
        assert_eq!(chunks(0, 20, 16), vec![(0, 16), (16, 4)]);
        assert_eq!(chunks(100, 5, 2), vec![(100, 2), (102, 2), (104, 1)]);
        assert_eq!(chunks(7, 3, 16), vec![(7, 3)]);
        assert!(chunks(0, 0, 16).is_empty());
        assert!(chunks(0, 5, 0).is_empty());
    }

    #[test]
    fn test_pack_bits_lsb_first() {
        assert_eq!(pack_bits(&[true, false, true, false]), vec![0b0000_0101]);
        assert_eq!(
            pack_bits(&[false, false, false, false, false, false, false, false, true]),
            vec![0x00, 0x01]
        );
        assert!(pack_bits(&[]).is_empty());
    }

    #[test]
    fn test_pack_words_big_endian() {
        assert_eq!(pack_words(&[0x1234, 0x00FF]), vec![0x12, 0x34, 0x00, 0xFF]);
    }

    #[test]
    fn test_clamp_chunk() {
        assert_eq!(clamp_chunk(16, 2000), 16);
        assert_eq!(clamp_chunk(0, 2000), 1);
        assert_eq!(clamp_chunk(5000, 2000), 2000);
        assert_eq!(clamp_chunk(200, 125), 125);
    }

    // -------------------------------------------------------------------------
    // Client behavior
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_chunked_digital_read_concatenates_in_order() {
        let (mut client, state) = client_with_fake();
        let cancel = CancellationToken::new();
        let dev = device(0, 16);

        {
            let mut s = state.lock().unwrap();
            // 20 coils in chunks of 16: first chunk bits 0..16, second 16..20.
            let mut first = vec![false; 16];
            first[0] = true;
            first[2] = true;
            s.bit_results.push_back(Ok(first));
            s.bit_results.push_back(Ok(vec![true, false, false, true]));
        }

        let bytes = client.read_device_digital_output(&cancel, &dev).await.unwrap();
        // 16 bits -> 2 bytes, then 4 bits -> 1 byte, concatenated.
        assert_eq!(bytes, vec![0b0000_0101, 0x00, 0b0000_1001]);

        let log = log_of(&state);
        assert!(log.contains(&"fc1 0+16".to_string()));
        assert!(log.contains(&"fc1 16+4".to_string()));
        // Slave selected before the transaction.
        assert_eq!(log.first().unwrap(), "slave 3");
    }

    #[tokio::test]
    async fn test_chunked_analog_read_big_endian() {
        let (mut client, state) = client_with_fake();
        let cancel = CancellationToken::new();
        let dev = device(0, 16);

        {
            let mut s = state.lock().unwrap();
            s.word_results.push_back(Ok(vec![0x0102, 0x0304]));
            s.word_results.push_back(Ok(vec![0x0506, 0x0708]));
            s.word_results.push_back(Ok(vec![0x090A]));
        }

        let bytes = client.read_device_analog_output(&cancel, &dev).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);

        let log = log_of(&state);
        assert!(log.contains(&"fc3 100+2".to_string()));
        assert!(log.contains(&"fc3 102+2".to_string()));
        assert!(log.contains(&"fc3 104+1".to_string()));
    }

    #[tokio::test]
    async fn test_bank_read_aborts_on_first_chunk_failure() {
        let (mut client, state) = client_with_fake();
        let cancel = CancellationToken::new();
        let dev = device(0, 16);

        {
            let mut s = state.lock().unwrap();
            s.bit_results.push_back(Ok(vec![false; 16]));
            // Non-transient failure on the second chunk: no retry, bank fails.
            s.bit_results.push_back(Err(ClientError::read(16, 4, "illegal data address")));
        }

        let err = client.read_device_digital_output(&cancel, &dev).await.unwrap_err();
        assert!(err.to_string().contains("illegal data address"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_reconnects_and_retries_once() {
        let (mut client, state) = client_with_fake();
        let cancel = CancellationToken::new();
        let dev = device(0, 32);

        {
            let mut s = state.lock().unwrap();
            s.bit_results.push_back(Err(ClientError::read(0, 20, "broken pipe")));
            s.bit_results.push_back(Ok(vec![true; 20]));
        }

        let bytes = client.read_device_digital_output(&cancel, &dev).await.unwrap();
        assert_eq!(bytes.len(), 3);

        let s = state.lock().unwrap();
        // Initial connect plus the reconnect after the transient failure.
        assert_eq!(s.connects, 2);
        assert_eq!(s.log.iter().filter(|l| l.starts_with("fc1")).count(), 2);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let (mut client, state) = client_with_fake();
        let cancel = CancellationToken::new();
        let dev = device(0, 32);

        state
            .lock()
            .unwrap()
            .bit_results
            .push_back(Err(ClientError::Exception { code: 0x02 }));

        let err = client.read_device_digital_output(&cancel, &dev).await.unwrap_err();
        assert!(matches!(err, ClientError::Exception { code: 0x02 }));
        assert_eq!(state.lock().unwrap().connects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_and_resets() {
        let (mut client, state) = client_with_fake();
        let cancel = CancellationToken::new();
        state.lock().unwrap().fail_connects = 7;

        for expected_ms in [200u64, 400, 800, 1600, 3200, 5000] {
            assert!(client.ensure_connected(&cancel).await.is_err());
            assert_eq!(client.backoff(), Duration::from_millis(expected_ms));
        }
        // Capped at the ceiling.
        assert!(client.ensure_connected(&cancel).await.is_err());
        assert_eq!(client.backoff(), BACKOFF_MAX);

        state.lock().unwrap().fail_connects = 0;
        client.ensure_connected(&cancel).await.unwrap();
        assert_eq!(client.backoff(), Duration::ZERO);
        assert!(client.last_connect_error().is_none());
    }

    #[tokio::test]
    async fn test_toggle_without_capability_reads_then_complements() {
        let (mut client, state) = client_with_fake();
        let cancel = CancellationToken::new();
        let dev = device(0, 16);

        // Coil 5 currently on: expect FC1 then FC5 with 0x0000.
        state.lock().unwrap().bit_results.push_back(Ok(vec![true]));
        client.toggle_single_digital_output(&cancel, &dev, 5).await.unwrap();

        let log = log_of(&state);
        assert_eq!(
            log.iter().filter(|l| l.starts_with("fc")).cloned().collect::<Vec<_>>(),
            vec!["fc1 5+1".to_string(), "fc5 5 0x0000".to_string()]
        );
    }

    #[tokio::test]
    async fn test_toggle_with_capability_writes_magic_word() {
        let (mut client, state) = client_with_fake();
        let cancel = CancellationToken::new();
        let dev = device(0x5500, 16);

        client.toggle_single_digital_output(&cancel, &dev, 2).await.unwrap();

        let log = log_of(&state);
        // No read; the magic word goes straight out.
        assert!(!log.iter().any(|l| l.starts_with("fc1")));
        assert!(log.contains(&"fc5 2 0x5500".to_string()));
    }

    #[tokio::test]
    async fn test_single_read_empty_response() {
        let (mut client, state) = client_with_fake();
        let cancel = CancellationToken::new();
        let dev = device(0, 16);

        state.lock().unwrap().bit_results.push_back(Ok(vec![]));
        let err = client.read_single_digital_output(&cancel, &dev, 0).await.unwrap_err();
        assert!(matches!(err, ClientError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_settle_gap_honors_cancellation() {
        let (transport, _state) = FakeTransport::new();
        let mut client = ModbusDeviceClient::with_transport("bus1", Box::new(transport));

        let mut dev = device(0, 16);
        let mut catalog = (*dev.catalog).clone();
        catalog.timings.settle_before_request_ms = 50;
        dev.catalog = Arc::new(catalog);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client.read_device_digital_output(&cancel, &dev).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
    }

    #[tokio::test]
    async fn test_write_value_wire_words() {
        let (mut client, state) = client_with_fake();
        let cancel = CancellationToken::new();
        let dev = device(0, 16);

        client.write_single_digital_output(&cancel, &dev, 3, true).await.unwrap();
        client.write_single_digital_output(&cancel, &dev, 3, false).await.unwrap();

        let log = log_of(&state);
        assert!(log.contains(&"fc5 3 0xFF00".to_string()));
        assert!(log.contains(&"fc5 3 0x0000".to_string()));
    }
}
