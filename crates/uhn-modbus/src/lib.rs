// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uhn-modbus
//!
//! Resilient Modbus layer for the UHN edge gateway.
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │               ModbusDeviceClient                │
//! │  backoff · settle gaps · chunked bank reads ·   │
//! │  transient-error retry · bit/word packing       │
//! └─────────────────────────────────────────────────┘
//!                        │
//!                        ▼
//! ┌─────────────────────────────────────────────────┐
//! │                  BusTransport                   │
//! │        (FC1–FC5 over one bus, one owner)        │
//! └─────────────────────────────────────────────────┘
//!          │                           │
//!          ▼                           ▼
//! ┌─────────────────┐       ┌─────────────────┐
//! │  RtuTransport   │       │  TcpTransport   │
//! │ (tokio-serial)  │       │  (tokio-modbus) │
//! └─────────────────┘       └─────────────────┘
//! ```
//!
//! One client instance serves one bus; every device on the bus is addressed
//! by switching the slave id between transactions. The client never runs two
//! transactions concurrently — its owner (the bus poller) is single-tasked
//! by construction, and the transport takes `&mut self` to make that
//! structural rather than conventional.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod rtu;
pub mod tcp;
pub mod transport;

pub use client::{ModbusDeviceClient, BACKOFF_MAX, BACKOFF_MIN};
pub use rtu::RtuTransport;
pub use tcp::TcpTransport;
pub use transport::BusTransport;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
