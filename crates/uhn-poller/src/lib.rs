// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uhn-poller
//!
//! The per-bus polling and command plane of the UHN edge gateway.
//!
//! One [`BusPoller`] runs per configured bus. Its event loop is the single
//! owner of the bus transport, multiplexing three inputs with a fixed
//! priority: cancellation, queued commands, and the poll tick. Commands and
//! polls therefore execute strictly sequentially on the bus — at most one
//! Modbus transaction is in flight per bus at any instant.
//!
//! ```text
//!   MQTT cmd ──▶ BusPollers ──▶ bounded cmd channel ─┐
//!                (registry)                          ▼
//!   ticker ────▶ single-slot poll signal ───▶ BusPoller loop ──▶ EdgePublisher
//!                                                │
//!                               CommandScheduler ┘ (pulse reverts)
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod command;
pub mod poller;
pub mod registry;
pub mod scheduler;

pub use client::DeviceClient;
pub use command::DeviceCommand;
pub use poller::BusPoller;
pub use registry::BusPollers;
pub use scheduler::CommandScheduler;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
