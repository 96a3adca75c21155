// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uhn-core
//!
//! Core abstractions and shared types for the UHN edge gateway.
//!
//! This crate provides the foundational pieces used across all gateway
//! components:
//!
//! - **Types**: `DeviceState`, `DeviceStatus`, the loose wire shapes of
//!   incoming commands, and numeric coercion helpers
//! - **Error**: per-subsystem error hierarchy (`ClientError`, `BrokerError`,
//!   `CommandError`)
//! - **State**: the per-device publish-dedup store (`EdgeStateStore`)
//! - **Traits**: the capability contracts between the bus pollers and the
//!   northbound broker (`EdgePublisher`, `EdgeSubscriber`)
//!
//! ## Example
//!
//! ```rust
//! use uhn_core::types::{DeviceState, DeviceStatus};
//! use uhn_core::state::EdgeStateStore;
//!
//! let store = EdgeStateStore::new();
//! let state = DeviceState::now("d1");
//! assert!(store.has_changed(&state)); // nothing published yet
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod state;
pub mod traits;
pub mod types;

pub use error::{
    BrokerError, BrokerResult, ClientError, ClientResult, CommandError, CommandResult,
};
pub use state::EdgeStateStore;
pub use traits::{EdgePublisher, EdgeSubscriber};
pub use types::{
    coerce_u16, coerce_u64, DeviceState, DeviceStatus, IncomingCommand, IncomingDeviceCommand,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
