// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uhn-bin
//!
//! Binary crate for the `uhn-edge` gateway: CLI parsing, logging setup,
//! signal-driven shutdown, and the runtime that wires configuration, the
//! northbound broker, and the bus pollers together.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
