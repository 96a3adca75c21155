// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uhn-config
//!
//! Configuration handling for the UHN edge gateway.
//!
//! The edge configuration is a single JSON document (comments allowed,
//! unknown fields rejected) describing buses, the device-type catalog, and
//! the devices attached to each bus:
//!
//! ```json
//! {
//!   // One serial bus with a single relay board
//!   "buses": [
//!     { "busId": "bus1", "type": "rtu", "port": "/dev/ttyUSB0", "baud": 19200 }
//!   ],
//!   "catalog": {
//!     "relay8": {
//!       "vendor": "acme", "model": "R8",
//!       "digitalOutputs": { "start": 0, "count": 8 },
//!       "limits": { "maxCoilsPerRead": 16, "maxInputsPerRead": 16, "maxRegistersPerRead": 8 }
//!     }
//!   },
//!   "devices": { "bus1": [ { "name": "d1", "unitId": 1, "type": "relay8" } ] },
//!   "pollIntervalMs": 100,
//!   "heartbeatInterval": 60
//! }
//! ```
//!
//! Loading goes through [`loader::load_edge_config`], which strips comments,
//! parses strictly, applies defaults, and validates everything at once so a
//! broken file reports all of its problems in one pass. The validated
//! document is then turned into an immutable, `Arc`-shared spec graph by
//! [`EdgeConfig::resolve`] — the shape the runtime components actually hold.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod catalog;
pub mod error;
pub mod loader;
pub mod resolved;
pub mod schema;

pub use catalog::{build_edge_catalog, DeviceSummary, EdgeCatalogMessage};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_edge_config, load_edge_config_str};
pub use resolved::{BusSpec, CatalogSpec, DeviceSpec, ResolvedBus, ResolvedConfig};
pub use schema::{
    BusConfig, BusType, CatalogCapabilities, CatalogDeviceSpec, CatalogLimits, CatalogTimings,
    DeviceConfig, EdgeConfig, Range,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
