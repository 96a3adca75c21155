// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Test infrastructure: mocks, builders, fixtures.

pub mod builders;
pub mod fixtures;
pub mod mocks;

pub use builders::{BusSpecBuilder, CatalogSpecBuilder, DeviceSpecBuilder};
pub use mocks::{DedupPublisher, MockClientState, MockDeviceClient, MockPublisher};
