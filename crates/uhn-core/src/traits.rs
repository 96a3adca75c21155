// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Capability contracts between the bus pollers and the northbound broker.
//!
//! The surfaces are intentionally small: the pollers only ever *publish*
//! states, and the broker only ever *delivers* commands. Both sides are
//! mockable in tests through these traits.

use async_trait::async_trait;

use crate::error::{BrokerResult, CommandResult};
use crate::types::{DeviceState, IncomingCommand, IncomingDeviceCommand};

/// Northbound publishing surface used by the bus pollers.
#[async_trait]
pub trait EdgePublisher: Send + Sync {
    /// Publishes a device snapshot, subject to dedup and heartbeat rules.
    ///
    /// A suppressed publish (unchanged data, no heartbeat due) returns `Ok`.
    async fn publish_device_state(&self, state: DeviceState) -> BrokerResult<()>;

    /// Wipes the publish-dedup store so the next successful poll republishes
    /// every device even if its data is unchanged (the `resync` semantics).
    fn clear_published_state(&self);
}

/// Command sink the broker delivers demultiplexed messages into.
#[async_trait]
pub trait EdgeSubscriber: Send + Sync {
    /// Handles a command addressed to one device.
    async fn on_device_command(&self, command: IncomingDeviceCommand) -> CommandResult<()>;

    /// Handles a gateway-global command.
    async fn on_command(&self, command: IncomingCommand) -> CommandResult<()>;
}
