// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The internal command form.

use std::sync::Arc;

use uhn_config::DeviceSpec;

/// A device command after resolution and numeric coercion.
///
/// Produced by the registry from the loose wire shape, consumed by the
/// owning bus poller.
#[derive(Debug, Clone)]
pub struct DeviceCommand {
    /// Caller-supplied correlation id; empty when none was given.
    pub id: String,

    /// The resolved target device.
    pub device: Arc<DeviceSpec>,

    /// Action name, matched case-insensitively.
    pub action: String,

    /// Target address within the bank.
    pub address: u16,

    /// 0 = off, 1 = on, 2 = toggle.
    pub value: u16,

    /// Auto-revert delay in milliseconds; 0 disables the pulse.
    pub pulse_ms: u64,
}

impl DeviceCommand {
    /// The logical complement used for a pulse revert of a set command.
    pub fn revert_value(&self) -> u16 {
        if self.value == 1 {
            0
        } else {
            1
        }
    }
}
