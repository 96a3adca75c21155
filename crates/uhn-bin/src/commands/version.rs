// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `version` subcommand.

/// Prints component versions.
pub fn execute() {
    println!("uhn-edge {}", crate::VERSION);
    println!("  uhn-core   {}", uhn_core::VERSION);
    println!("  uhn-config {}", uhn_config::VERSION);
    println!("  uhn-modbus {}", uhn_modbus::VERSION);
    println!("  uhn-broker {}", uhn_broker::VERSION);
    println!("  uhn-poller {}", uhn_poller::VERSION);
}
