// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `validate` subcommand: check the configuration without starting.

use uhn_config::load_edge_config;

use crate::cli::Cli;
use crate::error::BinResult;

/// Loads and validates the configuration, printing a short summary.
pub fn execute(cli: &Cli) -> BinResult<()> {
    let config = load_edge_config(&cli.config)?;
    let resolved = config.resolve()?;

    println!("Configuration OK: {}", cli.config.display());
    println!("  buses:   {}", resolved.buses.len());
    println!("  devices: {}", resolved.all_devices().count());
    println!("  poll:    {} ms", resolved.poll_interval.as_millis());
    if resolved.heartbeat_interval.is_zero() {
        println!("  heartbeat: disabled");
    } else {
        println!("  heartbeat: {} s", resolved.heartbeat_interval.as_secs());
    }

    Ok(())
}
