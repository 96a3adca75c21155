// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `run` subcommand: start the gateway.

use crate::cli::Cli;
use crate::error::BinResult;
use crate::runtime::EdgeRuntime;

/// Builds the runtime from CLI settings and runs it to completion.
pub async fn execute(cli: &Cli) -> BinResult<()> {
    EdgeRuntime::builder()
        .config_path(&cli.config)
        .mqtt_url(&cli.mqtt_url)
        .edge_name(&cli.edge_name)
        .build()
        .run()
        .await
}
