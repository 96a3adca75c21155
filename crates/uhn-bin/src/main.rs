// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `uhn-edge` — bridges Modbus RTU/TCP fieldbuses to an MQTT fabric.

use clap::Parser;

use uhn_bin::cli::Cli;
use uhn_bin::commands;
use uhn_bin::error::report_error_and_exit;
use uhn_bin::logging::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format);

    if let Err(error) = commands::execute(cli).await {
        report_error_and_exit(error);
    }
}
