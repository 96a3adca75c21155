// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subcommand dispatch.

mod run;
mod validate;
mod version;

use crate::cli::{Cli, Commands};
use crate::error::BinResult;

/// Executes the effective subcommand.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Run => run::execute(&cli).await,
        Commands::Validate => validate::execute(&cli),
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}
