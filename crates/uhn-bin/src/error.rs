// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Binary-level errors; everything here is fatal at startup.

use thiserror::Error;

/// Errors that abort the gateway.
#[derive(Debug, Error)]
pub enum BinError {
    /// Configuration could not be loaded or is invalid.
    #[error("configuration: {0}")]
    Config(#[from] uhn_config::ConfigError),

    /// The northbound broker could not be reached at startup.
    #[error("broker: {0}")]
    Broker(#[from] uhn_core::BrokerError),
}

/// Result with [`BinError`].
pub type BinResult<T> = Result<T, BinError>;

/// Logs the error and terminates with a non-zero exit code.
pub fn report_error_and_exit(error: BinError) -> ! {
    tracing::error!(error = %error, "Fatal error");
    eprintln!("uhn-edge: {}", error);
    std::process::exit(1);
}
