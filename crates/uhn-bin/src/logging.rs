// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Logging initialization.
//!
//! Structured logging via `tracing`; the level is fixed for the lifetime of
//! the process. JSON is the default sink format, text is for humans at a
//! terminal.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::LogFormat;

/// Initializes the logging subsystem from a level string and format.
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(normalize_level(level)))
        .add_directive("rumqttc=warn".parse().expect("static directive"))
        .add_directive("tokio_modbus=info".parse().expect("static directive"));

    match format {
        LogFormat::Json => init_json(filter),
        LogFormat::Text => init_text(filter),
    }
}

fn init_json(filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_target(true).with_current_span(false))
        .init();
}

fn init_text(filter: EnvFilter) {
    let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stdout());
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(is_terminal),
        )
        .init();
}

/// Maps the configured level onto a filter directive, defaulting to `info`.
fn normalize_level(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}

// =============================================================================
// Tests
// =============================================================================
