// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing.
//!
//! Every flag mirrors an environment variable so the gateway can be driven
//! from a container environment without arguments:
//!
//! - `EDGE_CONFIG_PATH` — configuration file (default `/etc/uhn/edge-config.json`)
//! - `MQTT_URL` — broker URL (default `tcp://localhost:1883`)
//! - `EDGE_NAME` — edge identity / topic prefix (default `edge1`)
//! - `UHN_LOG_LEVEL`, `LOG_FORMAT` — logging

use std::path::PathBuf;

use clap::{Parser, Subcommand};

// =============================================================================
// Cli
// =============================================================================

/// UHN edge gateway: polls Modbus devices and bridges them to MQTT.
#[derive(Parser, Debug)]
#[command(
    name = "uhn-edge",
    version = crate::VERSION,
    about = "UHN edge gateway (Modbus RTU/TCP to MQTT bridge)",
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "/etc/uhn/edge-config.json",
        env = "EDGE_CONFIG_PATH",
        global = true
    )]
    pub config: PathBuf,

    /// MQTT broker URL
    #[arg(
        long,
        default_value = "tcp://localhost:1883",
        env = "MQTT_URL",
        global = true
    )]
    pub mqtt_url: String,

    /// Edge name; all topics are published under `uhn/{edgeName}/`
    #[arg(long, default_value = "edge1", env = "EDGE_NAME", global = true)]
    pub edge_name: String,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, default_value = "info", env = "UHN_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (json, text)
    #[arg(long, default_value = "json", env = "LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// The effective command; `run` when none was given.
    pub fn effective_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the gateway (default)
    Run,

    /// Parse and validate the configuration file without starting
    Validate,

    /// Show version information
    Version,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// JSON lines, the production default.
    #[default]
    Json,
    /// Human-readable text.
    Text,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["uhn-edge"]);
        assert_eq!(cli.config, PathBuf::from("/etc/uhn/edge-config.json"));
        assert_eq!(cli.mqtt_url, "tcp://localhost:1883");
        assert_eq!(cli.edge_name, "edge1");
        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.effective_command(), Commands::Run));
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["uhn-edge", "validate", "-c", "/tmp/edge.json"]);
        assert!(matches!(cli.command, Some(Commands::Validate)));
        assert_eq!(cli.config, PathBuf::from("/tmp/edge.json"));
    }

    #[test]
    fn test_log_format_text() {
        let cli = Cli::parse_from(["uhn-edge", "--log-format", "text"]);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_edge_name_flag() {
        let cli = Cli::parse_from(["uhn-edge", "--edge-name", "plant-7"]);
        assert_eq!(cli.edge_name, "plant-7");
    }
}
