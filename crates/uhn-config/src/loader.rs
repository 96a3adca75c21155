// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Strict JSON loading with comment support.
//!
//! Edge configurations are JSON documents that may contain `//` line comments
//! and `/* ... */` block comments. Comments are stripped by a small scanner
//! that is aware of string literals, then the document is parsed with unknown
//! fields rejected and validated as a whole.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::EdgeConfig;

/// Loads, parses and validates an edge configuration file.
pub fn load_edge_config(path: impl AsRef<Path>) -> ConfigResult<EdgeConfig> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading edge configuration");

    let raw = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    let config = load_edge_config_str(&raw)?;

    debug!(
        buses = config.buses.len(),
        catalog_types = config.catalog.len(),
        devices = config.devices.values().map(Vec::len).sum::<usize>(),
        "Edge configuration loaded"
    );

    Ok(config)
}

/// Parses and validates an edge configuration from a string.
pub fn load_edge_config_str(raw: &str) -> ConfigResult<EdgeConfig> {
    let clean = strip_json_comments(raw);

    let mut config: EdgeConfig =
        serde_json::from_str(&clean).map_err(|e| ConfigError::parse(e.to_string()))?;

    config.validate()?;
    Ok(config)
}

/// Removes `//` line comments and `/* */` block comments.
///
/// String literals are respected so a `//` inside a quoted value survives.
/// Newlines inside block comments are preserved to keep parser line numbers
/// meaningful.
fn strip_json_comments(input: &str) -> String {
    #[derive(PartialEq)]
    enum Mode {
        Code,
        InString,
        LineComment,
        BlockComment,
    }

    let mut out = String::with_capacity(input.len());
    let mut mode = Mode::Code;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match mode {
            Mode::Code => match c {
                '"' => {
                    mode = Mode::InString;
                    out.push(c);
                }
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    mode = Mode::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    mode = Mode::BlockComment;
                }
                _ => out.push(c),
            },
            Mode::InString => {
                out.push(c);
                match c {
                    '\\' => {
                        // Escape sequence; keep the next char verbatim.
                        if let Some(next) = chars.next() {
                            out.push(next);
                        }
                    }
                    '"' => mode = Mode::Code,
                    _ => {}
                }
            }
            Mode::LineComment => {
                if c == '\n' {
                    out.push(c);
                    mode = Mode::Code;
                }
            }
            Mode::BlockComment => {
                if c == '\n' {
                    out.push(c);
                } else if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    mode = Mode::Code;
                }
            }
        }
    }

    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const COMMENTED: &str = r#"{
        // line comment
        "buses": [
            /* block
               comment */
            { "busId": "bus1", "type": "tcp", "tcpAddr": "10.0.0.9:502" }
        ],
        "catalog": {
            "io16": {
                "vendor": "acme", "model": "IO16", // trailing comment
                "digitalInputs": { "start": 0, "count": 16 },
                "limits": { "maxCoilsPerRead": 2000, "maxInputsPerRead": 2000, "maxRegistersPerRead": 125 }
            }
        },
        "devices": { "bus1": [ { "name": "d//1", "unitId": 1, "type": "io16" } ] },
        "pollIntervalMs": 250
    }"#;

    #[test]
    fn test_comments_are_stripped() {
        let config = load_edge_config_str(COMMENTED).unwrap();
        assert_eq!(config.buses[0].bus_id, "bus1");
        assert_eq!(config.poll_interval_ms, 250);
    }

    #[test]
    fn test_slashes_inside_strings_survive() {
        let config = load_edge_config_str(COMMENTED).unwrap();
        assert_eq!(config.devices["bus1"][0].name, "d//1");
    }

    #[test]
    fn test_block_comment_preserves_line_numbers() {
        let stripped = strip_json_comments("a\n/* x\ny */\nb");
        assert_eq!(stripped, "a\n\n\nb");
    }

    #[test]
    fn test_escaped_quote_in_string() {
        let stripped = strip_json_comments(r#"{"k": "a\"b//c"}"#);
        assert_eq!(stripped, r#"{"k": "a\"b//c"}"#);
    }

    #[test]
    fn test_unknown_field_is_a_parse_error() {
        let result = load_edge_config_str(r#"{ "surprise": true }"#);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = load_edge_config("/nonexistent/edge-config.json");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
