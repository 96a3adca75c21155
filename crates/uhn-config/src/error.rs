// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration errors. All of them are fatal at startup.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("read config '{path}': {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid JSON (after comment stripping) or contains
    /// unknown fields.
    #[error("invalid JSON: {message}")]
    Parse {
        /// Parser diagnostic.
        message: String,
    },

    /// Semantic validation failed; every problem found is listed.
    #[error("config validation failed: {}", .errors.join("; "))]
    Validation {
        /// One entry per violated rule.
        errors: Vec<String>,
    },
}

impl ConfigError {
    /// Creates an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }
}

/// Result with [`ConfigError`].
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Accumulates validation failures so a broken config reports everything
/// wrong with it in one pass.
#[derive(Debug, Default)]
pub(crate) struct ValidationErrors(Vec<String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn into_result(self) -> ConfigResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation { errors: self.0 })
        }
    }
}
