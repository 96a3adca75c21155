// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error hierarchy for the gateway.
//!
//! Each subsystem has its own error enum:
//!
//! ```text
//! ClientError   - Modbus device client (connect, read, write, timeouts)
//! BrokerError   - Northbound MQTT layer
//! CommandError  - Command-plane resolution and enqueueing
//! ```
//!
//! Inside a bus loop every error is recovered: it ends up in a
//! `DeviceState.errors` entry or a log line and the loop continues. Errors
//! are only fatal during startup, which the binary crate handles.

use std::time::Duration;

use thiserror::Error;

// =============================================================================
// ClientError
// =============================================================================

/// Errors from the Modbus device client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport could not be established.
    #[error("connect: {message}")]
    Connect {
        /// Underlying failure description.
        message: String,
    },

    /// Operation attempted without an established transport.
    #[error("not connected")]
    NotConnected,

    /// A Modbus request did not complete within the per-request timeout.
    #[error("timeout after {duration:?}")]
    Timeout {
        /// The timeout that elapsed.
        duration: Duration,
    },

    /// A read function code failed.
    #[error("read failed at {address}+{count}: {message}")]
    Read {
        /// Starting address of the failed request.
        address: u16,
        /// Quantity requested.
        count: u16,
        /// Underlying failure description.
        message: String,
    },

    /// A write function code failed.
    #[error("write failed at {address}: {message}")]
    Write {
        /// Target address.
        address: u16,
        /// Underlying failure description.
        message: String,
    },

    /// The device answered with a Modbus exception.
    #[error("modbus exception 0x{code:02X}")]
    Exception {
        /// Raw exception code from the wire.
        code: u8,
    },

    /// The device returned zero bytes where at least one was expected.
    #[error("empty response")]
    EmptyResponse,

    /// The operation was cancelled by shutdown.
    #[error("cancelled")]
    Cancelled,
}

impl ClientError {
    /// Creates a connect failure.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect { message: message.into() }
    }

    /// Creates a read failure.
    pub fn read(address: u16, count: u16, message: impl Into<String>) -> Self {
        Self::Read {
            address,
            count,
            message: message.into(),
        }
    }

    /// Creates a write failure.
    pub fn write(address: u16, message: impl Into<String>) -> Self {
        Self::Write {
            address,
            message: message.into(),
        }
    }

    /// Returns `true` if this error looks like a transport-level hiccup that
    /// a reconnect may fix.
    ///
    /// Classification is by message content, matching the failure modes of
    /// serial and TCP transports: `connection`, `broken pipe`, `reset`,
    /// `closed`, `i/o`, `timeout` (case-insensitive).
    pub fn is_transient(&self) -> bool {
        const MARKERS: [&str; 6] = [
            "connection",
            "broken pipe",
            "reset",
            "closed",
            "i/o",
            "timeout",
        ];
        let text = self.to_string().to_lowercase();
        MARKERS.iter().any(|m| text.contains(m))
    }

    /// Returns the error kind for logging and metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::NotConnected => "not_connected",
            Self::Timeout { .. } => "timeout",
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::Exception { .. } => "exception",
            Self::EmptyResponse => "empty_response",
            Self::Cancelled => "cancelled",
        }
    }
}

// =============================================================================
// BrokerError
// =============================================================================

/// Errors from the northbound MQTT layer.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Initial connection was not confirmed within the connect timeout.
    #[error("broker connect timeout after {duration:?}")]
    ConnectTimeout {
        /// The timeout that elapsed.
        duration: Duration,
    },

    /// A publish, subscribe or unsubscribe did not complete in time.
    ///
    /// Deliberately distinct from [`BrokerError::Cancelled`]: a timeout means
    /// the broker is slow or gone, cancellation means we are shutting down.
    #[error("{operation} timeout after {duration:?}")]
    Timeout {
        /// The operation that timed out (`publish`, `subscribe`, ...).
        operation: &'static str,
        /// The timeout that elapsed.
        duration: Duration,
    },

    /// The underlying MQTT client rejected the request.
    #[error("mqtt client: {message}")]
    Client {
        /// Underlying failure description.
        message: String,
    },

    /// Payload could not be serialized.
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The operation was cancelled by shutdown.
    #[error("cancelled")]
    Cancelled,
}

impl BrokerError {
    /// Creates a client-side failure.
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client { message: message.into() }
    }

    /// Creates an operation timeout.
    pub fn timeout(operation: &'static str, duration: Duration) -> Self {
        Self::Timeout { operation, duration }
    }
}

// =============================================================================
// CommandError
// =============================================================================

/// Command-plane errors; logged at warn, never fatal, never published.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// No configured device matches the addressed name.
    #[error("device not found: {device}")]
    DeviceNotFound {
        /// The unresolved device name.
        device: String,
    },

    /// The owning bus poller's command channel is full.
    #[error("command buffer full for device: {device}")]
    QueueFull {
        /// Device whose bus rejected the command.
        device: String,
    },

    /// The action is not recognized.
    #[error("unknown command action: {action}")]
    UnknownAction {
        /// The unrecognized action string.
        action: String,
    },

    /// The command topic does not match the expected shape.
    #[error("malformed command topic: {topic}")]
    MalformedTopic {
        /// The offending topic.
        topic: String,
    },

    /// The command payload is not valid JSON for the expected shape.
    #[error("malformed command payload: {message}")]
    MalformedPayload {
        /// Parse failure description.
        message: String,
    },
}

impl CommandError {
    /// Creates a device-not-found error.
    pub fn device_not_found(device: impl Into<String>) -> Self {
        Self::DeviceNotFound { device: device.into() }
    }

    /// Creates a queue-full error.
    pub fn queue_full(device: impl Into<String>) -> Self {
        Self::QueueFull { device: device.into() }
    }

    /// Creates an unknown-action error.
    pub fn unknown_action(action: impl Into<String>) -> Self {
        Self::UnknownAction { action: action.into() }
    }
}

// =============================================================================
// Result aliases
// =============================================================================

/// Result with [`ClientError`].
pub type ClientResult<T> = Result<T, ClientError>;

/// Result with [`BrokerError`].
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Result with [`CommandError`].
pub type CommandResult<T> = Result<T, CommandError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ClientError::connect("connection refused").is_transient());
        assert!(ClientError::read(0, 4, "broken pipe").is_transient());
        assert!(ClientError::read(0, 4, "Connection Reset by peer").is_transient());
        assert!(ClientError::write(3, "port closed").is_transient());
        assert!(ClientError::read(0, 1, "serial I/O failure").is_transient());
        assert!(ClientError::Timeout { duration: Duration::from_millis(150) }.is_transient());

        assert!(!ClientError::Exception { code: 0x02 }.is_transient());
        assert!(!ClientError::EmptyResponse.is_transient());
        assert!(!ClientError::read(0, 4, "illegal data address").is_transient());
    }

    #[test]
    fn test_client_error_messages() {
        let err = ClientError::connect("no such device");
        assert_eq!(err.to_string(), "connect: no such device");
        assert_eq!(err.error_type(), "connect");

        let err = ClientError::read(16, 8, "crc mismatch");
        assert_eq!(err.to_string(), "read failed at 16+8: crc mismatch");
    }

    #[test]
    fn test_broker_timeout_distinct_from_cancel() {
        let timeout = BrokerError::timeout("publish", Duration::from_secs(5));
        assert!(timeout.to_string().contains("publish timeout"));
        assert!(!matches!(timeout, BrokerError::Cancelled));
    }

    #[test]
    fn test_command_errors() {
        assert_eq!(
            CommandError::device_not_found("d9").to_string(),
            "device not found: d9"
        );
        assert_eq!(
            CommandError::queue_full("d1").to_string(),
            "command buffer full for device: d1"
        );
    }
}
