// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Shared gateway types.
//!
//! The central type here is [`DeviceState`], the canonical snapshot of one
//! polled device that is published northbound. Digital banks are packed
//! LSB-first within each byte; analog banks are big-endian 16-bit words.
//! On the wire the byte banks are base64 strings and the timestamp is
//! RFC 3339.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// DeviceStatus
// =============================================================================

/// Overall result of one device poll.
///
/// The wire representation is fixed to the strings `ok`, `partial_error`
/// and `error`; downstream consumers match on them verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Every declared bank was read successfully.
    #[default]
    Ok,
    /// At least one bank failed while another succeeded.
    PartialError,
    /// No bank could be read.
    Error,
}

impl DeviceStatus {
    /// Returns `true` if the poll succeeded completely.
    #[inline]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Derives the status from per-bank poll counters: no successful read at
    /// all is `error`, a mix is `partial_error`.
    pub const fn from_counts(successful_reads: u32, failed_reads: u32) -> Self {
        if successful_reads == 0 {
            Self::Error
        } else if failed_reads > 0 {
            Self::PartialError
        } else {
            Self::Ok
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::PartialError => "partial_error",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// DeviceState
// =============================================================================

/// Canonical snapshot of one device, published to `device/{name}/state`.
///
/// A bank field is `None` when the catalog does not declare that bank or when
/// its read failed in this poll; in the latter case the failure is recorded in
/// [`errors`](Self::errors) and [`status`](Self::status) reflects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    /// Time the poll producing this snapshot started.
    pub timestamp: DateTime<Utc>,

    /// Device name, globally unique across the gateway.
    pub name: String,

    /// Packed coil bits (FC1), LSB-first within each byte.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub digital_outputs: Option<Vec<u8>>,

    /// Packed discrete-input bits (FC2), LSB-first within each byte.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub digital_inputs: Option<Vec<u8>>,

    /// Holding registers (FC3) as big-endian 16-bit words.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub analog_outputs: Option<Vec<u8>>,

    /// Input registers (FC4) as big-endian 16-bit words.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub analog_inputs: Option<Vec<u8>>,

    /// Poll outcome.
    pub status: DeviceStatus,

    /// Per-bank failure descriptions, `"<bank>: <message>"`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl DeviceState {
    /// Creates an empty `ok` snapshot stamped with the current time.
    pub fn now(name: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            name: name.into(),
            digital_outputs: None,
            digital_inputs: None,
            analog_outputs: None,
            analog_inputs: None,
            status: DeviceStatus::Ok,
            errors: Vec::new(),
        }
    }

    /// Compares the payload of two snapshots: the four banks plus the status.
    ///
    /// Timestamp and errors are deliberately excluded so that identical data
    /// does not trigger spurious publishes.
    pub fn same_payload(&self, other: &DeviceState) -> bool {
        self.digital_outputs == other.digital_outputs
            && self.digital_inputs == other.digital_inputs
            && self.analog_outputs == other.analog_outputs
            && self.analog_inputs == other.analog_inputs
            && self.status == other.status
    }
}

/// Reads bit `index` from a packed digital bank, LSB-first within each byte.
///
/// Bit `i` of the buffer corresponds to the coil or discrete input at
/// `range.start + i` on the wire. Out-of-range indices read as `false`.
pub fn packed_bit(bytes: &[u8], index: usize) -> bool {
    bytes
        .get(index / 8)
        .map(|b| b & (1 << (index % 8)) != 0)
        .unwrap_or(false)
}

// =============================================================================
// Incoming command payloads
// =============================================================================

/// Loose JSON shape of a device command received on `device/{name}/cmd`.
///
/// `address`, `value` and `pulseMs` accept JSON numbers, decimal strings or
/// `0x`-prefixed hex strings; see [`coerce_u16`] and [`coerce_u64`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingDeviceCommand {
    /// Optional caller-chosen correlation id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Device name; overridden by the topic segment.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device: String,

    /// Command action, e.g. `setDigitalOutput`.
    pub action: String,

    /// Target address within the bank.
    #[serde(default)]
    pub address: serde_json::Value,

    /// 0 = off, 1 = on, 2 = toggle.
    #[serde(default)]
    pub value: serde_json::Value,

    /// Auto-revert delay in milliseconds; 0 disables the pulse.
    #[serde(default)]
    pub pulse_ms: serde_json::Value,
}

/// Loose JSON shape of a global command received on `cmd`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingCommand {
    /// Command action; `resync` is the only recognized value.
    pub action: String,
}

// =============================================================================
// Numeric coercion
// =============================================================================

/// Coerces a loose JSON value into a `u16`.
///
/// Accepts numbers, decimal strings, and `0x`/`0X`-prefixed hex strings.
/// Unparseable or out-of-range input coerces to 0.
pub fn coerce_u16(value: &serde_json::Value) -> u16 {
    coerce_u64(value).try_into().unwrap_or(0)
}

/// Coerces a loose JSON value into a `u64`; same rules as [`coerce_u16`].
pub fn coerce_u64(value: &serde_json::Value) -> u64 {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                u
            } else {
                // Fractional or negative numbers coerce through zero.
                n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64).unwrap_or(0)
            }
        }
        serde_json::Value::String(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u64::from_str_radix(hex, 16).unwrap_or(0)
            } else {
                s.parse().unwrap_or(0)
            }
        }
        _ => 0,
    }
}

// =============================================================================
// base64 serde adapter
// =============================================================================

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => STANDARD
                .decode(s.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
