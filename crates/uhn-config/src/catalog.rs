// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Retained catalog message.
//!
//! The catalog is a structural snapshot of every configured device — name,
//! unit id, type, owning bus, and the declared bank windows. It is published
//! retained on every broker (re)connection so late subscribers can discover
//! the gateway's device population without polling.

use serde::{Deserialize, Serialize};

use crate::resolved::ResolvedConfig;
use crate::schema::Range;

/// Payload of the retained `catalog` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeCatalogMessage {
    /// Every configured device, bus declaration order.
    pub devices: Vec<DeviceSummary>,
}

/// Structural description of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    /// Device name.
    pub name: String,

    /// Modbus unit id.
    pub unit_id: u8,

    /// Catalog type key.
    #[serde(rename = "type")]
    pub device_type: String,

    /// Owning bus id.
    pub bus_id: String,

    /// Declared coil window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_outputs: Option<Range>,

    /// Declared discrete-input window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital_inputs: Option<Range>,

    /// Declared holding-register window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analog_outputs: Option<Range>,

    /// Declared input-register window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analog_inputs: Option<Range>,
}

/// Builds the catalog message from the resolved configuration.
pub fn build_edge_catalog(config: &ResolvedConfig) -> EdgeCatalogMessage {
    let devices = config
        .all_devices()
        .map(|d| DeviceSummary {
            name: d.name.clone(),
            unit_id: d.unit_id,
            device_type: d.type_key.clone(),
            bus_id: d.bus.bus_id.clone(),
            digital_outputs: d.catalog.digital_outputs,
            digital_inputs: d.catalog.digital_inputs,
            analog_outputs: d.catalog.analog_outputs,
            analog_inputs: d.catalog.analog_inputs,
        })
        .collect();

    EdgeCatalogMessage { devices }
}

// =============================================================================
// Tests
// =============================================================================
