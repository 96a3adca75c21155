// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading end to end: comments, defaults, validation,
//! resolution, and the catalog message.

use std::time::Duration;

use uhn_config::{build_edge_catalog, load_edge_config_str, BusType, Range};
use uhn_tests::common::fixtures::FULL_EDGE_CONFIG;

#[test]
fn test_full_config_parses_with_comments() {
    let config = load_edge_config_str(FULL_EDGE_CONFIG).unwrap();

    assert_eq!(config.buses.len(), 2);
    assert_eq!(config.catalog.len(), 2);
    assert_eq!(config.poll_interval_ms, 100);
    assert_eq!(config.heartbeat_interval, 2);
}

#[test]
fn test_defaults_applied_per_transport() {
    let config = load_edge_config_str(FULL_EDGE_CONFIG).unwrap();

    let rtu = &config.buses[0];
    assert_eq!(rtu.bus_type, BusType::Rtu);
    assert_eq!(rtu.data_bits, 8);
    assert_eq!(rtu.stop_bits, 1);
    assert_eq!(rtu.parity, "E");
    assert_eq!(rtu.timeout_ms, 150);
    assert_eq!(rtu.command_buffer_size, 16);

    let tcp = &config.buses[1];
    assert_eq!(tcp.bus_type, BusType::Tcp);
    assert_eq!(tcp.timeout_ms, 300);
    assert_eq!(tcp.command_buffer_size, 8);
}

#[test]
fn test_resolution_builds_device_graph() {
    let resolved = load_edge_config_str(FULL_EDGE_CONFIG)
        .unwrap()
        .resolve()
        .unwrap();

    assert_eq!(resolved.all_devices().count(), 3);
    assert_eq!(resolved.heartbeat_interval, Duration::from_secs(2));

    let front = resolved
        .all_devices()
        .find(|d| d.name == "relays-front")
        .unwrap();
    assert_eq!(front.bus.bus_id, "rs485-a");
    assert_eq!(front.catalog.capabilities.toggle_word, 0x5500);
    // Catalog settle override beats the bus value.
    assert_eq!(front.settle_before_request(), Duration::from_millis(12));
    assert_eq!(front.settle_after_write(), Duration::from_millis(10));

    let mixer = resolved.all_devices().find(|d| d.name == "mixer").unwrap();
    assert_eq!(mixer.request_timeout(), Duration::from_millis(300));

    // Per-bus poll override.
    let lan = resolved.buses.iter().find(|b| b.spec.bus_id == "lan").unwrap();
    assert_eq!(lan.poll_period(resolved.poll_interval), Duration::from_millis(500));
}

#[test]
fn test_catalog_message_covers_all_devices() {
    let resolved = load_edge_config_str(FULL_EDGE_CONFIG)
        .unwrap()
        .resolve()
        .unwrap();
    let catalog = build_edge_catalog(&resolved);

    assert_eq!(catalog.devices.len(), 3);

    let mixer = catalog.devices.iter().find(|d| d.name == "mixer").unwrap();
    assert_eq!(mixer.bus_id, "lan");
    assert_eq!(mixer.digital_outputs, Some(Range { start: 0, count: 4 }));
    assert_eq!(mixer.analog_inputs, Some(Range { start: 8, count: 2 }));

    let json = serde_json::to_value(&catalog).unwrap();
    assert_eq!(json["devices"][0]["unitId"], 1);
}

#[test]
fn test_tcp_bus_requires_address() {
    let broken = FULL_EDGE_CONFIG.replace("\"tcpAddr\": \"10.20.0.40:502\",", "");
    let err = load_edge_config_str(&broken).unwrap_err().to_string();
    assert!(err.contains("tcpAddr is required"), "got: {}", err);
}

#[test]
fn test_zero_poll_interval_rejected() {
    let broken = FULL_EDGE_CONFIG.replace("\"pollIntervalMs\": 100", "\"pollIntervalMs\": 0");
    let err = load_edge_config_str(&broken).unwrap_err().to_string();
    assert!(err.contains("pollIntervalMs must be > 0"), "got: {}", err);
}

#[test]
fn test_unknown_top_level_field_rejected() {
    let broken = FULL_EDGE_CONFIG.replace(
        "\"pollIntervalMs\": 100",
        "\"pollIntervalMs\": 100, \"extraKnob\": true",
    );
    assert!(load_edge_config_str(&broken).is_err());
}
