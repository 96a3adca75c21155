// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uhn-broker
//!
//! Northbound MQTT layer for the UHN edge gateway.
//!
//! Two layers:
//!
//! - [`MsgBroker`] wraps the `rumqttc` client: topic prefixing, QoS mapping,
//!   per-operation timeouts, an on-connect publisher registry replayed on
//!   every reconnection, and wildcard-aware message dispatch.
//! - [`EdgeBroker`] adds the edge semantics: publish-dedup with heartbeats
//!   over the [`EdgeStateStore`](uhn_core::EdgeStateStore), the retained
//!   catalog, and the command-plane subscriptions (`device/+/cmd`, `cmd`).
//!
//! Every user-visible topic is prefixed with `uhn/{edgeName}/`; callers deal
//! in topic tails only.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod broker;
pub mod catalog;
pub mod edge;

pub use broker::{
    BrokerConfig, MessageHandler, MsgBroker, OnConnectPublisher, PublishRequest, QosLevel,
};
pub use catalog::CatalogPublisher;
pub use edge::EdgeBroker;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
