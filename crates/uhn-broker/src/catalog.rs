// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The retained-catalog on-connect publisher.

use async_trait::async_trait;

use uhn_config::{build_edge_catalog, EdgeCatalogMessage, ResolvedConfig};
use uhn_core::error::BrokerResult;

use crate::broker::{OnConnectPublisher, PublishRequest, QosLevel};

/// Publishes the device catalog, retained at QoS 1, on every connection.
///
/// The catalog is structural only (names, unit ids, bank windows), so it is
/// built once from the resolved configuration and reused for every replay.
#[derive(Debug, Clone)]
pub struct CatalogPublisher {
    message: EdgeCatalogMessage,
}

impl CatalogPublisher {
    /// Builds the publisher from the resolved configuration.
    pub fn new(config: &ResolvedConfig) -> Self {
        Self {
            message: build_edge_catalog(config),
        }
    }

    /// The catalog snapshot this publisher announces.
    pub fn message(&self) -> &EdgeCatalogMessage {
        &self.message
    }
}

#[async_trait]
impl OnConnectPublisher for CatalogPublisher {
    async fn publish_request(&self) -> BrokerResult<PublishRequest> {
        PublishRequest::json("catalog", QosLevel::AtLeastOnce, true, &self.message)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uhn_config::load_edge_config_str;

    const CONFIG: &str = r#"{
        "buses": [ { "busId": "bus1", "type": "tcp", "tcpAddr": "10.0.0.9:502" } ],
        "catalog": {
            "io": {
                "vendor": "acme", "model": "IO",
                "digitalOutputs": { "start": 0, "count": 4 },
                "limits": { "maxCoilsPerRead": 16, "maxInputsPerRead": 16, "maxRegistersPerRead": 8 }
            }
        },
        "devices": { "bus1": [ { "name": "d1", "unitId": 1, "type": "io" } ] },
        "pollIntervalMs": 100
    }"#;

    #[tokio::test]
    async fn test_catalog_request_is_retained_at_least_once() {
        let resolved = load_edge_config_str(CONFIG).unwrap().resolve().unwrap();
        let publisher = CatalogPublisher::new(&resolved);

        let request = publisher.publish_request().await.unwrap();
        assert_eq!(request.topic, "catalog");
        assert_eq!(request.qos, QosLevel::AtLeastOnce);
        assert!(request.retain);

        let payload: serde_json::Value = serde_json::from_slice(&request.payload).unwrap();
        assert_eq!(payload["devices"][0]["name"], "d1");
    }
}
