// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Gateway runtime orchestration.
//!
//! Startup order matters: configuration first (fatal on error), then the
//! broker with its retained catalog (fatal if the initial connect times
//! out), then the bus pollers, then the command plane. Shutdown is the
//! reverse, driven by the root cancellation token with a short grace period
//! so in-flight transactions can finish.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use uhn_broker::{BrokerConfig, CatalogPublisher, EdgeBroker};
use uhn_config::load_edge_config;
use uhn_core::traits::{EdgePublisher, EdgeSubscriber};
use uhn_poller::BusPollers;

use crate::error::BinResult;
use crate::shutdown::ShutdownCoordinator;

/// How long workers get to wind down after cancellation.
const STOP_GRACE: Duration = Duration::from_millis(200);

// =============================================================================
// EdgeRuntime
// =============================================================================

/// The assembled gateway: configuration, broker, pollers, shutdown.
pub struct EdgeRuntime {
    config_path: PathBuf,
    mqtt_url: String,
    edge_name: String,
    shutdown: ShutdownCoordinator,
}

impl EdgeRuntime {
    /// Creates a builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Runs the gateway until a termination signal arrives.
    pub async fn run(self) -> BinResult<()> {
        info!(version = crate::VERSION, edge = %self.edge_name, "Starting UHN edge gateway");

        // Configuration; errors here are fatal.
        let config = load_edge_config(&self.config_path)?;
        let resolved = config.resolve()?;
        info!(
            buses = resolved.buses.len(),
            devices = resolved.all_devices().count(),
            poll_ms = resolved.poll_interval.as_millis() as u64,
            "Loaded edge configuration"
        );

        // Northbound broker with the retained catalog on its connect hook.
        let broker_config = BrokerConfig::for_edge(&self.mqtt_url, &self.edge_name);
        let edge_broker =
            Arc::new(EdgeBroker::new(broker_config, resolved.heartbeat_interval)?);
        edge_broker.register_catalog(Arc::new(CatalogPublisher::new(&resolved)));
        edge_broker.connect().await?;
        info!(url = %self.mqtt_url, "Connected to MQTT fabric");

        // Bus pollers.
        let publisher: Arc<dyn EdgePublisher> = edge_broker.clone();
        let pollers = Arc::new(BusPollers::new(&resolved, publisher));

        let root = self.shutdown.token();
        pollers.start_all(&root);

        // Command plane last: commands can only target running pollers.
        let subscriber: Arc<dyn EdgeSubscriber> = pollers.clone();
        edge_broker.start_command_plane(subscriber).await?;

        info!("UHN edge gateway is ready");
        self.shutdown.wait_for_shutdown().await;

        // Orderly teardown: let workers observe cancellation, then join
        // them, then drop the broker session.
        info!("Shutting down");
        tokio::time::sleep(STOP_GRACE).await;
        pollers.stop_all().await;
        edge_broker.close().await;

        info!("UHN edge gateway shutdown complete");
        Ok(())
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`EdgeRuntime`].
#[derive(Debug, Default)]
pub struct RuntimeBuilder {
    config_path: Option<PathBuf>,
    mqtt_url: Option<String>,
    edge_name: Option<String>,
}

impl RuntimeBuilder {
    /// Sets the configuration file path.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the MQTT broker URL.
    pub fn mqtt_url(mut self, url: impl Into<String>) -> Self {
        self.mqtt_url = Some(url.into());
        self
    }

    /// Sets the edge name (topic prefix `uhn/{edgeName}`).
    pub fn edge_name(mut self, name: impl Into<String>) -> Self {
        self.edge_name = Some(name.into());
        self
    }

    /// Builds the runtime with defaults for anything unset.
    pub fn build(self) -> EdgeRuntime {
        EdgeRuntime {
            config_path: self
                .config_path
                .unwrap_or_else(|| PathBuf::from("/etc/uhn/edge-config.json")),
            mqtt_url: self
                .mqtt_url
                .unwrap_or_else(|| "tcp://localhost:1883".to_string()),
            edge_name: self.edge_name.unwrap_or_else(|| "edge1".to_string()),
            shutdown: ShutdownCoordinator::new(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let runtime = EdgeRuntime::builder().build();
        assert_eq!(runtime.config_path, PathBuf::from("/etc/uhn/edge-config.json"));
        assert_eq!(runtime.mqtt_url, "tcp://localhost:1883");
        assert_eq!(runtime.edge_name, "edge1");
    }

    #[test]
    fn test_builder_overrides() {
        let runtime = EdgeRuntime::builder()
            .config_path("/tmp/edge.json")
            .mqtt_url("tcp://broker:1883")
            .edge_name("plant-7")
            .build();
        assert_eq!(runtime.config_path, PathBuf::from("/tmp/edge.json"));
        assert_eq!(runtime.mqtt_url, "tcp://broker:1883");
        assert_eq!(runtime.edge_name, "plant-7");
    }
}
