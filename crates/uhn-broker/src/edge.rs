// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Edge-level broker semantics.
//!
//! [`EdgeBroker`] layers three things over [`MsgBroker`]:
//!
//! - state publishing with change dedup and heartbeats
//!   (`device/{name}/state`, retained, QoS 0)
//! - the command plane: QoS 1 subscriptions on `device/+/cmd` and `cmd`,
//!   demultiplexed by topic shape and delivered to an
//!   [`EdgeSubscriber`](uhn_core::EdgeSubscriber)
//! - resync: clearing the dedup store forces full republication

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use uhn_core::error::BrokerResult;
use uhn_core::state::EdgeStateStore;
use uhn_core::traits::{EdgePublisher, EdgeSubscriber};
use uhn_core::types::{DeviceState, IncomingCommand, IncomingDeviceCommand};

use crate::broker::{BrokerConfig, MessageHandler, MsgBroker, OnConnectPublisher, QosLevel};

// =============================================================================
// EdgeBroker
// =============================================================================

/// Northbound broker with edge publish/command semantics.
pub struct EdgeBroker {
    broker: MsgBroker,
    state: EdgeStateStore,
    heartbeat_interval: Duration,
}

impl EdgeBroker {
    /// Creates the edge broker; `heartbeat_interval` of zero disables
    /// heartbeat republishes.
    pub fn new(config: BrokerConfig, heartbeat_interval: Duration) -> BrokerResult<Self> {
        Ok(Self {
            broker: MsgBroker::new(config)?,
            state: EdgeStateStore::new(),
            heartbeat_interval,
        })
    }

    /// Registers the retained catalog publisher under the id `catalog`.
    pub fn register_catalog(&self, publisher: Arc<dyn OnConnectPublisher>) {
        self.broker.add_on_connect_publisher("catalog", publisher);
    }

    /// Waits for the initial broker connection.
    pub async fn connect(&self) -> BrokerResult<()> {
        self.broker.connect().await
    }

    /// Subscribes the command plane and routes messages to `subscriber`.
    pub async fn start_command_plane(
        &self,
        subscriber: Arc<dyn EdgeSubscriber>,
    ) -> BrokerResult<()> {
        let demux = Arc::new(CommandDemux {
            prefix_segments: self.broker.topic_prefix().split('/').count(),
            subscriber,
        });

        self.broker
            .subscribe("device/+/cmd", QosLevel::AtLeastOnce, demux.clone())
            .await?;
        self.broker.subscribe("cmd", QosLevel::AtLeastOnce, demux).await?;
        Ok(())
    }

    /// Underlying broker, for auxiliary publishes.
    pub fn broker(&self) -> &MsgBroker {
        &self.broker
    }

    /// Disconnects from the fabric.
    pub async fn close(&self) {
        self.broker.close().await;
    }

    fn should_publish(&self, state: &DeviceState) -> bool {
        self.state.needs_publish(state, self.heartbeat_interval)
    }

}

#[async_trait]
impl EdgePublisher for EdgeBroker {
    async fn publish_device_state(&self, state: DeviceState) -> BrokerResult<()> {
        if !self.should_publish(&state) {
            return Ok(());
        }

        debug!(device = %state.name, status = %state.status, "Publishing device state");
        let topic = format!("device/{}/state", state.name);
        self.broker
            .publish_json(&topic, QosLevel::AtMostOnce, true, &state)
            .await?;

        // Only a successful publish moves the dedup snapshot.
        self.state.update(state);
        Ok(())
    }

    fn clear_published_state(&self) {
        self.state.clear();
    }
}

// =============================================================================
// Command demux
// =============================================================================

/// Splits the command plane by topic shape:
///
/// ```text
/// {prefix}/cmd                  -> global command
/// {prefix}/device/{name}/cmd    -> device command
/// ```
struct CommandDemux {
    prefix_segments: usize,
    subscriber: Arc<dyn EdgeSubscriber>,
}

#[async_trait]
impl MessageHandler for CommandDemux {
    async fn on_message(&self, topic: &str, payload: &[u8]) {
        let parts: Vec<&str> = topic.split('/').collect();

        if parts.len() == self.prefix_segments + 1 && parts[self.prefix_segments] == "cmd" {
            self.on_global_command(topic, payload).await;
            return;
        }

        if parts.len() == self.prefix_segments + 3
            && parts[self.prefix_segments] == "device"
            && parts[self.prefix_segments + 2] == "cmd"
        {
            self.on_device_command(parts[self.prefix_segments + 1], payload).await;
            return;
        }

        warn!(topic = %topic, "cmd topic malformed");
    }
}

impl CommandDemux {
    async fn on_global_command(&self, topic: &str, payload: &[u8]) {
        debug!(topic = %topic, "Received global command");
        let command: IncomingCommand = match serde_json::from_slice(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!(topic = %topic, error = %e, "cmd payload malformed");
                return;
            }
        };
        if let Err(e) = self.subscriber.on_command(command).await {
            warn!(error = %e, "cmd handling failed");
        }
    }

    async fn on_device_command(&self, device_name: &str, payload: &[u8]) {
        debug!(device = %device_name, "Received device command");
        let mut command: IncomingDeviceCommand = match serde_json::from_slice(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!(device = %device_name, error = %e, "cmd payload malformed");
                return;
            }
        };
        // The topic segment is authoritative for the device name.
        command.device = device_name.to_string();

        if let Err(e) = self.subscriber.on_device_command(command).await {
            warn!(device = %device_name, error = %e, "cmd handling failed");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use uhn_core::error::CommandResult;

    #[derive(Default)]
    struct RecordingSubscriber {
        device_commands: Mutex<Vec<IncomingDeviceCommand>>,
        global_commands: Mutex<Vec<IncomingCommand>>,
    }

    #[async_trait]
    impl EdgeSubscriber for RecordingSubscriber {
        async fn on_device_command(&self, command: IncomingDeviceCommand) -> CommandResult<()> {
            self.device_commands.lock().unwrap().push(command);
            Ok(())
        }

        async fn on_command(&self, command: IncomingCommand) -> CommandResult<()> {
            self.global_commands.lock().unwrap().push(command);
            Ok(())
        }
    }

    fn demux_with_recorder() -> (CommandDemux, Arc<RecordingSubscriber>) {
        let subscriber = Arc::new(RecordingSubscriber::default());
        let demux = CommandDemux {
            prefix_segments: 2, // "uhn/edge1"
            subscriber: subscriber.clone(),
        };
        (demux, subscriber)
    }

    #[tokio::test]
    async fn test_device_command_demux_takes_name_from_topic() {
        let (demux, recorder) = demux_with_recorder();

        demux
            .on_message(
                "uhn/edge1/device/d7/cmd",
                br#"{"action":"setDigitalOutput","device":"spoofed","address":3,"value":1}"#,
            )
            .await;

        let commands = recorder.device_commands.lock().unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].device, "d7");
        assert_eq!(commands[0].action, "setDigitalOutput");
    }

    #[tokio::test]
    async fn test_global_command_demux() {
        let (demux, recorder) = demux_with_recorder();

        demux.on_message("uhn/edge1/cmd", br#"{"action":"resync"}"#).await;

        let commands = recorder.global_commands.lock().unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].action, "resync");
    }

    #[tokio::test]
    async fn test_malformed_topic_and_payload_dropped() {
        let (demux, recorder) = demux_with_recorder();

        demux.on_message("uhn/edge1/device/cmd", b"{}").await;
        demux.on_message("uhn/edge1/weird/extra/level/cmd", b"{}").await;
        demux.on_message("uhn/edge1/device/d1/cmd", b"not-json").await;
        demux.on_message("uhn/edge1/cmd", b"not-json").await;

        assert!(recorder.device_commands.lock().unwrap().is_empty());
        assert!(recorder.global_commands.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_should_publish_dedup_and_clear() {
        let config = BrokerConfig::for_edge("tcp://127.0.0.1:1", "edge1");
        let edge = EdgeBroker::new(config, Duration::ZERO).unwrap();

        let mut state = DeviceState::now("d1");
        state.digital_outputs = Some(vec![0x05]);

        // Never published: changed.
        assert!(edge.should_publish(&state));
        edge.state.update(state.clone());

        // Identical payload, heartbeats disabled: suppressed.
        let mut again = state.clone();
        again.timestamp = chrono::Utc::now();
        assert!(!edge.should_publish(&again));

        // Data change: published.
        let mut changed = state.clone();
        changed.digital_outputs = Some(vec![0x04]);
        assert!(edge.should_publish(&changed));

        // Resync clears the store: republished even if identical.
        edge.clear_published_state();
        assert!(edge.should_publish(&again));

        edge.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_publish_heartbeat_elapsed() {
        let config = BrokerConfig::for_edge("tcp://127.0.0.1:1", "edge1");
        let edge = EdgeBroker::new(config, Duration::from_secs(2)).unwrap();

        let state = DeviceState::now("d1");
        edge.state.update(state.clone());

        let mut same = state.clone();
        same.timestamp = chrono::Utc::now();

        // Within the interval: suppressed.
        assert!(!edge.should_publish(&same));

        // After the interval the heartbeat fires even without changes.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(edge.should_publish(&same));

        edge.close().await;
    }
}
