// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! MQTT client wrapper.
//!
//! `MsgBroker` drives a `rumqttc` event loop on its own task. The event loop
//! owns reconnection; this wrapper observes `ConnAck` packets to confirm the
//! initial connection, re-establish subscriptions, and replay the registered
//! on-connect publishers (the retained catalog being the canonical one).
//!
//! Timeout mapping: `rumqttc` has no per-publish delivery token, so the
//! enqueue await wrapped in a timeout is the equivalent guard. `AsyncNoWait`
//! bypasses even that via `try_publish` at QoS 0.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use uhn_core::error::{BrokerError, BrokerResult};

// =============================================================================
// Configuration
// =============================================================================

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker URL, `tcp://host:port`.
    pub broker_url: String,

    /// Client name; the MQTT client id becomes `uhn-{clientName}`.
    pub client_name: String,

    /// Prefix applied to every topic, normally `uhn/{edgeName}`.
    pub topic_prefix: String,

    /// How long to wait for the first `ConnAck` at startup.
    pub connect_timeout: Duration,

    /// Publish guard timeout.
    pub publish_timeout: Duration,

    /// Subscribe guard timeout.
    pub subscribe_timeout: Duration,

    /// Unsubscribe guard timeout.
    pub unsubscribe_timeout: Duration,
}

impl BrokerConfig {
    /// Creates a config with default timeouts for the given edge.
    pub fn for_edge(broker_url: impl Into<String>, edge_name: impl Into<String>) -> Self {
        let edge_name = edge_name.into();
        Self {
            broker_url: broker_url.into(),
            topic_prefix: format!("uhn/{}", edge_name),
            client_name: edge_name,
            connect_timeout: Duration::from_secs(10),
            publish_timeout: Duration::from_secs(5),
            subscribe_timeout: Duration::from_secs(5),
            unsubscribe_timeout: Duration::from_secs(3),
        }
    }
}

// =============================================================================
// QoS
// =============================================================================

/// Publish/subscribe service levels.
///
/// Values 0..=2 map to the standard MQTT levels. [`QosLevel::AsyncNoWait`]
/// publishes at QoS 0 without waiting at all: no enqueue guard, no timeout
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosLevel {
    /// QoS 0.
    AtMostOnce,
    /// QoS 1.
    AtLeastOnce,
    /// QoS 2.
    ExactlyOnce,
    /// QoS 0, pure fire-and-forget.
    AsyncNoWait,
}

impl QosLevel {
    /// The wire-level QoS this maps to.
    pub fn wire_qos(&self) -> QoS {
        match self {
            Self::AtMostOnce | Self::AsyncNoWait => QoS::AtMostOnce,
            Self::AtLeastOnce => QoS::AtLeastOnce,
            Self::ExactlyOnce => QoS::ExactlyOnce,
        }
    }

    /// Whether the caller waits on the publish guard.
    pub fn waits(&self) -> bool {
        !matches!(self, Self::AsyncNoWait)
    }
}

// =============================================================================
// Contracts
// =============================================================================

/// A message to publish, with the topic given as a tail (unprefixed).
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Topic tail, e.g. `catalog`.
    pub topic: String,
    /// Service level.
    pub qos: QosLevel,
    /// Retain flag.
    pub retain: bool,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl PublishRequest {
    /// Builds a request with a JSON-serialized payload.
    pub fn json<T: Serialize>(
        topic: impl Into<String>,
        qos: QosLevel,
        retain: bool,
        value: &T,
    ) -> BrokerResult<Self> {
        Ok(Self {
            topic: topic.into(),
            qos,
            retain,
            payload: serde_json::to_vec(value)?,
        })
    }
}

/// Produces a message to publish on every (re)connection.
#[async_trait]
pub trait OnConnectPublisher: Send + Sync {
    /// Returns the message to publish for this connection.
    async fn publish_request(&self) -> BrokerResult<PublishRequest>;
}

/// Receives messages matching a subscription.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one inbound message. `topic` is the full (prefixed) topic.
    async fn on_message(&self, topic: &str, payload: &[u8]);
}

// =============================================================================
// MsgBroker
// =============================================================================

struct SubscriptionEntry {
    filter: String,
    qos: QoS,
    handler: Arc<dyn MessageHandler>,
}

struct BrokerShared {
    topic_prefix: String,
    connected: AtomicBool,
    connack_tx: watch::Sender<bool>,
    subs: Mutex<Vec<SubscriptionEntry>>,
    on_connect: Mutex<HashMap<String, Arc<dyn OnConnectPublisher>>>,
}

/// MQTT wrapper with prefixed topics and an on-connect publish hook.
pub struct MsgBroker {
    config: BrokerConfig,
    client: AsyncClient,
    shared: Arc<BrokerShared>,
    connack_rx: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl MsgBroker {
    /// Creates the broker and starts its event loop task.
    ///
    /// The first `ConnAck` is confirmed by [`connect`](Self::connect);
    /// reconnections afterwards are automatic.
    pub fn new(config: BrokerConfig) -> BrokerResult<Self> {
        let (host, port) = parse_broker_url(&config.broker_url)?;

        let mut options = MqttOptions::new(format!("uhn-{}", config.client_name), host, port);
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_session(true);

        let (client, event_loop) = AsyncClient::new(options, 64);

        let (connack_tx, connack_rx) = watch::channel(false);
        let shared = Arc::new(BrokerShared {
            topic_prefix: config.topic_prefix.clone(),
            connected: AtomicBool::new(false),
            connack_tx,
            subs: Mutex::new(Vec::new()),
            on_connect: Mutex::new(HashMap::new()),
        });

        let cancel = CancellationToken::new();
        tokio::spawn(run_event_loop(
            event_loop,
            Arc::clone(&shared),
            client.clone(),
            config.publish_timeout,
            cancel.clone(),
        ));

        Ok(Self {
            config,
            client,
            shared,
            connack_rx,
            cancel,
        })
    }

    /// Waits for the initial connection to be confirmed.
    pub async fn connect(&self) -> BrokerResult<()> {
        let mut rx = self.connack_rx.clone();
        let deadline = self.config.connect_timeout;

        timeout(deadline, async {
            loop {
                if *rx.borrow() {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await
        .map_err(|_| BrokerError::ConnectTimeout { duration: deadline })?;

        if self.is_connected() {
            Ok(())
        } else {
            Err(BrokerError::ConnectTimeout { duration: deadline })
        }
    }

    /// Returns `true` while the transport-level session is up.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Builds the full topic from a tail.
    pub fn topic(&self, tail: &str) -> String {
        format!("{}/{}", self.config.topic_prefix, tail)
    }

    /// The configured topic prefix.
    pub fn topic_prefix(&self) -> &str {
        &self.config.topic_prefix
    }

    /// Registers a publisher invoked on every (re)connection.
    pub fn add_on_connect_publisher(&self, id: impl Into<String>, publisher: Arc<dyn OnConnectPublisher>) {
        self.shared
            .on_connect
            .lock()
            .expect("on-connect registry lock poisoned")
            .insert(id.into(), publisher);
    }

    /// Removes an on-connect publisher.
    pub fn remove_on_connect_publisher(&self, id: &str) {
        self.shared
            .on_connect
            .lock()
            .expect("on-connect registry lock poisoned")
            .remove(id);
    }

    /// Publishes raw bytes to a topic tail.
    pub async fn publish(
        &self,
        topic_tail: &str,
        qos: QosLevel,
        retain: bool,
        payload: Vec<u8>,
    ) -> BrokerResult<()> {
        let topic = self.topic(topic_tail);
        publish_full(&self.client, &topic, qos, retain, payload, self.config.publish_timeout).await
    }

    /// Publishes a JSON-serialized payload to a topic tail.
    pub async fn publish_json<T: Serialize>(
        &self,
        topic_tail: &str,
        qos: QosLevel,
        retain: bool,
        value: &T,
    ) -> BrokerResult<()> {
        let payload = serde_json::to_vec(value)?;
        self.publish(topic_tail, qos, retain, payload).await
    }

    /// Subscribes to a topic tail and registers the handler for it.
    ///
    /// The subscription is replayed automatically after reconnections.
    pub async fn subscribe(
        &self,
        topic_tail: &str,
        qos: QosLevel,
        handler: Arc<dyn MessageHandler>,
    ) -> BrokerResult<()> {
        let filter = self.topic(topic_tail);
        let wire_qos = qos.wire_qos();
        let deadline = self.config.subscribe_timeout;

        timeout(deadline, self.client.subscribe(filter.clone(), wire_qos))
            .await
            .map_err(|_| BrokerError::timeout("subscribe", deadline))?
            .map_err(|e| BrokerError::client(e.to_string()))?;

        self.shared
            .subs
            .lock()
            .expect("subscription table lock poisoned")
            .push(SubscriptionEntry {
                filter,
                qos: wire_qos,
                handler,
            });

        Ok(())
    }

    /// Unsubscribes from a topic tail and drops its handler.
    pub async fn unsubscribe(&self, topic_tail: &str) -> BrokerResult<()> {
        let filter = self.topic(topic_tail);
        let deadline = self.config.unsubscribe_timeout;

        timeout(deadline, self.client.unsubscribe(filter.clone()))
            .await
            .map_err(|_| BrokerError::timeout("unsubscribe", deadline))?
            .map_err(|e| BrokerError::client(e.to_string()))?;

        self.shared
            .subs
            .lock()
            .expect("subscription table lock poisoned")
            .retain(|s| s.filter != filter);

        Ok(())
    }

    /// Stops the event loop and disconnects.
    pub async fn close(&self) {
        self.cancel.cancel();
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "MQTT disconnect");
        }
    }
}

impl std::fmt::Debug for MsgBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsgBroker")
            .field("broker_url", &self.config.broker_url)
            .field("prefix", &self.config.topic_prefix)
            .field("connected", &self.is_connected())
            .finish()
    }
}

async fn publish_full(
    client: &AsyncClient,
    topic: &str,
    qos: QosLevel,
    retain: bool,
    payload: Vec<u8>,
    publish_timeout: Duration,
) -> BrokerResult<()> {
    if !qos.waits() {
        return client
            .try_publish(topic, qos.wire_qos(), retain, payload)
            .map_err(|e| BrokerError::client(e.to_string()));
    }

    timeout(publish_timeout, client.publish(topic, qos.wire_qos(), retain, payload))
        .await
        .map_err(|_| BrokerError::timeout("publish", publish_timeout))?
        .map_err(|e| BrokerError::client(e.to_string()))
}

// =============================================================================
// Event loop
// =============================================================================

async fn run_event_loop(
    mut event_loop: EventLoop,
    shared: Arc<BrokerShared>,
    client: AsyncClient,
    publish_timeout: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("MQTT event loop stopped");
                return;
            }
            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    shared.connected.store(true, Ordering::SeqCst);
                    let _ = shared.connack_tx.send(true);
                    info!("MQTT session established");
                    on_connected(&shared, &client, publish_timeout).await;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    dispatch(&shared, publish.topic, publish.payload.to_vec());
                }
                Ok(_) => {}
                Err(e) => {
                    if shared.connected.swap(false, Ordering::SeqCst) {
                        warn!(error = %e, "MQTT connection lost, reconnecting");
                    }
                    // The next poll() redials; pace it.
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

/// Replays subscriptions and on-connect publishers after a `ConnAck`.
async fn on_connected(shared: &Arc<BrokerShared>, client: &AsyncClient, publish_timeout: Duration) {
    let filters: Vec<(String, QoS)> = {
        let subs = shared.subs.lock().expect("subscription table lock poisoned");
        subs.iter().map(|s| (s.filter.clone(), s.qos)).collect()
    };
    for (filter, qos) in filters {
        if let Err(e) = client.subscribe(filter.clone(), qos).await {
            error!(filter = %filter, error = %e, "resubscribe failed");
        }
    }

    let publishers: Vec<(String, Arc<dyn OnConnectPublisher>)> = {
        let registry = shared
            .on_connect
            .lock()
            .expect("on-connect registry lock poisoned");
        registry.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
    };

    for (id, publisher) in publishers {
        let request = match publisher.publish_request().await {
            Ok(request) => request,
            Err(e) => {
                error!(id = %id, error = %e, "on-connect publisher failed");
                continue;
            }
        };

        // Requests carry topic tails; expand with the broker prefix.
        let topic = format!("{}/{}", shared.topic_prefix, request.topic);
        if let Err(e) = publish_full(
            client,
            &topic,
            request.qos,
            request.retain,
            request.payload,
            publish_timeout,
        )
        .await
        {
            error!(id = %id, topic = %topic, error = %e, "on-connect publish failed");
        }
    }
}

fn dispatch(shared: &Arc<BrokerShared>, topic: String, payload: Vec<u8>) {
    let handlers: Vec<Arc<dyn MessageHandler>> = {
        let subs = shared.subs.lock().expect("subscription table lock poisoned");
        subs.iter()
            .filter(|s| topic_matches(&s.filter, &topic))
            .map(|s| Arc::clone(&s.handler))
            .collect()
    };

    if handlers.is_empty() {
        debug!(topic = %topic, "no handler for message");
        return;
    }

    for handler in handlers {
        let topic = topic.clone();
        let payload = payload.clone();
        tokio::spawn(async move {
            // A panicking handler must not take the dispatcher down.
            let result = std::panic::AssertUnwindSafe(handler.on_message(&topic, &payload))
                .catch_unwind()
                .await;
            if result.is_err() {
                error!(topic = %topic, "message handler panicked");
            }
        });
    }
}

/// MQTT topic filter matching with `+` and `#` wildcards.
pub(crate) fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_parts = filter.split('/');
    let mut topic_parts = topic.split('/');

    loop {
        match (filter_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Parses `tcp://host:port` (scheme optional, port defaults to 1883).
fn parse_broker_url(url: &str) -> BrokerResult<(String, u16)> {
    let stripped = url
        .strip_prefix("tcp://")
        .or_else(|| url.strip_prefix("mqtt://"))
        .unwrap_or(url);

    match stripped.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| BrokerError::client(format!("invalid broker port in {:?}", url)))?;
            Ok((host.to_string(), port))
        }
        None => Ok((stripped.to_string(), 1883)),
    }
}

// =============================================================================
// Tests
// =============================================================================
