//! MQTT transport over `rumqttc`.
//!
//! Publishes and subscriptions use QoS 0 (fire-and-forget). A background
//! task drives the `rumqttc` event loop:
//!
//! - the first `ConnAck` (or connection error) resolves [`Transport::connect`]
//! - incoming publishes are dispatched to the callback of every matching
//!   subscription, exact topics first, then wildcard patterns
//! - after a connection error the loop keeps polling, which makes `rumqttc`
//!   reconnect; a later `ConnAck` without a present session fires the
//!   reconnect listener so the client re-issues its subscriptions

use crate::address::BrokerAddress;
use crate::error::{TransportError, TransportResult};
use crate::traits::{Callback, ReconnectListener, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use corelib::{topic, Topic};
use parking_lot::{Mutex, RwLock};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the request channel between `AsyncClient` and the event loop.
const REQUEST_CAPACITY: usize = 100;
/// Delay between reconnect attempts after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Smallest keep-alive the broker is offered.
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Connection settings for [`MqttTransport`].
#[derive(Clone, Debug)]
pub struct MqttConfig {
    pub address: BrokerAddress,
    pub client_id: String,
    pub keep_alive: Duration,
    pub clean_session: bool,
}

impl MqttConfig {
    pub fn new(address: BrokerAddress, client_id: impl Into<String>) -> Self {
        Self {
            address,
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(30),
            clean_session: true,
        }
    }
}

type Routes = Arc<RwLock<HashMap<Topic, Callback>>>;
type SharedListener = Arc<RwLock<Option<ReconnectListener>>>;

struct Connection {
    client: AsyncClient,
    cancel: CancellationToken,
}

pub struct MqttTransport {
    config: MqttConfig,
    options: MqttOptions,
    connection: Mutex<Option<Connection>>,
    routes: Routes,
    listener: SharedListener,
}

impl MqttTransport {
    /// Build a transport; only `tcp` and `mqtt` schemes are supported.
    pub fn new(config: MqttConfig) -> TransportResult<Self> {
        match config.address.scheme.as_str() {
            "tcp" | "mqtt" => {}
            other => return Err(TransportError::UnsupportedScheme(other.to_string())),
        }

        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.address.host.clone(),
            config.address.port,
        );
        options.set_keep_alive(config.keep_alive.max(MIN_KEEP_ALIVE));
        options.set_clean_session(config.clean_session);

        Ok(Self {
            config,
            options,
            connection: Mutex::new(None),
            routes: Arc::new(RwLock::new(HashMap::new())),
            listener: Arc::new(RwLock::new(None)),
        })
    }

    pub fn address(&self) -> &BrokerAddress {
        &self.config.address
    }

    fn client(&self) -> TransportResult<AsyncClient> {
        self.connection
            .lock()
            .as_ref()
            .map(|connection| connection.client.clone())
            .ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&self) -> TransportResult<()> {
        if self.connection.lock().is_some() {
            return Ok(());
        }

        info!(address = %self.config.address, client_id = %self.config.client_id, "connecting to MQTT broker");
        let (client, event_loop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        tokio::spawn(run_event_loop(
            event_loop,
            Arc::clone(&self.routes),
            Arc::clone(&self.listener),
            cancel.clone(),
            ready_tx,
        ));

        let outcome = match ready_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err("event loop exited before connecting".to_string()),
        };
        match outcome {
            Ok(()) => {
                *self.connection.lock() = Some(Connection { client, cancel });
                Ok(())
            }
            Err(reason) => {
                cancel.cancel();
                Err(TransportError::Connect {
                    address: self.config.address.to_string(),
                    reason,
                })
            }
        }
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> TransportResult<()> {
        let client = self.client()?;
        client
            .publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .await
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, topic: &str, callback: Callback) -> TransportResult<()> {
        let client = self.client()?;
        self.routes
            .write()
            .insert(topic.to_string(), Arc::clone(&callback));
        if let Err(e) = client.subscribe(topic, QoS::AtMostOnce).await {
            remove_route_if_same(&self.routes, topic, &callback);
            return Err(TransportError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> TransportResult<()> {
        self.routes.write().remove(topic);
        let client = self.client()?;
        client
            .unsubscribe(topic)
            .await
            .map_err(|e| TransportError::Unsubscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn disconnect(&self) -> TransportResult<()> {
        let connection = self.connection.lock().take();
        self.routes.write().clear();
        let Some(connection) = connection else {
            return Ok(());
        };

        let result = connection.client.disconnect().await;
        connection.cancel.cancel();
        result.map_err(|e| TransportError::Disconnect {
            address: self.config.address.to_string(),
            reason: e.to_string(),
        })
    }

    fn set_reconnect_listener(&self, listener: ReconnectListener) {
        *self.listener.write() = Some(listener);
    }

    fn name(&self) -> &'static str {
        "mqtt"
    }
}

async fn run_event_loop(
    mut event_loop: EventLoop,
    routes: Routes,
    listener: SharedListener,
    cancel: CancellationToken,
    ready: oneshot::Sender<Result<(), String>>,
) {
    let mut ready = Some(ready);

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = event_loop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if let Some(ready) = ready.take() {
                    info!("MQTT session established");
                    let _ = ready.send(Ok(()));
                } else if !ack.session_present {
                    info!("MQTT session re-established without state");
                    let listener = listener.read().clone();
                    if let Some(listener) = listener {
                        listener();
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                dispatch(&routes, &publish.topic, publish.payload);
            }
            Ok(_) => {}
            Err(e) => {
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Err(e.to_string()));
                    break;
                }
                warn!(error = %e, "MQTT connection error, reconnecting");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }

    debug!("MQTT event loop exited");
}

/// Drop the route for `topic` unless a later subscribe already replaced it.
fn remove_route_if_same(routes: &Routes, topic: &str, callback: &Callback) {
    let mut routes = routes.write();
    if routes
        .get(topic)
        .is_some_and(|current| Arc::ptr_eq(current, callback))
    {
        routes.remove(topic);
    }
}

/// Invoke every callback whose topic or pattern matches `topic`.
fn dispatch(routes: &Routes, topic: &str, payload: Bytes) {
    let callbacks: Vec<Callback> = {
        let routes = routes.read();
        match routes.get(topic) {
            Some(callback) => vec![Arc::clone(callback)],
            None => routes
                .iter()
                .filter(|(pattern, _)| topic::is_pattern(pattern) && topic::matches(pattern, topic))
                .map(|(_, callback)| Arc::clone(callback))
                .collect(),
        }
    };

    if callbacks.is_empty() {
        debug!(topic, "no subscription for incoming publish");
    }
    for callback in callbacks {
        callback(payload.clone());
    }
}
