//! Namespace node.
//!
//! A node exclusively owns one transport-backed client, its parsed
//! descriptor and the capability tables derived from it. The descriptor is
//! parsed before any network activity and never changes afterwards.
//!
//! # Example
//!
//! ```rust,no_run
//! use corelib::Descriptor;
//! use node::{Node, NodeConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let descriptor = Descriptor::from_json(
//!     r#"{"end_point": "app", "requests": [{"type": "float", "link": "dev1/sensors/temp"}]}"#,
//! )?;
//! let node = Node::from_config(descriptor, &NodeConfig::default())?;
//! node.start().await?;
//! let temp = node.get("dev1/sensors/temp").await?;
//! println!("temp = {temp}");
//! node.stop().await;
//! # Ok(())
//! # }
//! ```

use crate::config::{CallPolicy, NodeConfig};
use crate::correlation::CorrelationClient;
use crate::error::{CallError, NodeError};
use crate::responder::{Responder, ValueStore};
use bytes::Bytes;
use corelib::descriptor::{Link, Request};
use corelib::envelope::Method;
use corelib::{topic, Capabilities, CapabilityTables, Descriptor, Topic};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use transport::{
    MqttTransport, PayloadStream, PubSubClient, Transport, TransportError, TransportResult,
};

pub struct Node {
    descriptor: Descriptor,
    capabilities: Arc<CapabilityTables>,
    pubsub: Arc<PubSubClient>,
    correlation: CorrelationClient,
    values: ValueStore,
    policy: CallPolicy,
    serving: Mutex<Option<CancellationToken>>,
}

impl Node {
    /// Build a node over the given transport.
    pub fn new(descriptor: Descriptor, transport: Arc<dyn Transport>, policy: CallPolicy) -> Self {
        let capabilities = Arc::new(CapabilityTables::from_links(descriptor.links()));
        let pubsub = Arc::new(PubSubClient::new(transport));
        Self {
            correlation: CorrelationClient::new(Arc::clone(&pubsub)),
            descriptor,
            capabilities,
            pubsub,
            values: Arc::new(RwLock::new(HashMap::new())),
            policy,
            serving: Mutex::new(None),
        }
    }

    /// Build a node talking MQTT to the configured broker.
    pub fn from_config(descriptor: Descriptor, config: &NodeConfig) -> Result<Self, NodeError> {
        let transport = MqttTransport::new(config.mqtt_config())?;
        Ok(Self::new(descriptor, Arc::new(transport), config.call_policy))
    }

    /// Connect and start answering requests for this node's links.
    ///
    /// If subscribing to the request topic fails the connection is kept and
    /// `start` may be called again.
    pub async fn start(&self) -> Result<(), NodeError> {
        if self.serving.lock().is_some() {
            return Err(TransportError::AlreadyStarted.into());
        }
        if !self.pubsub.is_running() {
            self.pubsub.start().await?;
        }

        let request_topic = topic::request_topic(self.descriptor.end_point());
        let requests = self.pubsub.subscribe(&request_topic).await?;

        let cancel = CancellationToken::new();
        let responder = Responder {
            end_point: self.descriptor.end_point().to_string(),
            capabilities: Arc::clone(&self.capabilities),
            values: Arc::clone(&self.values),
            pubsub: Arc::clone(&self.pubsub),
        };
        tokio::spawn(responder.run(requests, cancel.clone()));
        *self.serving.lock() = Some(cancel);

        info!(
            end_point = %self.descriptor.end_point(),
            links = self.descriptor.links().len(),
            requests = self.descriptor.requests().len(),
            "node started"
        );
        Ok(())
    }

    /// Stop serving and close the connection. Safe to call more than once.
    pub async fn stop(&self) {
        if let Some(cancel) = self.serving.lock().take() {
            cancel.cancel();
        }
        self.pubsub.stop().await;
    }

    /// Fetch the value of a remote link with the node's call policy.
    pub async fn get(&self, link: &str) -> Result<String, CallError> {
        let response = self
            .correlation
            .call(
                link,
                Method::Get,
                "",
                self.policy.attempts,
                self.policy.timeout(),
            )
            .await?;
        Ok(response.body)
    }

    /// Overwrite the value of a remote link. Never retried.
    pub async fn put(&self, link: &str, body: &str) -> Result<String, CallError> {
        let response = self
            .correlation
            .call(link, Method::Put, body, 1, self.policy.timeout())
            .await?;
        Ok(response.body)
    }

    pub async fn subscribe(&self, topic: &str) -> TransportResult<PayloadStream> {
        self.pubsub.subscribe(topic).await
    }

    pub async fn subscribe_with_callback<F>(&self, topic: &str, handler: F) -> TransportResult<()>
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        self.pubsub.subscribe_with_callback(topic, handler).await
    }

    pub async fn unsubscribe(&self, topic: &str) -> TransportResult<()> {
        self.pubsub.unsubscribe(topic).await
    }

    /// Publish on one of this node's publishable links.
    pub async fn publish(&self, link: &str, payload: impl Into<Bytes>) -> Result<(), NodeError> {
        self.ensure_declared(link)?;
        if !self.capabilities.is_publishable(link) {
            return Err(NodeError::NotPublishable(link.to_string()));
        }
        self.pubsub.publish(link, payload).await?;
        Ok(())
    }

    /// Store the value served for one of this node's gettable links.
    pub fn set_value(&self, link: &str, body: impl Into<String>) -> Result<(), NodeError> {
        self.ensure_declared(link)?;
        if !self.capabilities.is_gettable(link) {
            return Err(NodeError::NotGettable(link.to_string()));
        }
        self.values.write().insert(link.to_string(), body.into());
        Ok(())
    }

    /// Value currently served for a link.
    pub fn value(&self, link: &str) -> Option<String> {
        self.values.read().get(link).cloned()
    }

    /// Check that every required request is reachable.
    ///
    /// Requests on this node's own endpoint must name a declared link;
    /// remote ones must answer a `GET` within the call policy. Every
    /// request is checked so all failures get logged.
    pub async fn verify(&self) -> bool {
        let mut reachable = true;
        for request in self.descriptor.required_requests() {
            let ok = if self.descriptor.is_local(request) {
                self.descriptor.links().contains_key(&request.link)
            } else {
                match self.get(&request.link).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(link = %request.link, error = %e, "required request unreachable");
                        false
                    }
                }
            };
            reachable &= ok;
        }
        reachable
    }

    pub fn end_point(&self) -> &str {
        self.descriptor.end_point()
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn links(&self) -> &BTreeMap<Topic, Link> {
        self.descriptor.links()
    }

    pub fn requests(&self) -> &BTreeMap<Topic, Request> {
        self.descriptor.requests()
    }

    pub fn capabilities(&self) -> &CapabilityTables {
        &self.capabilities
    }

    /// Capabilities of one of this node's links.
    pub fn capabilities_of(&self, link: &str) -> Option<Capabilities> {
        self.capabilities.get(link)
    }

    pub fn client(&self) -> &PubSubClient {
        &self.pubsub
    }

    fn ensure_declared(&self, link: &str) -> Result<(), NodeError> {
        if self.descriptor.links().contains_key(link) {
            Ok(())
        } else {
            Err(NodeError::UnknownLink(link.to_string()))
        }
    }
}
