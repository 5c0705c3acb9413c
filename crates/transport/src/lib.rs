//! Publish/subscribe plumbing for linkwire.
//!
//! This crate provides:
//! - The [`Transport`] capability (connect, publish, subscribe, unsubscribe,
//!   disconnect) with an MQTT and an in-memory implementation
//! - The subscription registry that remembers active topic bindings
//! - [`PubSubClient`], which keeps registry and transport consistent and
//!   re-establishes subscriptions after the transport reports a lost session

pub mod address;
pub mod client;
pub mod control;
pub mod error;
pub mod memory;
pub mod mqtt;
pub mod registry;
pub mod traits;

pub use address::BrokerAddress;
pub use client::{PayloadStream, PubSubClient};
pub use control::{Command, LoopState};
pub use error::{TransportError, TransportResult};
pub use memory::{MemoryBroker, MemoryTransport};
pub use mqtt::{MqttConfig, MqttTransport};
pub use registry::SubscriptionRegistry;
pub use traits::{Callback, ReconnectListener, Transport};
