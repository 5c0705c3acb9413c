//! The transport capability.

use crate::error::TransportResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Handler invoked with the raw payload of every message on a topic.
///
/// Handlers run on the transport's delivery path and must not block.
pub type Callback = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Invoked when the transport re-establishes a session that lost its
/// subscriptions.
pub type ReconnectListener = Arc<dyn Fn() + Send + Sync>;

/// Opaque publish/subscribe transport.
///
/// Implementations deliver every payload published on a subscribed topic to
/// the callback registered for it. Subscribing again to the same topic
/// replaces the callback. Delivery guarantees are whatever the underlying
/// transport provides.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (Send + Sync) as a single transport
/// is shared by the client, its control loop and concurrent callers.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open the connection; resolves once the attempt succeeded or failed.
    async fn connect(&self) -> TransportResult<()>;

    /// Fire-and-forget publish.
    async fn publish(&self, topic: &str, payload: Bytes) -> TransportResult<()>;

    /// Start delivering `topic` (or a wildcard pattern) to `callback`.
    async fn subscribe(&self, topic: &str, callback: Callback) -> TransportResult<()>;

    /// Stop delivering `topic`.
    async fn unsubscribe(&self, topic: &str) -> TransportResult<()>;

    /// Close the connection.
    async fn disconnect(&self) -> TransportResult<()>;

    /// Install the listener fired after a session loss is recovered.
    fn set_reconnect_listener(&self, listener: ReconnectListener);

    /// Transport name (for logging/debugging).
    fn name(&self) -> &'static str;
}
