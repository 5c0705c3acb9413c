//! In-process broker transport.
//!
//! [`MemoryBroker`] fans published payloads out to every matching
//! subscription synchronously, on the publisher's task. Each
//! [`MemoryTransport`] records its publishes, subscribes and unsubscribes so
//! protocol behaviour can be asserted without a real broker, and can
//! simulate a lost session with [`MemoryTransport::sever`].

use crate::error::{TransportError, TransportResult};
use crate::traits::{Callback, ReconnectListener, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use corelib::{topic, Topic};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

struct Subscriber {
    owner: u64,
    pattern: Topic,
    callback: Callback,
}

#[derive(Default)]
struct BrokerInner {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

/// Shared in-process broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new, unconnected transport attached to this broker.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            broker: self.clone(),
            connected: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            listener: RwLock::new(None),
            log: Mutex::new(TransportLog::default()),
        }
    }

    /// Deliver a payload to every matching subscription.
    ///
    /// Returns the number of callbacks invoked. Callbacks run after the
    /// broker lock is released, so they may publish re-entrantly.
    pub fn deliver(&self, topic: &str, payload: Bytes) -> usize {
        let callbacks: Vec<Callback> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .filter(|s| topic::matches(&s.pattern, topic))
            .map(|s| Arc::clone(&s.callback))
            .collect();

        trace!(topic, receivers = callbacks.len(), "memory broker delivery");
        for callback in &callbacks {
            callback(payload.clone());
        }
        callbacks.len()
    }

    /// Number of subscriptions whose pattern is exactly `pattern`.
    pub fn subscriber_count(&self, pattern: &str) -> usize {
        self.inner
            .subscribers
            .lock()
            .iter()
            .filter(|s| s.pattern == pattern)
            .count()
    }

    fn bind(&self, owner: u64, pattern: &str, callback: Callback) {
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|s| !(s.owner == owner && s.pattern == pattern));
        subscribers.push(Subscriber {
            owner,
            pattern: pattern.to_string(),
            callback,
        });
    }

    fn unbind(&self, owner: u64, pattern: &str) {
        self.inner
            .subscribers
            .lock()
            .retain(|s| !(s.owner == owner && s.pattern == pattern));
    }

    fn unbind_all(&self, owner: u64) -> usize {
        let mut subscribers = self.inner.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.owner != owner);
        before - subscribers.len()
    }
}

/// Record of the operations a [`MemoryTransport`] performed.
#[derive(Clone, Debug, Default)]
pub struct TransportLog {
    pub published: Vec<(Topic, Bytes)>,
    pub subscribed: Vec<Topic>,
    pub unsubscribed: Vec<Topic>,
}

/// Transport attached to a [`MemoryBroker`].
pub struct MemoryTransport {
    id: u64,
    broker: MemoryBroker,
    connected: AtomicBool,
    fail_publish: AtomicBool,
    fail_subscribe: AtomicBool,
    listener: RwLock<Option<ReconnectListener>>,
    log: Mutex<TransportLog>,
}

impl MemoryTransport {
    /// Snapshot of the operation log.
    pub fn log(&self) -> TransportLog {
        self.log.lock().clone()
    }

    /// Number of publishes to exactly `topic`.
    pub fn publish_count(&self, topic: &str) -> usize {
        self.log
            .lock()
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .count()
    }

    /// Make every subsequent publish fail (or succeed again).
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent subscribe fail (or succeed again).
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Simulate a reconnect that lost the session: drop every broker-side
    /// subscription of this transport, then fire the reconnect listener.
    pub fn sever(&self) -> usize {
        let dropped = self.broker.unbind_all(self.id);
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener();
        }
        dropped
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> TransportResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> TransportResult<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> TransportResult<()> {
        self.ensure_connected()?;
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::Publish {
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.log
            .lock()
            .published
            .push((topic.to_string(), payload.clone()));
        self.broker.deliver(topic, payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &str, callback: Callback) -> TransportResult<()> {
        self.ensure_connected()?;
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(TransportError::Subscribe {
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.broker.bind(self.id, topic, callback);
        self.log.lock().subscribed.push(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> TransportResult<()> {
        self.ensure_connected()?;
        self.broker.unbind(self.id, topic);
        self.log.lock().unsubscribed.push(topic.to_string());
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.broker.unbind_all(self.id);
        Ok(())
    }

    fn set_reconnect_listener(&self, listener: ReconnectListener) {
        *self.listener.write() = Some(listener);
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Callback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let callback: Callback = Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (hits, callback)
    }

    #[tokio::test]
    async fn test_publish_reaches_matching_subscribers() {
        let broker = MemoryBroker::new();
        let a = broker.transport();
        let b = broker.transport();
        a.connect().await.unwrap();
        b.connect().await.unwrap();

        let (exact, exact_cb) = counter();
        let (wild, wild_cb) = counter();
        b.subscribe("dev1/requests", exact_cb).await.unwrap();
        b.subscribe("dev1/#", wild_cb).await.unwrap();

        a.publish("dev1/requests", Bytes::from_static(b"x")).await.unwrap();
        a.publish("dev2/requests", Bytes::from_static(b"x")).await.unwrap();

        assert_eq!(exact.load(Ordering::SeqCst), 1);
        assert_eq!(wild.load(Ordering::SeqCst), 1);
        assert_eq!(a.publish_count("dev1/requests"), 1);
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_callback() {
        let broker = MemoryBroker::new();
        let t = broker.transport();
        t.connect().await.unwrap();

        let (first, first_cb) = counter();
        let (second, second_cb) = counter();
        t.subscribe("x", first_cb).await.unwrap();
        t.subscribe("x", second_cb).await.unwrap();
        assert_eq!(broker.subscriber_count("x"), 1);

        broker.deliver("x", Bytes::new());
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let broker = MemoryBroker::new();
        let t = broker.transport();
        assert_eq!(
            t.publish("x", Bytes::new()).await,
            Err(TransportError::NotConnected)
        );

        t.connect().await.unwrap();
        t.set_fail_publish(true);
        assert!(matches!(
            t.publish("x", Bytes::new()).await,
            Err(TransportError::Publish { .. })
        ));
    }

    #[tokio::test]
    async fn test_injected_subscribe_failure() {
        let broker = MemoryBroker::new();
        let t = broker.transport();
        t.connect().await.unwrap();

        t.set_fail_subscribe(true);
        assert!(matches!(
            t.subscribe("a", Arc::new(|_| {})).await,
            Err(TransportError::Subscribe { .. })
        ));
        assert_eq!(broker.subscriber_count("a"), 0);

        t.set_fail_subscribe(false);
        t.subscribe("a", Arc::new(|_| {})).await.unwrap();
        assert_eq!(broker.subscriber_count("a"), 1);
    }

    #[tokio::test]
    async fn test_sever_drops_subscriptions_and_notifies() {
        let broker = MemoryBroker::new();
        let t = broker.transport();
        t.connect().await.unwrap();
        t.subscribe("a", Arc::new(|_| {})).await.unwrap();
        t.subscribe("b", Arc::new(|_| {})).await.unwrap();

        let (notified, _) = counter();
        let flag = Arc::clone(&notified);
        t.set_reconnect_listener(Arc::new(move || {
            flag.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(t.sever(), 2);
        assert_eq!(broker.subscriber_count("a"), 0);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }
}
