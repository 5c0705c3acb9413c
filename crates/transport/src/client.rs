//! Publish/subscribe client.
//!
//! [`PubSubClient`] owns a transport and the subscription registry, and
//! keeps the two consistent: every registry mutation happens first, under
//! the registry lock, and only then is the transport updated. The lock is
//! never held across a transport call.
//!
//! # Lifecycle
//!
//! `Idle --start()--> Running --stop()--> Stopped`
//!
//! `start()` connects and spawns the resubscription control loop. `stop()`
//! is idempotent: it stops the loop, disconnects and drops every binding,
//! which closes the outstanding payload streams.

use crate::control::{self, ControlHandle, LoopState};
use crate::error::{TransportError, TransportResult};
use crate::registry::SubscriptionRegistry;
use crate::traits::{Callback, ReconnectListener, Transport};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Payloads buffered per stream subscription before new ones are dropped.
pub const STREAM_BUFFER: usize = 100;

/// Receiving end of a stream subscription.
pub type PayloadStream = mpsc::Receiver<Bytes>;

enum Lifecycle {
    Idle,
    Starting,
    Running(ControlHandle),
    Stopped,
}

pub struct PubSubClient {
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriptionRegistry>,
    lifecycle: Mutex<Lifecycle>,
}

impl PubSubClient {
    /// Wrap a transport. Nothing is connected until [`start`](Self::start).
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            registry: Arc::new(SubscriptionRegistry::new()),
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Connect and start the resubscription loop.
    ///
    /// Resolves once the connection attempt succeeded or failed. A failed
    /// attempt leaves the client idle so `start` can be retried.
    pub async fn start(&self) -> TransportResult<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            match *lifecycle {
                Lifecycle::Idle => *lifecycle = Lifecycle::Starting,
                Lifecycle::Starting | Lifecycle::Running(_) => {
                    return Err(TransportError::AlreadyStarted)
                }
                Lifecycle::Stopped => return Err(TransportError::Stopped),
            }
        }

        if let Err(e) = self.transport.connect().await {
            warn!(transport = self.transport.name(), error = %e, "connect failed");
            let mut lifecycle = self.lifecycle.lock();
            if matches!(*lifecycle, Lifecycle::Starting) {
                *lifecycle = Lifecycle::Idle;
            }
            return Err(e);
        }

        let (control, _task) = control::spawn(Arc::clone(&self.registry), Arc::clone(&self.transport));
        let signal = control.clone();
        let listener: ReconnectListener = Arc::new(move || {
            if !signal.request_resubscribe() {
                debug!("reconnect after control loop exit ignored");
            }
        });
        self.transport.set_reconnect_listener(listener);

        let stopped_meanwhile = {
            let mut lifecycle = self.lifecycle.lock();
            if matches!(*lifecycle, Lifecycle::Starting) {
                *lifecycle = Lifecycle::Running(control.clone());
                false
            } else {
                true
            }
        };
        if stopped_meanwhile {
            // stop() ran while connecting
            control.stop();
            self.disconnect_quietly().await;
            return Err(TransportError::Stopped);
        }

        info!(transport = self.transport.name(), "client started");
        Ok(())
    }

    /// Stop the loop, disconnect and drop every binding.
    ///
    /// Safe to call any number of times, before or after `start`, and
    /// regardless of whether the loop already exited.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Stopped);
        match previous {
            Lifecycle::Running(control) => {
                control.stop();
                self.disconnect_quietly().await;
                let dropped = self.registry.clear();
                info!(transport = self.transport.name(), dropped, "client stopped");
            }
            Lifecycle::Starting => {
                debug!("stop requested while connecting");
            }
            Lifecycle::Idle => {
                self.registry.clear();
            }
            Lifecycle::Stopped => {
                debug!("client already stopped");
            }
        }
    }

    /// Fire-and-forget publish.
    pub async fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> TransportResult<()> {
        self.ensure_running()?;
        self.transport.publish(topic, payload.into()).await
    }

    /// Subscribe and receive payloads through a bounded stream.
    ///
    /// The stream ends when the topic is unsubscribed, replaced by a later
    /// subscribe, or the client stops.
    pub async fn subscribe(&self, topic: &str) -> TransportResult<PayloadStream> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let stream_topic = topic.to_string();
        let callback: Callback = Arc::new(move |payload| {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(payload) {
                warn!(topic = %stream_topic, "subscription buffer full, dropping payload");
            }
        });
        self.register(topic, callback).await?;
        Ok(rx)
    }

    /// Subscribe and handle payloads inline on the delivery path.
    pub async fn subscribe_with_callback<F>(&self, topic: &str, handler: F) -> TransportResult<()>
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        self.register(topic, Arc::new(handler)).await
    }

    /// Remove a binding. Unknown topics are a no-op.
    ///
    /// After `stop` only the registry entry is removed; the transport is
    /// already disconnected.
    pub async fn unsubscribe(&self, topic: &str) -> TransportResult<()> {
        if self.registry.remove(topic).is_none() {
            return Ok(());
        }
        if !self.is_running() {
            return Ok(());
        }
        self.transport.unsubscribe(topic).await
    }

    /// Re-issue every registered binding to the transport and wait for it.
    pub async fn resubscribe(&self) -> TransportResult<usize> {
        let control = self.control().ok_or(TransportError::Stopped)?;
        control.resubscribe().await.ok_or(TransportError::Stopped)
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running(_))
    }

    /// State of the control loop, `None` before `start`.
    pub fn loop_state(&self) -> Option<LoopState> {
        match &*self.lifecycle.lock() {
            Lifecycle::Running(control) => Some(control.state()),
            Lifecycle::Stopped => Some(LoopState::Stopped),
            Lifecycle::Idle | Lifecycle::Starting => None,
        }
    }

    async fn register(&self, topic: &str, callback: Callback) -> TransportResult<()> {
        self.ensure_running()?;
        if topic.is_empty() {
            return Err(TransportError::Subscribe {
                topic: String::new(),
                reason: "topic cannot be empty".to_string(),
            });
        }

        if self.registry.insert(topic, Arc::clone(&callback)).is_some() {
            debug!(topic, "replacing subscription handler");
        }
        if let Err(e) = self.transport.subscribe(topic, Arc::clone(&callback)).await {
            self.registry.remove_if_same(topic, &callback);
            return Err(e);
        }
        Ok(())
    }

    fn control(&self) -> Option<ControlHandle> {
        match &*self.lifecycle.lock() {
            Lifecycle::Running(control) => Some(control.clone()),
            _ => None,
        }
    }

    fn ensure_running(&self) -> TransportResult<()> {
        match *self.lifecycle.lock() {
            Lifecycle::Running(_) => Ok(()),
            Lifecycle::Stopped => Err(TransportError::Stopped),
            Lifecycle::Idle | Lifecycle::Starting => Err(TransportError::NotConnected),
        }
    }

    async fn disconnect_quietly(&self) {
        if let Err(e) = self.transport.disconnect().await {
            warn!(transport = self.transport.name(), error = %e, "disconnect failed");
        }
    }
}

impl Drop for PubSubClient {
    fn drop(&mut self) {
        if let Lifecycle::Running(control) = &*self.lifecycle.lock() {
            control.stop();
        }
    }
}
