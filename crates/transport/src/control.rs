//! Background resubscription loop.
//!
//! A single task per client, modeled as a two-state machine:
//!
//! ```text
//!            Resubscribe
//!            +--------+
//!            v        |
//!   ----> Running ----+
//!            |
//!            | Stop (command, cancellation or closed channel)
//!            v
//!         Stopped   (terminal)
//! ```
//!
//! Shutdown is close-based: [`ControlHandle::stop`] cancels a token the loop
//! observes as [`Command::Stop`]. Cancelling is idempotent and never blocks,
//! so stopping twice, or stopping after the loop already exited, is a no-op.

use crate::registry::SubscriptionRegistry;
use crate::traits::{Callback, Transport};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the command channel.
pub const COMMAND_CAPACITY: usize = 8;

/// Commands accepted by the control loop.
#[derive(Debug)]
pub enum Command {
    /// Re-issue a transport subscribe for every registered binding.
    ///
    /// The optional sender receives the number of bindings re-issued.
    Resubscribe(Option<oneshot::Sender<usize>>),
    /// Exit permanently.
    Stop,
}

/// State of the control loop.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LoopState {
    Running,
    Stopped,
}

/// Cloneable handle used to drive the loop.
#[derive(Clone, Debug)]
pub struct ControlHandle {
    commands: mpsc::Sender<Command>,
    cancel: CancellationToken,
    state: watch::Receiver<LoopState>,
}

impl ControlHandle {
    /// Queue a resubscription without waiting.
    ///
    /// Returns false once the loop has exited. A full channel means a
    /// resubscription is already pending, so the signal is dropped.
    pub fn request_resubscribe(&self) -> bool {
        match self.commands.try_send(Command::Resubscribe(None)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("resubscription already pending");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Resubscribe and wait for the loop to finish, returning the number of
    /// bindings re-issued. `None` if the loop has exited.
    pub async fn resubscribe(&self) -> Option<usize> {
        let (ack_tx, ack_rx) = oneshot::channel();
        tokio::select! {
            sent = self.commands.send(Command::Resubscribe(Some(ack_tx))) => sent.ok()?,
            _ = self.cancel.cancelled() => return None,
        }
        ack_rx.await.ok()
    }

    /// Ask the loop to exit. Safe to call any number of times.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    /// Wait until the loop reaches [`LoopState::Stopped`].
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        // An error means the loop dropped its sender, i.e. it is gone.
        let _ = state.wait_for(|s| *s == LoopState::Stopped).await;
    }
}

struct ControlLoop {
    commands: mpsc::Receiver<Command>,
    cancel: CancellationToken,
    state: watch::Sender<LoopState>,
    registry: Arc<SubscriptionRegistry>,
    transport: Arc<dyn Transport>,
}

impl ControlLoop {
    async fn next_command(&mut self) -> Command {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Command::Stop,
            command = self.commands.recv() => command.unwrap_or(Command::Stop),
        }
    }

    async fn run(mut self) {
        debug!(transport = self.transport.name(), "control loop running");
        while *self.state.borrow() == LoopState::Running {
            match self.next_command().await {
                Command::Resubscribe(ack) => {
                    let count = self.resubscribe().await;
                    if let Some(ack) = ack {
                        let _ = ack.send(count);
                    }
                }
                Command::Stop => {
                    self.state.send_replace(LoopState::Stopped);
                }
            }
        }
        self.commands.close();
        debug!(transport = self.transport.name(), "control loop stopped");
    }

    /// Re-issue every registered binding. The registry itself is unchanged.
    async fn resubscribe(&self) -> usize {
        let bindings = self.registry.snapshot();
        info!(count = bindings.len(), "resubscribing");
        for (topic, callback) in bindings.iter() {
            match self.transport.subscribe(topic, Arc::clone(callback)).await {
                Ok(()) => self.reconcile(topic, Arc::clone(callback)).await,
                Err(e) => warn!(topic = %topic, error = %e, "resubscribe failed"),
            }
        }
        metrics::counter!("linkwire_resubscriptions_total").increment(1);
        bindings.len()
    }

    /// Bring the transport back in line with the registry after re-issuing
    /// `issued` for `topic`.
    ///
    /// A concurrent unsubscribe or replacement may have changed the binding
    /// while the transport call was in flight. Repeats until the last
    /// transport call matches what the registry holds.
    async fn reconcile(&self, topic: &str, issued: Callback) {
        let mut issued = Some(issued);
        loop {
            let current = self.registry.get(topic);
            let settled = match (&current, &issued) {
                (None, None) => true,
                (Some(current), Some(issued)) => Arc::ptr_eq(current, issued),
                _ => false,
            };
            if settled {
                return;
            }

            let outcome = match &current {
                Some(callback) => {
                    debug!(topic, "binding replaced during resubscribe");
                    self.transport.subscribe(topic, Arc::clone(callback)).await
                }
                None => {
                    debug!(topic, "binding removed during resubscribe");
                    self.transport.unsubscribe(topic).await
                }
            };
            if let Err(e) = outcome {
                warn!(topic, error = %e, "failed to reconcile binding");
                return;
            }
            issued = current;
        }
    }
}

/// Spawn the control loop for a registry/transport pair.
pub(crate) fn spawn(
    registry: Arc<SubscriptionRegistry>,
    transport: Arc<dyn Transport>,
) -> (ControlHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (state_tx, state_rx) = watch::channel(LoopState::Running);
    let cancel = CancellationToken::new();

    let control = ControlLoop {
        commands: commands_rx,
        cancel: cancel.clone(),
        state: state_tx,
        registry,
        transport,
    };
    let task = tokio::spawn(control.run());

    let handle = ControlHandle {
        commands: commands_tx,
        cancel,
        state: state_rx,
    };
    (handle, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;

    #[tokio::test]
    async fn test_resubscribe_then_stop() {
        let broker = MemoryBroker::new();
        let transport = Arc::new(broker.transport());
        transport.connect().await.unwrap();

        let registry = Arc::new(SubscriptionRegistry::new());
        let callback: Callback = Arc::new(|_| {});
        registry.insert("a/b", callback);

        let (handle, task) = spawn(Arc::clone(&registry), transport.clone());
        assert_eq!(handle.resubscribe().await, Some(1));
        assert_eq!(transport.log().subscribed, vec!["a/b".to_string()]);

        handle.stop();
        task.await.unwrap();
        assert_eq!(handle.state(), LoopState::Stopped);
        assert!(!handle.request_resubscribe());
        assert_eq!(handle.resubscribe().await, None);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let broker = MemoryBroker::new();
        let transport = Arc::new(broker.transport());
        let (handle, task) = spawn(Arc::new(SubscriptionRegistry::new()), transport);

        handle.stop();
        handle.stop();
        handle.stopped().await;
        task.await.unwrap();
        handle.stop();
        assert_eq!(handle.state(), LoopState::Stopped);
    }

    #[tokio::test]
    async fn test_full_channel_does_not_block() {
        let broker = MemoryBroker::new();
        let transport = Arc::new(broker.transport());
        let (handle, _task) = spawn(Arc::new(SubscriptionRegistry::new()), transport);

        for _ in 0..(COMMAND_CAPACITY * 4) {
            assert!(handle.request_resubscribe());
        }
        handle.stop();
        handle.stopped().await;
    }
}
