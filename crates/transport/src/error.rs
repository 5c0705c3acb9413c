//! Transport error types.

use thiserror::Error;

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Failures at the transport boundary.
///
/// These are surfaced to the immediate caller and never retried here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connect to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("publish to {topic:?} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("subscribe to {topic:?} failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("unsubscribe from {topic:?} failed: {reason}")]
    Unsubscribe { topic: String, reason: String },

    #[error("disconnect from {address} failed: {reason}")]
    Disconnect { address: String, reason: String },

    #[error("transport is not connected")]
    NotConnected,

    #[error("client is already started")]
    AlreadyStarted,

    #[error("client is stopped")]
    Stopped,

    #[error("unsupported broker scheme {0:?}")]
    UnsupportedScheme(String),
}
