//! Node error types.

use corelib::{DescriptorError, Method};
use thiserror::Error;
use transport::TransportError;

/// Failure of a correlated call.
///
/// A call never panics or throws; callers get an explicit result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("invalid call: {0}")]
    InvalidArgument(String),

    #[error("{method} is not idempotent and cannot be retried ({attempts} attempts requested)")]
    NonIdempotentRetry { method: Method, attempts: u32 },

    #[error("no response after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("response subscription closed before a response arrived")]
    SubscriptionClosed,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors raised by node construction and local operations.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("link {0:?} is not declared by this node")]
    UnknownLink(String),

    #[error("link {0:?} is not gettable")]
    NotGettable(String),

    #[error("link {0:?} is not publishable")]
    NotPublishable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
