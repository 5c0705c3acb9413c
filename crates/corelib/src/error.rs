//! Error types for the core library.

use std::fmt;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library outside descriptor parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Topic is empty or cannot be split into `<endpoint>/<rest>`
    InvalidTopic(String),
    /// Method name outside the supported set
    UnknownMethod(String),
    /// Encoding an envelope failed
    Encode(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidTopic(topic) => write!(f, "Invalid topic: {:?}", topic),
            Error::UnknownMethod(method) => write!(f, "Unknown method: {}", method),
            Error::Encode(msg) => write!(f, "Encode failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
