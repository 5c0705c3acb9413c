//! Namespace nodes for linkwire.
//!
//! A [`Node`] is the unit a participant uses: it parses its descriptor once,
//! derives what each of its links can do, answers requests for its own
//! links, and issues correlated requests for remote ones through the
//! [`CorrelationClient`].

pub mod config;
pub mod correlation;
pub mod error;
pub mod node;
mod responder;

pub use config::{CallPolicy, NodeConfig};
pub use correlation::CorrelationClient;
pub use error::{CallError, NodeError};
pub use node::Node;
