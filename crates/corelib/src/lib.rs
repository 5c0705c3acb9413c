//! Core library for the linkwire request/response overlay.
//!
//! This crate provides the transport-independent building blocks:
//! - Topic naming and matching
//! - Request/response envelopes and their JSON codec
//! - Descriptor parsing into a flat, path-addressed namespace
//! - Capability classification of links

pub mod capability;
pub mod codec;
pub mod descriptor;
pub mod envelope;
pub mod error;
pub mod topic;

pub use capability::{Capabilities, CapabilityTables};
pub use codec::DecodeError;
pub use descriptor::{parse_descriptor, Descriptor, DescriptorError, Link, Request};
pub use envelope::{Method, RequestEnvelope, RequestId, ResponseEnvelope};
pub use error::{Error, Result};
pub use topic::Topic;
