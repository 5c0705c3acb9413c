//! Namespace descriptors.
//!
//! A descriptor declares which links a participant exposes and which remote
//! links it depends on:
//!
//! ```json
//! {
//!   "end_point": "dev1",
//!   "links": {
//!     "sensors": { "links": { "temp": { "type": "float" } } },
//!     "/status": { "type": "stream" }
//!   },
//!   "requests": [
//!     { "type": "float", "link": "dev2/sensors/temp", "required": true }
//!   ]
//! }
//! ```
//!
//! Parsing flattens the nested `links` tree into a map keyed by
//! fully-qualified path (`dev1/sensors/temp`, `dev1/status`) and indexes the
//! `requests` list by link. The descriptor is immutable once parsed.

mod error;
mod parse;

pub use error::DescriptorError;
pub use parse::parse_descriptor;

use crate::topic::Topic;
use serde::Serialize;
use std::collections::BTreeMap;

/// Leaf capability declared at a fully-qualified path.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Link {
    #[serde(rename = "type")]
    pub link_type: String,
}

impl Link {
    pub fn new(link_type: impl Into<String>) -> Self {
        Self {
            link_type: link_type.into(),
        }
    }
}

/// Declared dependency on a remote link.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Request {
    #[serde(rename = "type")]
    pub link_type: String,
    pub link: Topic,
    pub required: bool,
}

/// Parsed, validated descriptor.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Descriptor {
    end_point: String,
    links: BTreeMap<Topic, Link>,
    requests: BTreeMap<Topic, Request>,
}

impl Descriptor {
    /// Parse a descriptor from JSON text.
    pub fn from_json(text: &str) -> Result<Self, DescriptorError> {
        let document: serde_json::Value = serde_json::from_str(text)?;
        parse_descriptor(&document)
    }

    /// Parse a descriptor from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DescriptorError> {
        let document: serde_json::Value = serde_json::from_slice(bytes)?;
        parse_descriptor(&document)
    }

    pub fn end_point(&self) -> &str {
        &self.end_point
    }

    /// Flattened links keyed by fully-qualified path.
    pub fn links(&self) -> &BTreeMap<Topic, Link> {
        &self.links
    }

    /// Declared requests keyed by target link.
    pub fn requests(&self) -> &BTreeMap<Topic, Request> {
        &self.requests
    }

    /// Required requests only.
    pub fn required_requests(&self) -> impl Iterator<Item = &Request> {
        self.requests.values().filter(|request| request.required)
    }

    /// True if the request targets one of this descriptor's own links.
    pub fn is_local(&self, request: &Request) -> bool {
        crate::topic::split_endpoint(&request.link)
            .map(|(endpoint, _)| endpoint == self.end_point)
            .unwrap_or(false)
    }

    pub fn into_parts(self) -> (String, BTreeMap<Topic, Link>, BTreeMap<Topic, Request>) {
        (self.end_point, self.links, self.requests)
    }
}
