//! Request and response envelopes.
//!
//! Field names are part of the wire format and must not change:
//!
//! ```text
//! request:  {"id": string, "link": string, "method": string, "body": string}
//! response: {"id": string, "body": string}
//! ```
//!
//! A response is correlated to its request by the topic it arrives on, never
//! by inspecting its `id` field.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a single in-flight call.
///
/// Fresh ids are UUID v4 in simple (32 hex chars) form, unique with
/// overwhelming probability over the lifetime of a process.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request method.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "PUT")]
    Put,
}

impl Method {
    /// Wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
        }
    }

    /// Only idempotent methods may be re-published on timeout.
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "PUT" => Ok(Method::Put),
            other => Err(Error::UnknownMethod(other.to_string())),
        }
    }
}

/// Envelope published to `<endpoint>/requests`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: RequestId,
    pub link: String,
    pub method: Method,
    pub body: String,
}

impl RequestEnvelope {
    /// Build a request with a freshly generated id.
    pub fn new(link: impl Into<String>, method: Method, body: impl Into<String>) -> Self {
        Self {
            id: RequestId::generate(),
            link: link.into(),
            method,
            body: body.into(),
        }
    }
}

/// Envelope published to `<endpoint>/responses/<id>`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: RequestId,
    pub body: String,
}

impl ResponseEnvelope {
    pub fn new(id: RequestId, body: impl Into<String>) -> Self {
        Self {
            id,
            body: body.into(),
        }
    }
}
