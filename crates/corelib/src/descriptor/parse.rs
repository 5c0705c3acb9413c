//! Descriptor decoding and link flattening.
//!
//! Parsing runs in two steps:
//!
//! 1. **Decode**: the untyped JSON tree is decoded into [`DescriptorNode`]
//!    variants, failing on the first missing field or wrongly typed value.
//! 2. **Flatten**: the decoded tree is walked while accumulating paths, and
//!    every leaf is recorded at its fully-qualified path.
//!
//! # Path Accumulation
//!
//! For a child key `k` under the accumulated path `p`:
//!
//! - `/k` (absolute form) appends: `p/k`
//! - `p/x/y` (re-anchored form, contains a separator) must lie below `p` and
//!   becomes the child path as written
//! - `k` (bare segment) appends: `p/k`
//!
//! The root path is the descriptor's `end_point`.

use super::error::DescriptorError;
use super::{Descriptor, Link, Request};
use crate::topic::{self, Topic, SEPARATOR};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const END_POINT: &str = "end_point";
const LINKS: &str = "links";
const REQUESTS: &str = "requests";
const TYPE: &str = "type";
const LINK: &str = "link";
const REQUIRED: &str = "required";

/// A decoded node of the links tree.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DescriptorNode {
    /// No `links` field, or an empty one.
    Leaf(Link),
    /// Children keyed by their raw (unresolved) link key.
    Branch(BTreeMap<String, DescriptorNode>),
}

/// Parse a descriptor document into flat link and request maps.
///
/// Parsing aborts at the first error; no partial results are returned.
///
/// # Example
///
/// ```rust
/// use corelib::descriptor::parse_descriptor;
/// use serde_json::json;
///
/// let descriptor = parse_descriptor(&json!({
///     "end_point": "dev1",
///     "links": { "sensors": { "links": { "temp": { "type": "float" } } } }
/// }))
/// .unwrap();
///
/// assert!(descriptor.links().contains_key("dev1/sensors/temp"));
/// ```
pub fn parse_descriptor(document: &Value) -> Result<Descriptor, DescriptorError> {
    let root = as_object(document, "")?;
    let end_point = parse_end_point(root)?;

    let children = match root.get(LINKS) {
        None => BTreeMap::new(),
        Some(links) => decode_children(links, LINKS)?,
    };

    let mut links = BTreeMap::new();
    flatten(&end_point, &children, "", &mut links)?;

    let requests = match root.get(REQUESTS) {
        None => BTreeMap::new(),
        Some(requests) => parse_requests(requests, &end_point, &links)?,
    };

    Ok(Descriptor {
        end_point,
        links,
        requests,
    })
}

fn parse_end_point(root: &Map<String, Value>) -> Result<String, DescriptorError> {
    let end_point = required_str(root, END_POINT, END_POINT)?;
    if end_point.is_empty() {
        return Err(invalid(END_POINT, end_point, "end point cannot be empty"));
    }
    if end_point.contains(SEPARATOR) || topic::is_pattern(end_point) {
        return Err(invalid(
            END_POINT,
            end_point,
            "end point must be a single topic level",
        ));
    }
    Ok(end_point.to_string())
}

// ============================================================================
// Decode
// ============================================================================

fn decode_node(value: &Value, field: &str) -> Result<DescriptorNode, DescriptorError> {
    let body = as_object(value, field)?;

    if let Some(links) = body.get(LINKS) {
        let links_field = format!("{field}.{LINKS}");
        let children = decode_children(links, &links_field)?;
        if !children.is_empty() {
            return Ok(DescriptorNode::Branch(children));
        }
    }

    let type_field = format!("{field}.{TYPE}");
    let link_type = required_str(body, TYPE, &type_field)?;
    if link_type.is_empty() {
        return Err(invalid(&type_field, link_type, "link type cannot be empty"));
    }
    Ok(DescriptorNode::Leaf(Link::new(link_type)))
}

fn decode_children(
    links: &Value,
    field: &str,
) -> Result<BTreeMap<String, DescriptorNode>, DescriptorError> {
    as_object(links, field)?
        .iter()
        .map(|(key, child)| {
            let node = decode_node(child, &format!("{field}.{key}"))?;
            Ok((key.clone(), node))
        })
        .collect()
}

// ============================================================================
// Flatten
// ============================================================================

fn flatten(
    path: &str,
    children: &BTreeMap<String, DescriptorNode>,
    field: &str,
    out: &mut BTreeMap<Topic, Link>,
) -> Result<(), DescriptorError> {
    for (key, node) in children {
        let child_field = if field.is_empty() {
            format!("{LINKS}.{key}")
        } else {
            format!("{field}.{LINKS}.{key}")
        };
        let child_path = resolve_child_path(path, key, &child_field)?;

        match node {
            DescriptorNode::Leaf(link) => {
                if out.contains_key(&child_path) {
                    return Err(DescriptorError::DuplicatePath {
                        field: child_field,
                        path: child_path,
                    });
                }
                out.insert(child_path, link.clone());
            }
            DescriptorNode::Branch(grandchildren) => {
                flatten(&child_path, grandchildren, &child_field, out)?;
            }
        }
    }
    Ok(())
}

/// Compute the path to descend with for child key `key` under `path`.
fn resolve_child_path(path: &str, key: &str, field: &str) -> Result<Topic, DescriptorError> {
    let (body, absolute) = match key.strip_prefix(SEPARATOR) {
        Some(rest) => (rest, true),
        None => (key, false),
    };

    if body.is_empty() || body.split(SEPARATOR).any(str::is_empty) {
        return Err(DescriptorError::EmptyLinkKey {
            field: field.to_string(),
        });
    }
    if topic::is_pattern(body) {
        return Err(invalid(field, key, "link keys cannot contain wildcards"));
    }

    if absolute || !body.contains(SEPARATOR) {
        return Ok(topic::join(path, body));
    }

    if topic::is_below(path, body) {
        Ok(body.to_string())
    } else {
        Err(DescriptorError::PrefixMismatch {
            field: field.to_string(),
            key: key.to_string(),
            path: path.to_string(),
        })
    }
}

// ============================================================================
// Requests
// ============================================================================

fn parse_requests(
    requests: &Value,
    end_point: &str,
    links: &BTreeMap<Topic, Link>,
) -> Result<BTreeMap<Topic, Request>, DescriptorError> {
    let entries = requests
        .as_array()
        .ok_or_else(|| wrong_type(REQUESTS, "an array", requests))?;

    let mut parsed = BTreeMap::new();
    for (index, entry) in entries.iter().enumerate() {
        let field = format!("{REQUESTS}[{index}]");
        let request = parse_request(entry, &field)?;

        let (endpoint, _) = topic::split_endpoint(&request.link).map_err(|_| {
            invalid(
                &format!("{field}.{LINK}"),
                &request.link,
                "request link must have the form <endpoint>/<path>",
            )
        })?;
        if endpoint == end_point && !links.contains_key(&request.link) {
            return Err(DescriptorError::UnknownRequestLink {
                field,
                link: request.link,
            });
        }
        if parsed.contains_key(&request.link) {
            return Err(DescriptorError::DuplicateRequest {
                field,
                link: request.link,
            });
        }
        parsed.insert(request.link.clone(), request);
    }
    Ok(parsed)
}

fn parse_request(value: &Value, field: &str) -> Result<Request, DescriptorError> {
    let body = as_object(value, field)?;

    let link_type = required_str(body, TYPE, &format!("{field}.{TYPE}"))?;
    let link = required_str(body, LINK, &format!("{field}.{LINK}"))?;
    let required = match body.get(REQUIRED) {
        None => false,
        Some(Value::Bool(required)) => *required,
        Some(other) => {
            return Err(wrong_type(&format!("{field}.{REQUIRED}"), "a boolean", other));
        }
    };

    Ok(Request {
        link_type: link_type.to_string(),
        link: link.to_string(),
        required,
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn as_object<'a>(value: &'a Value, field: &str) -> Result<&'a Map<String, Value>, DescriptorError> {
    value.as_object().ok_or_else(|| {
        let field = if field.is_empty() { "<root>" } else { field };
        wrong_type(field, "an object", value)
    })
}

fn required_str<'a>(
    body: &'a Map<String, Value>,
    key: &str,
    field: &str,
) -> Result<&'a str, DescriptorError> {
    match body.get(key) {
        None => Err(DescriptorError::MissingField {
            field: field.to_string(),
        }),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(wrong_type(field, "a string", other)),
    }
}

fn wrong_type(field: &str, expected: &'static str, found: &Value) -> DescriptorError {
    DescriptorError::WrongType {
        field: field.to_string(),
        expected,
        found: found.to_string(),
    }
}

fn invalid(field: &str, value: &str, reason: &'static str) -> DescriptorError {
    DescriptorError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason,
    }
}
