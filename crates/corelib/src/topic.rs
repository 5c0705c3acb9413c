//! Topic naming and matching.
//!
//! Topics are slash-separated paths. Two families carry the request/response
//! protocol and their layout must stay bit-exact for interoperability:
//!
//! - `<endpoint>/requests` is the shared inbound queue of an endpoint
//! - `<endpoint>/responses/<request_id>` is unique per in-flight call
//!
//! Subscriptions may use MQTT-style wildcards (`+` for one level, `#` for the
//! remaining levels), see [`matches`].

use crate::envelope::RequestId;
use crate::error::{Error, Result};

/// Hierarchical, slash-separated topic path.
pub type Topic = String;

/// Path separator used by topics and descriptor paths.
pub const SEPARATOR: char = '/';

const REQUESTS: &str = "requests";
const RESPONSES: &str = "responses";

/// Split a link into its endpoint and the remainder after the first separator.
///
/// # Example
/// ```rust
/// use corelib::topic::split_endpoint;
///
/// let (endpoint, rest) = split_endpoint("dev1/sensors/temp").unwrap();
/// assert_eq!(endpoint, "dev1");
/// assert_eq!(rest, "sensors/temp");
/// ```
pub fn split_endpoint(link: &str) -> Result<(&str, &str)> {
    match link.split_once(SEPARATOR) {
        Some((endpoint, rest)) if !endpoint.is_empty() && !rest.is_empty() => {
            Ok((endpoint, rest))
        }
        _ => Err(Error::InvalidTopic(link.to_string())),
    }
}

/// Inbound request queue of an endpoint.
pub fn request_topic(endpoint: &str) -> Topic {
    format!("{endpoint}{SEPARATOR}{REQUESTS}")
}

/// Response channel of a single call.
pub fn response_topic(endpoint: &str, id: &RequestId) -> Topic {
    format!("{endpoint}{SEPARATOR}{RESPONSES}{SEPARATOR}{id}")
}

/// Append one segment to a path.
pub fn join(path: &str, segment: &str) -> Topic {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}{SEPARATOR}{segment}")
    }
}

/// True if `child` lies strictly below `parent` on a segment boundary.
///
/// `dev1/sensors` is below `dev1`; `dev10/sensors` is not.
pub fn is_below(parent: &str, child: &str) -> bool {
    child
        .strip_prefix(parent)
        .is_some_and(|rest| rest.len() > 1 && rest.starts_with(SEPARATOR))
}

/// Check if a topic matches a subscription pattern.
///
/// Supports MQTT-style wildcards:
/// - `+` matches exactly one topic level
/// - `#` matches zero or more topic levels (must be at the end)
pub fn matches(pattern: &str, topic: &str) -> bool {
    if pattern == topic || pattern == "#" {
        return true;
    }

    let mut pattern_parts = pattern.split(SEPARATOR).peekable();
    let mut topic_parts = topic.split(SEPARATOR);

    while let Some(part) = pattern_parts.next() {
        if part == "#" {
            // `#` is only valid as the last level
            return pattern_parts.peek().is_none();
        }
        match topic_parts.next() {
            Some(level) if part == "+" || part == level => continue,
            _ => return false,
        }
    }

    topic_parts.next().is_none()
}

/// True if the pattern contains a wildcard level.
pub fn is_pattern(topic: &str) -> bool {
    topic.split(SEPARATOR).any(|part| part == "+" || part == "#")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_endpoint() {
        assert_eq!(split_endpoint("dev1/a/b").unwrap(), ("dev1", "a/b"));
        assert!(split_endpoint("").is_err());
        assert!(split_endpoint("dev1").is_err());
        assert!(split_endpoint("/dev1").is_err());
        assert!(split_endpoint("dev1/").is_err());
    }

    #[test]
    fn test_protocol_topics() {
        let id = RequestId::from("abc123");
        assert_eq!(request_topic("dev1"), "dev1/requests");
        assert_eq!(response_topic("dev1", &id), "dev1/responses/abc123");
    }

    #[test]
    fn test_is_below() {
        assert!(is_below("dev1", "dev1/sensors"));
        assert!(is_below("dev1/sensors", "dev1/sensors/temp"));
        assert!(!is_below("dev1", "dev10/sensors"));
        assert!(!is_below("dev1", "dev1"));
        assert!(!is_below("dev1", "dev1/"));
        assert!(!is_below("dev1/sensors", "dev1"));
    }

    #[test]
    fn test_exact_and_wildcard_match() {
        assert!(matches("sensor/temperature", "sensor/temperature"));
        assert!(!matches("sensor/temperature", "sensor/humidity"));
        assert!(matches("sensor/+/temperature", "sensor/device1/temperature"));
        assert!(!matches("sensor/+/temperature", "sensor/device1/data/temperature"));
        assert!(matches("sensor/#", "sensor/device1/data/temperature"));
        assert!(matches("sensor/#", "sensor"));
        assert!(!matches("sensor/#", "device/sensor"));
        assert!(matches("dev1/responses/+", "dev1/responses/abc"));
        assert!(!matches("sensor/#/x", "sensor/a/x"));
    }

    #[test]
    fn test_is_pattern() {
        assert!(is_pattern("a/+/b"));
        assert!(is_pattern("a/#"));
        assert!(!is_pattern("a/b+/c"));
    }
}
