//! JSON codec for envelopes.

use crate::error::Error;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A payload could not be decoded into the expected envelope.
#[derive(Debug, thiserror::Error)]
#[error("malformed payload ({len} bytes): {source}")]
pub struct DecodeError {
    len: usize,
    #[source]
    source: serde_json::Error,
}

/// Encode a value into a wire payload.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, Error> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| Error::Encode(e.to_string()))
}

/// Decode a wire payload.
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, DecodeError> {
    serde_json::from_slice(payload).map_err(|source| DecodeError {
        len: payload.len(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Method, RequestEnvelope, ResponseEnvelope};

    #[test]
    fn test_decode_request() {
        let payload = br#"{"id":"1","link":"dev1/a","method":"GET","body":""}"#;
        let request: RequestEnvelope = decode(payload).unwrap();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.link, "dev1/a");
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode::<ResponseEnvelope>(b"not json").unwrap_err();
        assert!(err.to_string().contains("8 bytes"));
        assert!(decode::<ResponseEnvelope>(br#"{"id":"1"}"#).is_err());
    }
}
