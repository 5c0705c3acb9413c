//! Broker addressing.

use std::fmt;

/// Default MQTT port.
pub const DEFAULT_PORT: u16 = 1883;

/// Broker connection address, rendered as `<scheme>://<host>:<port>`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct BrokerAddress {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// Plain TCP address.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new("tcp", host, port)
    }
}

impl Default for BrokerAddress {
    fn default() -> Self {
        Self::tcp("localhost", DEFAULT_PORT)
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string() {
        assert_eq!(
            BrokerAddress::tcp("192.168.1.8", 1884).to_string(),
            "tcp://192.168.1.8:1884"
        );
        assert_eq!(BrokerAddress::default().to_string(), "tcp://localhost:1883");
    }
}
