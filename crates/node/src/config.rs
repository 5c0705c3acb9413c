//! Node configuration.
//!
//! All fields have defaults, so an empty JSON object is a valid
//! configuration for a broker on `tcp://localhost:1883`.

use crate::error::NodeError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use transport::{BrokerAddress, MqttConfig};
use uuid::Uuid;

/// Attempt/timeout policy of a correlated call.
///
/// `attempts` counts total tries: `attempts = 3` publishes the request at
/// most three times, waiting `timeout_secs` after each publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallPolicy {
    #[serde(default = "CallPolicy::default_attempts")]
    pub attempts: u32,

    #[serde(default = "CallPolicy::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            attempts: Self::default_attempts(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

impl CallPolicy {
    fn default_attempts() -> u32 {
        3
    }

    fn default_timeout_secs() -> u64 {
        1
    }

    pub fn new(attempts: u32, timeout_secs: u64) -> Self {
        Self {
            attempts,
            timeout_secs,
        }
    }

    /// Per-attempt wait.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Broker and call settings of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    #[serde(default = "NodeConfig::default_scheme")]
    pub scheme: String,

    #[serde(default = "NodeConfig::default_host")]
    pub host: String,

    #[serde(default = "NodeConfig::default_port")]
    pub port: u16,

    /// MQTT client id; generated when absent.
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default = "NodeConfig::default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    #[serde(default)]
    pub call_policy: CallPolicy,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            scheme: Self::default_scheme(),
            host: Self::default_host(),
            port: Self::default_port(),
            client_id: None,
            keep_alive_secs: Self::default_keep_alive_secs(),
            call_policy: CallPolicy::default(),
        }
    }
}

impl NodeConfig {
    fn default_scheme() -> String {
        "tcp".to_string()
    }

    fn default_host() -> String {
        "localhost".to_string()
    }

    fn default_port() -> u16 {
        transport::address::DEFAULT_PORT
    }

    fn default_keep_alive_secs() -> u64 {
        30
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&text).map_err(|e| {
            NodeError::Config(format!("{}: {e}", path.as_ref().display()))
        })
    }

    pub fn broker_address(&self) -> BrokerAddress {
        BrokerAddress::new(self.scheme.clone(), self.host.clone(), self.port)
    }

    /// Configured client id, or a fresh `linkwire-<8 hex>` one.
    pub fn client_id(&self) -> String {
        match &self.client_id {
            Some(id) => id.clone(),
            None => {
                let short = Uuid::new_v4().simple().to_string();
                format!("linkwire-{}", &short[..8])
            }
        }
    }

    pub fn mqtt_config(&self) -> MqttConfig {
        let mut config = MqttConfig::new(self.broker_address(), self.client_id());
        config.keep_alive = Duration::from_secs(self.keep_alive_secs);
        config
    }
}
