//! Global command-line options.

use crate::commands::Command;
use anyhow::Context;
use clap::Parser;
use node::NodeConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "linkwire", version, about = "Request/response over MQTT namespaces")]
pub struct CliConfig {
    /// JSON node configuration; flags below override its fields
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub scheme: Option<String>,

    #[arg(long, global = true)]
    pub host: Option<String>,

    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[arg(long, global = true)]
    pub client_id: Option<String>,

    /// Log filter, used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    /// Node configuration from `--config` (or defaults) with flag overrides.
    pub fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => NodeConfig::default(),
        };
        if let Some(scheme) = &self.scheme {
            config.scheme = scheme.clone();
        }
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(client_id) = &self.client_id {
            config.client_id = Some(client_id.clone());
        }
        Ok(config)
    }

    /// Install logging, build the runtime and execute the subcommand.
    pub fn run(self) -> anyhow::Result<()> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.log_level).context("invalid --log-level")?,
        };
        tracing_subscriber::fmt().with_env_filter(filter).init();

        let node_config = self.node_config()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("building tokio runtime")?;

        let result = runtime.block_on(self.command.execute(&node_config))?;
        print!("{result}");
        Ok(())
    }
}
