//! Subcommands of the `linkwire` binary.

use anyhow::{bail, Context};
use clap::Subcommand;
use corelib::{Capabilities, Descriptor, Method};
use node::{CallPolicy, CorrelationClient, Node, NodeConfig};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use transport::{MqttTransport, PubSubClient};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch the value of a remote link
    Get {
        /// `<endpoint>/<path>`
        link: String,

        #[arg(long)]
        attempts: Option<u32>,

        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Print every payload published on a topic
    Listen {
        /// Topic or wildcard pattern
        topic: String,

        /// Exit after this many payloads
        #[arg(long)]
        count: Option<usize>,
    },

    /// Serve a descriptor's links until interrupted
    Serve {
        descriptor: PathBuf,

        /// Initial value of a gettable link, `link=body`
        #[arg(long = "value", value_parser = parse_assignment)]
        values: Vec<(String, String)>,
    },

    /// Parse a descriptor and print its flattened namespace
    Check { descriptor: PathBuf },
}

/// Outcome of a command, printed by the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Value(String),
    Received(usize),
    Served { end_point: String },
    Namespace(Vec<NamespaceEntry>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEntry {
    pub path: String,
    pub link_type: String,
    pub capabilities: Capabilities,
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::Value(body) => writeln!(f, "{body}"),
            CommandResult::Received(n) => writeln!(f, "received {n} payload(s)"),
            CommandResult::Served { end_point } => writeln!(f, "stopped serving {end_point}"),
            CommandResult::Namespace(entries) => {
                for entry in entries {
                    writeln!(f, "{:<40} {:<10} {}", entry.path, entry.link_type, flags(&entry.capabilities))?;
                }
                Ok(())
            }
        }
    }
}

fn flags(caps: &Capabilities) -> String {
    let mut out = Vec::new();
    if caps.subscribable {
        out.push("sub");
    }
    if caps.publishable {
        out.push("pub");
    }
    if caps.gettable {
        out.push("get");
    }
    if caps.puttable {
        out.push("put");
    }
    out.join(",")
}

impl Command {
    pub async fn execute(self, config: &NodeConfig) -> anyhow::Result<CommandResult> {
        match self {
            Command::Get {
                link,
                attempts,
                timeout_secs,
            } => {
                let defaults = config.call_policy;
                let policy = CallPolicy::new(
                    attempts.unwrap_or(defaults.attempts),
                    timeout_secs.unwrap_or(defaults.timeout_secs),
                );
                get(config, &link, policy).await
            }
            Command::Listen { topic, count } => listen(config, &topic, count).await,
            Command::Serve { descriptor, values } => serve(config, &descriptor, values).await,
            Command::Check { descriptor } => check(&descriptor),
        }
    }
}

async fn connect(config: &NodeConfig) -> anyhow::Result<Arc<PubSubClient>> {
    let transport = MqttTransport::new(config.mqtt_config())?;
    let client = Arc::new(PubSubClient::new(Arc::new(transport)));
    client
        .start()
        .await
        .with_context(|| format!("connecting to {}", config.broker_address()))?;
    Ok(client)
}

async fn get(config: &NodeConfig, link: &str, policy: CallPolicy) -> anyhow::Result<CommandResult> {
    let client = connect(config).await?;
    let correlation = CorrelationClient::new(Arc::clone(&client));
    let outcome = correlation
        .call(link, Method::Get, "", policy.attempts, policy.timeout())
        .await;
    client.stop().await;

    let response = outcome.with_context(|| format!("GET {link}"))?;
    Ok(CommandResult::Value(response.body))
}

async fn listen(config: &NodeConfig, topic: &str, count: Option<usize>) -> anyhow::Result<CommandResult> {
    let client = connect(config).await?;
    let mut payloads = client.subscribe(topic).await?;
    info!(topic, "listening");

    let mut received = 0;
    while count.map_or(true, |limit| received < limit) {
        tokio::select! {
            payload = payloads.recv() => match payload {
                Some(payload) => {
                    received += 1;
                    println!("{topic}: {}", String::from_utf8_lossy(&payload));
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.stop().await;
    Ok(CommandResult::Received(received))
}

async fn serve(
    config: &NodeConfig,
    path: &Path,
    values: Vec<(String, String)>,
) -> anyhow::Result<CommandResult> {
    let descriptor = load_descriptor(path)?;
    let end_point = descriptor.end_point().to_string();
    let node = Node::from_config(descriptor, config)?;
    for (link, body) in values {
        node.set_value(&link, body)
            .with_context(|| format!("--value {link}"))?;
    }

    node.start().await?;
    info!(end_point = %end_point, links = node.links().len(), "serving, Ctrl-C to stop");
    if !node.verify().await {
        warn!(end_point = %end_point, "some required requests are unreachable");
    }

    let interrupted = tokio::signal::ctrl_c().await;
    node.stop().await;
    interrupted.context("waiting for Ctrl-C")?;
    Ok(CommandResult::Served { end_point })
}

fn check(path: &Path) -> anyhow::Result<CommandResult> {
    let descriptor = load_descriptor(path)?;
    let entries = descriptor
        .links()
        .iter()
        .map(|(path, link)| NamespaceEntry {
            path: path.clone(),
            link_type: link.link_type.clone(),
            capabilities: Capabilities::classify(&link.link_type),
        })
        .collect();
    Ok(CommandResult::Namespace(entries))
}

fn load_descriptor(path: &Path) -> anyhow::Result<Descriptor> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Descriptor::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

fn parse_assignment(arg: &str) -> anyhow::Result<(String, String)> {
    match arg.split_once('=') {
        Some((link, body)) if !link.is_empty() => Ok((link.to_string(), body.to_string())),
        _ => bail!("expected link=body, got {arg:?}"),
    }
}
