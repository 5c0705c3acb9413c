//! Command-line tool for linkwire namespaces.
//!
//! Provides commands for:
//! - Fetching a remote link's value
//! - Listening on a topic
//! - Serving a descriptor's links
//! - Checking a descriptor file

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;
