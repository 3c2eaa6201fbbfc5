//! Command-line entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::constants::{ENV_CONFIG, ENV_LOG};

#[derive(Parser, Debug)]
#[command(name = "ringcentral-bridge")]
#[command(version, about = "RingCentral Team Messaging channel bridge", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the JSON config file.
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "ringcentral_bridge=debug".
    #[arg(long, global = true, env = ENV_LOG)]
    pub log: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the bridge: one Subscription Manager per enabled account (default).
    Run,
    /// Load and print the resolved configuration with credentials redacted.
    CheckConfig,
    /// Delete the on-disk chat cache to force a full resync on next refresh.
    PruneCache {
        /// Workspace directory; defaults to the first enabled account's workspace.
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}
