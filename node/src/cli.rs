//! # CLI Interface
//!
//! Defines the command-line argument structure for `nova-node` using
//! `clap` derive. The gossip node's own settings (peer-set sizes, cooldowns,
//! listen addresses, known peers) live in the TOML file pointed to by
//! `--config`; the CLI surface itself only controls process-level concerns.

use std::path::PathBuf;

use clap::Parser;

/// Gossip overlay network node.
#[derive(Parser, Debug)]
#[command(name = "nova-node", about = "Gossip overlay network node", version)]
pub struct NovaNodeCli {
    /// Path to the node configuration file (TOML).
    #[arg(long, short = 'c', env = "NOVA_CONFIG", default_value = "config.toml")]
    pub config: PathBuf,

    /// Enable verbose (debug-level) logging.
    #[arg(long, short = 'v', env = "NOVA_VERBOSE")]
    pub verbose: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long, env = "NOVA_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Address the admin HTTP surface (health/status/metrics) listens on.
    #[arg(long, env = "NOVA_ADMIN_ADDRESS", default_value = "127.0.0.1:9742")]
    pub admin_address: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        NovaNodeCli::command().debug_assert();
    }
}
