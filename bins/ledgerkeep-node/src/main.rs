//! LedgerKeep node binary.
//!
//! Loads configuration (defaults + optional TOML file + `LEDGERKEEP_*`
//! environment overrides), opens or bootstraps the chain, and starts the
//! transport and, for `--role miner`, the block-builder thread.

use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use ledgerkeep_node_lib::config::Config;
use ledgerkeep_node_lib::{Node, NodeRole};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Full,
    Miner,
}

/// LedgerKeep — a UTXO-model proof-of-work node.
#[derive(Parser, Debug)]
#[command(name = "ledgerkeep-node", version, about = "LedgerKeep full/miner node")]
struct Args {
    /// Path to a TOML configuration file (spec §6.5).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for chain storage; overrides the configured value.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// P2P listen port; overrides the configured value.
    #[arg(long)]
    p2p_port: Option<u16>,

    /// Base58Check address credited with mining rewards and the genesis
    /// coinbase output.
    #[arg(long)]
    payout_address: Option<String>,

    /// Whether this process also mines blocks.
    #[arg(long, value_enum, default_value_t = RoleArg::Full)]
    role: RoleArg,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration error");
            process::exit(1);
        }
    };

    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(port) = args.p2p_port {
        config.p2p_port = port;
    }
    if let Some(address) = args.payout_address {
        config.payout_address = Some(address);
    }

    let role = match args.role {
        RoleArg::Full => NodeRole::Full,
        RoleArg::Miner => NodeRole::Miner,
    };

    let node = match Node::new(config, role) {
        Ok(node) => std::sync::Arc::new(node),
        Err(e) => {
            error!(error = %e, "failed to open node storage");
            process::exit(1);
        }
    };

    if let Err(e) = node.start() {
        error!(error = %e, "failed to start node");
        process::exit(1);
    }

    info!(height = node.tip_height().unwrap_or(0), role = ?role, "node started");

    loop {
        std::thread::park();
    }
}
