//! Node composition and configuration for a LedgerKeep full/miner node
//! (spec §6.3–§6.5, §9).
//!
//! - [`config::Config`] — the full recognized-key configuration table
//! - [`node::Node`] — wires the block store, UTXO set, mempool, and
//!   network transport into a running node, with an optional miner thread

pub mod config;
pub mod node;

pub use config::Config;
pub use node::{Node, NodeRole};
