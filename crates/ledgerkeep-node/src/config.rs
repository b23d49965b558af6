//! Node configuration (spec §6.5): defaults layered with an optional
//! TOML file and `LEDGERKEEP_*`-prefixed environment overrides, using
//! the workspace's `config` crate convention.

use std::path::PathBuf;

use ledgerkeep_core::constants::{
    COIN_FACTOR, DEFAULT_DIFFICULTY_ADJUSTMENT_INTERVAL, DEFAULT_HALVING_INTERVAL,
    DEFAULT_INITIAL_DIFFICULTY_BITS, DEFAULT_INITIAL_SUBSIDY, DEFAULT_MAX_BLOCK_SIZE_BYTES,
    DEFAULT_MAX_BUFFER_SIZE, DEFAULT_MAX_NONCE, DEFAULT_MAX_PEERS, DEFAULT_MEMPOOL_MAX_SIZE,
    DEFAULT_P2P_PORT, DEFAULT_TARGET_BLOCK_TIME_SECS,
};
use ledgerkeep_core::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Every recognized configuration key (spec §6.5), field-for-field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target_block_time_sec: u64,
    pub difficulty_adjustment_interval: u64,
    pub initial_difficulty_bits: u32,
    pub mempool_max_size: usize,
    pub max_block_size_bytes: usize,
    pub max_nonce: u32,
    /// Whole coins; multiplied by `COIN_FACTOR` for atomic units.
    pub initial_subsidy: u64,
    pub halving_interval: u64,

    pub p2p_host: String,
    pub p2p_port: u16,
    pub seeds: Vec<String>,
    pub max_peers: usize,
    pub max_buffer_size: usize,

    pub storage_engine: String,
    pub db_name: String,
    pub data_dir: PathBuf,

    pub payout_address: Option<String>,
    pub coinbase_message: String,
    pub threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_block_time_sec: DEFAULT_TARGET_BLOCK_TIME_SECS,
            difficulty_adjustment_interval: DEFAULT_DIFFICULTY_ADJUSTMENT_INTERVAL,
            initial_difficulty_bits: DEFAULT_INITIAL_DIFFICULTY_BITS,
            mempool_max_size: DEFAULT_MEMPOOL_MAX_SIZE,
            max_block_size_bytes: DEFAULT_MAX_BLOCK_SIZE_BYTES,
            max_nonce: DEFAULT_MAX_NONCE,
            initial_subsidy: DEFAULT_INITIAL_SUBSIDY / COIN_FACTOR,
            halving_interval: DEFAULT_HALVING_INTERVAL,

            p2p_host: "0.0.0.0".to_string(),
            p2p_port: DEFAULT_P2P_PORT,
            seeds: Vec::new(),
            max_peers: DEFAULT_MAX_PEERS,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,

            storage_engine: "rocksdb".to_string(),
            db_name: "chaindata".to_string(),
            data_dir: dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("ledgerkeep"),

            payout_address: None,
            coinbase_message: "ledgerkeep genesis".to_string(),
            threads: 1,
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file at `path`, then
    /// `LEDGERKEEP_*` environment overrides (e.g. `LEDGERKEEP_P2P_PORT`).
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&defaults).map_err(|e| ConfigError::LoadFailed(e.to_string()))?);

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }
        builder = builder.add_source(config::Environment::with_prefix("LEDGERKEEP").separator("_"));

        let merged = builder.build().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        let loaded: Self = merged.try_deserialize().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_engine != "rocksdb" {
            return Err(ConfigError::UnknownStorageEngine(self.storage_engine.clone()));
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_name)
    }

    pub fn initial_subsidy_atomic(&self) -> u64 {
        self.initial_subsidy * COIN_FACTOR
    }

    pub fn p2p_bind_addr(&self) -> String {
        format!("{}:{}", self.p2p_host, self.p2p_port)
    }
}
