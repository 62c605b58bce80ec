use crate::error::{LedgerError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_NODE_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_BASE_DIFFICULTY: u32 = 3;
pub const DEFAULT_REWARD: u64 = 2;
pub const DEFAULT_TRANSACTIONS_PER_BLOCK: usize = 5;
pub const DEFAULT_PEER_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1000;

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const SEEDS_KEY: &str = "GOODCOIN_SEEDS";
const BASE_DIFFICULTY_KEY: &str = "GOODCOIN_BASE_DIFFICULTY";

/// Settings for one node.
///
/// Built from the defaults, then an optional TOML file, then the
/// environment, then command-line flags; each layer only overrides what it
/// sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `host:port` this node listens on and announces to peers
    pub node_address: String,
    /// Peers to register with at startup
    pub seeds: Vec<String>,
    /// Added to `floor(sqrt(peers))` to get the proof-of-work difficulty
    pub base_difficulty: u32,
    pub reward: u64,
    /// Pending pool size that triggers mining; 0 turns automatic mining off
    pub transactions_per_block: usize,
    pub peer_timeout_ms: u64,
    /// How long the reconciler waits after a block is appended
    pub settle_delay_ms: u64,
    /// Part of a managed ensemble: skip the automatic genesis or sync
    pub ensemble: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node_address: DEFAULT_NODE_ADDR.to_string(),
            seeds: vec![],
            base_difficulty: DEFAULT_BASE_DIFFICULTY,
            reward: DEFAULT_REWARD,
            transactions_per_block: DEFAULT_TRANSACTIONS_PER_BLOCK,
            peer_timeout_ms: DEFAULT_PEER_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            ensemble: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path).map_err(|e| {
            LedgerError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Config> {
        let config: Config = toml::from_str(text)?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides looked up through `lookup`, which stands in for the
    /// process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(NODE_ADDRESS_KEY) {
            self.node_address = addr;
        }
        if let Some(seeds) = lookup(SEEDS_KEY) {
            self.seeds = seeds
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(difficulty) = lookup(BASE_DIFFICULTY_KEY) {
            self.base_difficulty = difficulty.trim().parse().map_err(|e| {
                LedgerError::Config(format!("{BASE_DIFFICULTY_KEY} must be a number: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_address.trim().is_empty() {
            return Err(LedgerError::Config(
                "node_address must not be empty".to_string(),
            ));
        }
        if self.reward == 0 {
            return Err(LedgerError::Config("reward must be positive".to_string()));
        }
        if self.peer_timeout_ms == 0 {
            return Err(LedgerError::Config(
                "peer_timeout_ms must be positive".to_string(),
            ));
        }
        // 64 zero hex digits is the whole digest
        if self.base_difficulty > 64 {
            return Err(LedgerError::Config(
                "base_difficulty cannot exceed 64".to_string(),
            ));
        }
        Ok(())
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
