//! Configuration management
//!
//! Node settings: listen address, seed peers, mining parameters and network
//! timeouts.

pub mod settings;

pub use settings::{
    Config, DEFAULT_BASE_DIFFICULTY, DEFAULT_NODE_ADDR, DEFAULT_PEER_TIMEOUT_MS, DEFAULT_REWARD,
    DEFAULT_SETTLE_DELAY_MS, DEFAULT_TRANSACTIONS_PER_BLOCK,
};
