//! # Goodcoin - A Small Proof-of-Work Ledger Network
//!
//! This is a teaching cryptocurrency: every node keeps a chain of blocks, a
//! set of unspent outputs and a pool of pending transactions, and a handful
//! of nodes on one machine agree on a single history.
//! When I come back to this code, here's what I need to remember:
//!
//! ## What I Built
//! - **UTXO Ledger**: signed transfers that spend whole outputs and pay change
//! - **Proof-of-Work**: a leading-zeros puzzle whose difficulty grows with the network
//! - **Consensus**: longest chain held by a strict majority of trusted peers
//! - **Gossip**: new transactions are pushed to every subscribed peer
//! - **Trust Modes**: good and bad nodes only ever adopt each other's chains within their own group
//!
//! ## How I Organized My Code
//! - `core/`: blocks, transactions, proof-of-work, consensus and the ledger
//! - `wallet/`: P-256 keypairs and base58 addresses
//! - `storage/`: the in-memory UTXO set and pending pool
//! - `network/`: wire protocol, client, server, peers and gossip
//! - `node/`: the replica that ties ledger and network together
//! - `config/`: settings from defaults, TOML, environment and flags
//! - `utils/`: hashing, base58, signatures and canonical JSON
//! - `cli/`: command-line interface
//!
//! ## When I Need to Understand Something
//! 1. Start with `main.rs` to see the CLI commands
//! 2. Look at `core/ledger.rs` for how transactions become blocks
//! 3. Check `core/transaction.rs` for the validation rules
//! 4. Review `node/mod.rs` for mining and chain resolution
//! 5. Read `network/protocol.rs` for what goes over the wire

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod node;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::Config;
pub use core::{
    chain_digest, consensus, Block, Ledger, LedgerSnapshot, ProofOfWork, Transaction, TxInput,
    TxOutput, Utxo, NO_CONSENSUS,
};
pub use error::{LedgerError, Result};
pub use network::{PeerClient, Request, Response, Server, TrustMode};
pub use node::Node;
pub use storage::{MemoryPool, UtxoSet};
pub use utils::{base58_decode, base58_encode, current_timestamp, sha256_hex};
pub use wallet::{generate_keypair, validate_address, KeyPair};
