use crate::core::Transaction;
use crate::error::{LedgerError, Result};
use crate::utils::{canonical_hash, current_timestamp};
use serde::{Deserialize, Serialize};

/// Previous-hash placeholder carried by the first block of every chain.
pub const GENESIS_PREVIOUS_HASH: &str = "1";
/// Proof carried by the first block; it is never checked.
pub const GENESIS_PROOF: &str = "100";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    index: u64, // 1-based position in the chain
    timestamp: i64,
    transactions: Vec<Transaction>, // coinbase first
    proof: String,
    previous_hash: String,
}

impl Block {
    pub fn new_block(
        index: u64,
        transactions: Vec<Transaction>,
        proof: String,
        previous_hash: String,
    ) -> Result<Block> {
        if index == 0 {
            return Err(LedgerError::InvalidBlock(
                "Block index starts at 1".to_string(),
            ));
        }

        Ok(Block {
            index,
            timestamp: current_timestamp()?,
            transactions,
            proof,
            previous_hash,
        })
    }

    pub fn generate_genesis_block(transactions: Vec<Transaction>) -> Result<Block> {
        Block::new_block(
            1,
            transactions,
            GENESIS_PROOF.to_string(),
            GENESIS_PREVIOUS_HASH.to_string(),
        )
    }

    /// SHA-256 over the canonical form of the whole block. Not stored: the
    /// next block's `previous_hash` is the only place it is recorded.
    pub fn hash(&self) -> Result<String> {
        canonical_hash(self)
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_proof(&self) -> &str {
        self.proof.as_str()
    }

    pub fn get_previous_hash(&self) -> &str {
        self.previous_hash.as_str()
    }

    #[cfg(test)]
    pub(crate) fn set_previous_hash(&mut self, previous_hash: &str) {
        self.previous_hash = previous_hash.to_string();
    }

    #[cfg(test)]
    pub(crate) fn set_proof(&mut self, proof: &str) {
        self.proof = proof.to_string();
    }
}
