//! Core ledger functionality
//!
//! Blocks, transactions, the proof-of-work puzzle, the consensus rule used
//! to pick a canonical chain among peers, and the ledger that ties chain,
//! UTXO set and pending pool together.

pub mod block;
pub mod consensus;
pub mod ledger;
pub mod proof_of_work;
pub mod transaction;

pub use block::{Block, GENESIS_PREVIOUS_HASH, GENESIS_PROOF};
pub use consensus::{chain_digest, consensus, NO_CONSENSUS};
pub use ledger::{Ledger, LedgerSnapshot};
pub use proof_of_work::ProofOfWork;
pub use transaction::{Transaction, TxInput, TxOutput, Utxo};
