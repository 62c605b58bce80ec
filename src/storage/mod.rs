//! In-memory ledger storage
//!
//! The UTXO set and the pool of pending transactions. Nothing is persisted:
//! a restarted node recovers its state from peers.

pub mod memory_pool;
pub mod utxo_set;

pub use memory_pool::MemoryPool;
pub use utxo_set::UtxoSet;
