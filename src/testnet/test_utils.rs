//! Test utilities for ledger and node testing

use crate::config::Config;
use crate::core::{Ledger, Transaction, TxOutput};
use crate::wallet::{generate_keypair, KeyPair};

/// Reward used by every test ledger
pub const TEST_REWARD: u64 = 2;

/// Difficulty low enough that a proof is found in a handful of attempts
pub const TEST_DIFFICULTY: u32 = 1;

/// A ledger with its genesis block already paid to the returned key
pub fn create_test_ledger() -> (Ledger, KeyPair) {
    let miner = generate_keypair().expect("key generation");
    let mut ledger = Ledger::new(TEST_REWARD);
    ledger.genesis(&miner).expect("genesis block");
    (ledger, miner)
}

/// Mines `count` blocks paying `miner`
pub fn mine_blocks(ledger: &mut Ledger, miner: &KeyPair, count: usize) {
    for _ in 0..count {
        ledger.mine(miner, TEST_DIFFICULTY).expect("mined block");
    }
}

/// Sends `amount` from `from` to `to`, returning change to `from`. Picks
/// unspent outputs in set order until the amount is covered.
pub fn transfer(ledger: &mut Ledger, from: &KeyPair, to: &str, amount: u64) -> (Transaction, u64) {
    let mut ins = vec![];
    let mut gathered = 0u64;
    for utxo in ledger.get_utxo_set().find_for_address(&from.address()) {
        if gathered >= amount {
            break;
        }
        gathered += utxo.amount;
        ins.push(utxo);
    }
    assert!(gathered >= amount, "not enough funds for the transfer");

    let mut outs = vec![TxOutput::new(amount, to)];
    if gathered > amount {
        outs.push(TxOutput::new(gathered - amount, &from.address()));
    }
    ledger
        .submit_transaction(ins, outs, &from.signing_key_text())
        .expect("valid transfer")
}

/// Node settings for loopback tests: any free port, trivial proofs, no
/// automatic genesis and a short reconciliation delay
pub fn test_config() -> Config {
    Config {
        node_address: "127.0.0.1:0".to_string(),
        base_difficulty: TEST_DIFFICULTY,
        reward: TEST_REWARD,
        transactions_per_block: 0,
        peer_timeout_ms: 1000,
        settle_delay_ms: 50,
        ensemble: true,
        ..Config::default()
    }
}
