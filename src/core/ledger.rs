// The replicated state of one node: the chain, the UTXO set derived from it
// plus the pending pool, and the pending pool itself. The three only ever
// change together; the node keeps the whole Ledger behind one mutex.

use crate::core::transaction::{MSG_BAD_SIGNATURE, MSG_BAD_SIGNING_KEY};
use crate::core::{Block, ProofOfWork, Transaction, TxInput, TxOutput, Utxo};
use crate::error::{LedgerError, Result};
use crate::storage::{MemoryPool, UtxoSet};
use crate::wallet::{decode_signing_key, KeyPair};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Everything a peer needs to adopt this ledger wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub chain: Vec<Block>,
    pub utxos: Vec<Utxo>,
    pub txs: Vec<Transaction>,
}

impl LedgerSnapshot {
    /// The published UTXO set must be exactly what replaying the chain and
    /// the pending pool produces.
    pub fn is_consistent(&self) -> bool {
        match Ledger::rebuild(&self.chain, &self.txs) {
            Ok(replayed) => replayed == UtxoSet::from_utxos(self.utxos.iter().cloned()),
            Err(e) => {
                debug!("Snapshot does not replay: {e}");
                false
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ledger {
    chain: Vec<Block>,
    utxo_set: UtxoSet,
    pending: MemoryPool,
    reward: u64,
}

impl Ledger {
    pub fn new(reward: u64) -> Ledger {
        Ledger {
            chain: vec![],
            utxo_set: UtxoSet::new(),
            pending: MemoryPool::new(),
            reward,
        }
    }

    pub fn get_chain(&self) -> &[Block] {
        self.chain.as_slice()
    }

    pub fn get_utxo_set(&self) -> &UtxoSet {
        &self.utxo_set
    }

    pub fn get_pending(&self) -> &MemoryPool {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.chain.last()
    }

    pub fn last_hash(&self) -> Result<Option<String>> {
        self.chain.last().map(Block::hash).transpose()
    }

    /// Index of the block the next accepted transaction will land in; 0
    /// while there is no chain yet.
    pub fn next_block_index(&self) -> u64 {
        self.chain.last().map_or(0, |b| b.get_index() + 1)
    }

    /// Validates, signs and queues an ordinary transfer. `signing_key` is the
    /// textual key; it is only decoded once the transaction itself passes.
    pub fn submit_transaction(
        &mut self,
        ins: Vec<TxInput>,
        outs: Vec<TxOutput>,
        signing_key: &str,
    ) -> Result<(Transaction, u64)> {
        let mut tx = Transaction::new(ins, outs, false)?;
        tx.validate_structure(&self.utxo_set, self.reward)?;
        let signer = decode_signing_key(signing_key)
            .map_err(|_| LedgerError::invalid_transaction(MSG_BAD_SIGNING_KEY))?;
        tx.sign(&signer)?;
        if !tx.verify_signature() {
            return Err(LedgerError::invalid_transaction(MSG_BAD_SIGNATURE));
        }

        self.apply_transaction_to_utxo(&tx)?;
        self.pending.push(tx.clone());
        debug!("Queued transaction {}", tx.get_hash());
        Ok((tx, self.next_block_index()))
    }

    /// Pays the reward to `miner` and puts the coinbase at the head of the
    /// pending pool.
    pub fn submit_coinbase(&mut self, miner: &KeyPair) -> Result<(Transaction, u64)> {
        let mut tx = Transaction::new_coinbase(&miner.address(), self.reward)?;
        tx.validate_structure(&self.utxo_set, self.reward)?;
        tx.sign(miner)?;

        self.apply_transaction_to_utxo(&tx)?;
        self.pending.push_front(tx.clone());
        Ok((tx, self.next_block_index()))
    }

    pub fn apply_transaction_to_utxo(&mut self, tx: &Transaction) -> Result<()> {
        self.utxo_set.apply_transaction(tx)
    }

    pub fn genesis(&mut self, miner: &KeyPair) -> Result<Block> {
        if !self.chain.is_empty() {
            return Err(LedgerError::InvalidBlock(
                "Chain already has a genesis block".to_string(),
            ));
        }
        self.submit_coinbase(miner)?;
        let transactions = self.pending.take_all();
        let block = Block::generate_genesis_block(transactions)?;
        info!("Created genesis block");
        self.chain.push(block.clone());
        Ok(block)
    }

    pub fn verify_pending_signatures(&self) -> Result<()> {
        match self.pending.iter().find(|tx| !tx.verify_signature()) {
            Some(tx) => {
                warn!("Pending transaction {} has a bad signature", tx.get_hash());
                Err(LedgerError::Mining(
                    "Found invalid transaction in block.".to_string(),
                ))
            }
            None => Ok(()),
        }
    }

    /// Appends a block holding the whole pending pool behind a fresh
    /// coinbase. `previous_hash` must still be the hash of our last block;
    /// nothing is mutated when any check fails.
    pub fn forge_block(
        &mut self,
        proof: String,
        previous_hash: &str,
        miner: &KeyPair,
    ) -> Result<Block> {
        let tip = self
            .last_hash()?
            .ok_or_else(|| LedgerError::Mining("Cannot mine on an empty chain".to_string()))?;
        if tip != previous_hash {
            return Err(LedgerError::InvalidBlock(format!(
                "Chain tip moved from {previous_hash} to {tip}"
            )));
        }
        self.verify_pending_signatures()?;

        let index = self.next_block_index();
        self.submit_coinbase(miner)?;
        let transactions = self.pending.take_all();
        let block = Block::new_block(index, transactions, proof, previous_hash.to_string())?;
        info!(
            "Forged block {} with {} transactions",
            block.get_index(),
            block.get_transactions().len()
        );
        self.chain.push(block.clone());
        Ok(block)
    }

    // Runs the nonce search inline. The node drops its lock around the search
    // instead; this is for callers that own the ledger outright.
    pub fn mine(&mut self, miner: &KeyPair, difficulty: u32) -> Result<Block> {
        let last = self
            .last_block()
            .cloned()
            .ok_or_else(|| LedgerError::Mining("Cannot mine on an empty chain".to_string()))?;
        let last_hash = last.hash()?;
        self.verify_pending_signatures()?;

        let pow = ProofOfWork::new_proof_of_work(&last, &last_hash, difficulty, &miner.address());
        let proof = pow.run();
        self.forge_block(proof, &last_hash, miner)
    }

    /// Accepts a transaction announced by a peer. Returns whether it was
    /// added; duplicates and coinbase announcements are skipped.
    pub fn admit_gossiped(&mut self, tx: Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(false);
        }
        if self.pending.contains(tx.get_hash()) {
            return Ok(false);
        }
        if !tx.verify_signature() {
            return Err(LedgerError::invalid_transaction(MSG_BAD_SIGNATURE));
        }
        tx.validate(&self.utxo_set, self.reward)?;

        self.apply_transaction_to_utxo(&tx)?;
        self.pending.push(tx);
        Ok(true)
    }

    /// Every adjacent pair must link by hash and carry a valid proof.
    pub fn valid_chain(chain: &[Block]) -> bool {
        for pair in chain.windows(2) {
            let (last, block) = (&pair[0], &pair[1]);
            let last_hash = match last.hash() {
                Ok(hash) => hash,
                Err(_) => return false,
            };
            if block.get_previous_hash() != last_hash {
                return false;
            }
            if !ProofOfWork::valid_proof(last.get_proof(), block.get_proof(), &last_hash) {
                return false;
            }
        }
        true
    }

    /// Replays the chain and then the pending pool into a fresh UTXO set.
    pub fn rebuild(chain: &[Block], pending: &[Transaction]) -> Result<UtxoSet> {
        let chained = chain.iter().flat_map(|b| b.get_transactions().iter());
        UtxoSet::rebuild(chained.chain(pending.iter()))
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            chain: self.chain.clone(),
            utxos: self.utxo_set.to_vec(),
            txs: self.pending.to_vec(),
        }
    }

    /// Adopts `snapshot` when its chain is strictly longer than ours, valid,
    /// and consistent with its UTXO set. Swaps all three parts at once.
    pub fn replace(&mut self, snapshot: LedgerSnapshot) -> Result<bool> {
        if snapshot.chain.len() <= self.chain.len() {
            return Ok(false);
        }
        if !Self::valid_chain(&snapshot.chain) {
            return Err(LedgerError::InvalidBlock(
                "Peer chain failed validation".to_string(),
            ));
        }
        if !snapshot.is_consistent() {
            return Err(LedgerError::InvalidBlock(
                "Peer UTXO set does not match its chain".to_string(),
            ));
        }

        let LedgerSnapshot { chain, utxos, txs } = snapshot;
        self.chain = chain;
        self.utxo_set = UtxoSet::from_utxos(utxos);
        self.pending = MemoryPool::from_transactions(txs);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::MSG_INPUTS_NOT_FOUND;
    use crate::testnet::test_utils::{create_test_ledger, mine_blocks, transfer};
    use crate::wallet::generate_keypair;

    #[test]
    fn test_genesis_pays_reward() {
        let (ledger, miner) = create_test_ledger();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get_utxo_set().balance(&miner.address()), 2);
        assert!(ledger.get_pending().is_empty());
        assert_eq!(ledger.next_block_index(), 2);
    }

    #[test]
    fn test_second_genesis_rejected() {
        let (mut ledger, miner) = create_test_ledger();
        assert!(ledger.genesis(&miner).is_err());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_empty_ledger_reports_index_zero() {
        let mut ledger = Ledger::new(2);
        let keys = generate_keypair().unwrap();
        assert_eq!(ledger.next_block_index(), 0);
        assert!(matches!(ledger.mine(&keys, 1), Err(LedgerError::Mining(_))));
    }

    #[test]
    fn test_submit_returns_next_index_and_updates_utxos() {
        let (mut ledger, alice) = create_test_ledger();
        let bob = generate_keypair().unwrap();

        let (tx, index) = transfer(&mut ledger, &alice, &bob.address(), 1);
        assert_eq!(index, 2);
        assert!(ledger.get_pending().contains(tx.get_hash()));
        assert_eq!(ledger.get_utxo_set().balance(&alice.address()), 1);
        assert_eq!(ledger.get_utxo_set().balance(&bob.address()), 1);
    }

    #[test]
    fn test_submit_with_wrong_key_rejected() {
        let (mut ledger, alice) = create_test_ledger();
        let mallory = generate_keypair().unwrap();
        let ins = ledger.get_utxo_set().find_for_address(&alice.address());
        let before = ledger.get_utxo_set().clone();

        let result = ledger.submit_transaction(
            ins,
            vec![TxOutput::new(2, &mallory.address())],
            &mallory.signing_key_text(),
        );
        assert_eq!(
            result.unwrap_err(),
            LedgerError::invalid_transaction(MSG_BAD_SIGNATURE)
        );
        assert_eq!(ledger.get_utxo_set(), &before);
        assert!(ledger.get_pending().is_empty());
    }

    #[test]
    fn test_undecodable_key_checked_after_transaction_rules() {
        let (mut ledger, alice) = create_test_ledger();
        let ins = ledger.get_utxo_set().find_for_address(&alice.address());

        let missing_outputs = ledger.submit_transaction(ins.clone(), vec![], "not-a-key");
        assert_eq!(
            missing_outputs.unwrap_err().message(),
            "Must provide transaction outputs."
        );

        let bad_key = ledger.submit_transaction(
            ins,
            vec![TxOutput::new(2, &alice.address())],
            "not-a-key",
        );
        assert_eq!(
            bad_key.unwrap_err(),
            LedgerError::invalid_transaction(MSG_BAD_SIGNING_KEY)
        );
    }

    #[test]
    fn test_mine_puts_coinbase_first_and_clears_pool() {
        let (mut ledger, alice) = create_test_ledger();
        let bob = generate_keypair().unwrap();
        transfer(&mut ledger, &alice, &bob.address(), 2);

        let block = ledger.mine(&alice, 1).unwrap();
        assert_eq!(block.get_index(), 2);
        assert_eq!(block.get_transactions().len(), 2);
        assert!(block.get_transactions()[0].is_coinbase());
        assert!(ledger.get_pending().is_empty());
        assert!(Ledger::valid_chain(ledger.get_chain()));
    }

    #[test]
    fn test_forge_rejects_stale_tip() {
        let (mut ledger, miner) = create_test_ledger();
        let result = ledger.forge_block("1-x0".to_string(), "stale", &miner);
        assert!(matches!(result, Err(LedgerError::InvalidBlock(_))));
        assert_eq!(ledger.len(), 1);
        assert!(ledger.get_pending().is_empty());
    }

    #[test]
    fn test_valid_chain_detects_broken_links() {
        let (mut ledger, miner) = create_test_ledger();
        mine_blocks(&mut ledger, &miner, 3);
        let chain = ledger.get_chain().to_vec();
        assert!(Ledger::valid_chain(&chain));
        assert!(Ledger::valid_chain(&chain[..1]));
        assert!(Ledger::valid_chain(&[]));

        let mut relinked = chain.clone();
        relinked[2].set_previous_hash("deadbeef");
        assert!(!Ledger::valid_chain(&relinked));

        let mut bad_final_proof = chain.clone();
        let last = bad_final_proof.len() - 1;
        bad_final_proof[last].set_proof("64-nope");
        assert!(!Ledger::valid_chain(&bad_final_proof));
    }

    #[test]
    fn test_utxo_total_equals_reward_times_blocks() {
        let (mut ledger, alice) = create_test_ledger();
        let bob = generate_keypair().unwrap();
        mine_blocks(&mut ledger, &alice, 2);
        transfer(&mut ledger, &alice, &bob.address(), 3);
        ledger.mine(&alice, 1).unwrap();

        let blocks = ledger.len() as u64;
        assert_eq!(ledger.get_utxo_set().total_value(), 2 * blocks);
        let replayed = Ledger::rebuild(ledger.get_chain(), &[]).unwrap();
        assert_eq!(&replayed, ledger.get_utxo_set());
    }

    #[test]
    fn test_gossiped_transaction_admitted_once() {
        let (mut origin, alice) = create_test_ledger();
        let mut replica = origin.clone();
        let bob = generate_keypair().unwrap();
        let (tx, _) = transfer(&mut origin, &alice, &bob.address(), 2);

        assert!(replica.admit_gossiped(tx.clone()).unwrap());
        assert!(!replica.admit_gossiped(tx).unwrap());
        assert_eq!(replica.get_pending().len(), 1);
        assert_eq!(replica.get_utxo_set(), origin.get_utxo_set());
    }

    #[test]
    fn test_gossiped_double_spend_rejected() {
        let (mut origin, alice) = create_test_ledger();
        let mut replica = origin.clone();
        let bob = generate_keypair().unwrap();
        let carol = generate_keypair().unwrap();
        let (to_bob, _) = transfer(&mut origin, &alice, &bob.address(), 2);
        let (to_carol, _) = transfer(&mut replica, &alice, &carol.address(), 2);

        let err = origin.admit_gossiped(to_carol).unwrap_err();
        assert_eq!(err.message(), MSG_INPUTS_NOT_FOUND);
        assert!(!replica.admit_gossiped(to_bob).unwrap_or(false));
    }

    #[test]
    fn test_gossiped_coinbase_ignored() {
        let (mut ledger, miner) = create_test_ledger();
        let coinbase = Transaction::new_coinbase(&miner.address(), 2).unwrap();
        assert!(!ledger.admit_gossiped(coinbase).unwrap());
        assert!(ledger.get_pending().is_empty());
    }

    #[test]
    fn test_replace_only_with_longer_consistent_snapshot() {
        let (mut short, miner) = create_test_ledger();
        let mut long = short.clone();
        mine_blocks(&mut long, &miner, 2);

        assert!(!long.replace(short.snapshot()).unwrap());

        let mut tampered = long.snapshot();
        tampered.utxos.pop();
        assert!(!tampered.is_consistent());
        assert!(short.replace(tampered).is_err());
        assert_eq!(short.len(), 1);

        assert!(short.replace(long.snapshot()).unwrap());
        assert_eq!(short.snapshot(), long.snapshot());
    }
}
