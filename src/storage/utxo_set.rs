use crate::core::{Transaction, Utxo};
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// The set of unspent outputs. I keep it ordered so two replicas holding the
// same outputs always publish them in the same order, which makes comparing
// snapshots a plain equality check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoSet {
    utxos: BTreeSet<Utxo>,
}

impl UtxoSet {
    pub fn new() -> UtxoSet {
        UtxoSet::default()
    }

    pub fn from_utxos(utxos: impl IntoIterator<Item = Utxo>) -> UtxoSet {
        UtxoSet {
            utxos: utxos.into_iter().collect(),
        }
    }

    /// Replay `transactions` in order into an empty set.
    pub fn rebuild<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> Result<UtxoSet> {
        let mut set = UtxoSet::new();
        for tx in transactions {
            set.apply_transaction(tx)?;
        }
        Ok(set)
    }

    pub fn contains(&self, utxo: &Utxo) -> bool {
        self.utxos.contains(utxo)
    }

    // I check every input before touching the set so a bad transaction can't
    // leave it half applied
    pub fn apply_transaction(&mut self, tx: &Transaction) -> Result<()> {
        if !tx.is_coinbase() {
            if let Some(missing) = tx.get_ins().iter().find(|i| !self.utxos.contains(*i)) {
                return Err(LedgerError::InvalidBlock(format!(
                    "Transaction {} spends unknown output {}:{}",
                    tx.get_hash(),
                    missing.tx_hash,
                    missing.output_index
                )));
            }
            for input in tx.get_ins() {
                self.utxos.remove(input);
            }
        }

        for (output_index, out) in tx.get_outs().iter().enumerate() {
            self.utxos.insert(Utxo {
                tx_hash: tx.get_hash().to_string(),
                output_index,
                amount: out.amount,
                addr: out.addr.clone(),
            });
        }
        Ok(())
    }

    pub fn find_for_address(&self, addr: &str) -> Vec<Utxo> {
        self.utxos
            .iter()
            .filter(|u| u.addr == addr)
            .cloned()
            .collect()
    }

    pub fn balance(&self, addr: &str) -> u64 {
        self.utxos
            .iter()
            .filter(|u| u.addr == addr)
            .fold(0u64, |acc, u| acc.saturating_add(u.amount))
    }

    pub fn total_value(&self) -> u64 {
        self.utxos
            .iter()
            .fold(0u64, |acc, u| acc.saturating_add(u.amount))
    }

    pub fn to_vec(&self) -> Vec<Utxo> {
        self.utxos.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TxOutput;
    use crate::wallet::generate_keypair;

    fn utxo(tx_hash: &str, output_index: usize, amount: u64, addr: &str) -> Utxo {
        Utxo {
            tx_hash: tx_hash.to_string(),
            output_index,
            amount,
            addr: addr.to_string(),
        }
    }

    #[test]
    fn test_coinbase_adds_single_output() {
        let miner = generate_keypair().unwrap();
        let coinbase = Transaction::new_coinbase(&miner.address(), 2).unwrap();

        let mut set = UtxoSet::new();
        set.apply_transaction(&coinbase).unwrap();

        assert_eq!(set.len(), 1);
        assert_eq!(set.balance(&miner.address()), 2);
        assert!(set.contains(&utxo(coinbase.get_hash(), 0, 2, &miner.address())));
    }

    #[test]
    fn test_spend_replaces_inputs_with_outputs() {
        let alice = generate_keypair().unwrap();
        let bob = generate_keypair().unwrap();
        let coinbase = Transaction::new_coinbase(&alice.address(), 2).unwrap();
        let mut set = UtxoSet::rebuild([&coinbase]).unwrap();

        let input = utxo(coinbase.get_hash(), 0, 2, &alice.address());
        let mut spend = Transaction::new(
            vec![input.clone()],
            vec![
                TxOutput::new(1, &bob.address()),
                TxOutput::new(1, &alice.address()),
            ],
            false,
        )
        .unwrap();
        spend.sign(&alice).unwrap();
        set.apply_transaction(&spend).unwrap();

        assert!(!set.contains(&input));
        assert_eq!(set.balance(&alice.address()), 1);
        assert_eq!(set.balance(&bob.address()), 1);
        assert_eq!(set.total_value(), 2);
        assert_eq!(set.find_for_address(&bob.address())[0].output_index, 0);
    }

    #[test]
    fn test_unknown_input_leaves_set_untouched() {
        let alice = generate_keypair().unwrap();
        let coinbase = Transaction::new_coinbase(&alice.address(), 2).unwrap();
        let mut set = UtxoSet::rebuild([&coinbase]).unwrap();
        let before = set.clone();

        let spend = Transaction::new(
            vec![
                utxo(coinbase.get_hash(), 0, 2, &alice.address()),
                utxo("feed", 3, 5, &alice.address()),
            ],
            vec![TxOutput::new(7, &alice.address())],
            false,
        )
        .unwrap();

        assert!(set.apply_transaction(&spend).is_err());
        assert_eq!(set, before);
    }

    #[test]
    fn test_ordering_is_independent_of_insertion() {
        let a = UtxoSet::from_utxos(vec![utxo("b", 0, 1, "x"), utxo("a", 1, 1, "y")]);
        let b = UtxoSet::from_utxos(vec![utxo("a", 1, 1, "y"), utxo("b", 0, 1, "x")]);
        assert_eq!(a, b);
        assert_eq!(a.to_vec(), b.to_vec());
    }
}
