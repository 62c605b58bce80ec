use crate::core::Transaction;

/// Pending transactions in arrival order, coinbase (when present) first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryPool {
    inner: Vec<Transaction>,
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool::default()
    }

    pub fn from_transactions(txs: Vec<Transaction>) -> MemoryPool {
        MemoryPool { inner: txs }
    }

    pub fn push(&mut self, tx: Transaction) {
        self.inner.push(tx);
    }

    pub fn push_front(&mut self, tx: Transaction) {
        self.inner.insert(0, tx);
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.inner.iter().any(|tx| tx.get_hash() == hash)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.inner.iter()
    }

    /// Empties the pool, handing back everything in order.
    pub fn take_all(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.inner)
    }

    pub fn to_vec(&self) -> Vec<Transaction> {
        self.inner.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::generate_keypair;

    #[test]
    fn test_push_front_keeps_coinbase_first() {
        let keys = generate_keypair().unwrap();
        let first = Transaction::new_coinbase(&keys.address(), 2).unwrap();
        let second = Transaction::new_coinbase(&keys.address(), 2).unwrap();

        let mut pool = MemoryPool::new();
        pool.push(first.clone());
        pool.push_front(second.clone());

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.to_vec()[0].get_hash(), second.get_hash());
        assert!(pool.contains(first.get_hash()));
    }

    #[test]
    fn test_take_all_drains_in_order() {
        let keys = generate_keypair().unwrap();
        let txs: Vec<Transaction> = (0..3)
            .map(|_| Transaction::new_coinbase(&keys.address(), 2).unwrap())
            .collect();
        let mut pool = MemoryPool::from_transactions(txs.clone());

        let drained = pool.take_all();
        assert!(pool.is_empty());
        assert_eq!(drained, txs);
    }
}
