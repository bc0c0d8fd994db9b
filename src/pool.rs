use std::collections::{HashMap, VecDeque};

use crate::txn::{Hash, Transaction};

/// Signed transactions waiting for a block, kept in admission order.
#[derive(Debug, Default)]
pub struct Pool {
    txns: HashMap<Hash, Transaction>,
    order: VecDeque<Hash>,
}

impl Pool {
    /// False if the transaction was already pooled.
    pub fn insert(&mut self, hash: Hash, txn: Transaction) -> bool {
        if self.txns.contains_key(&hash) {
            return false;
        }
        self.txns.insert(hash, txn);
        self.order.push_back(hash);
        true
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.txns.contains_key(hash)
    }

    pub fn remove(&mut self, hash: &Hash) -> Option<Transaction> {
        let txn = self.txns.remove(hash)?;
        self.order.retain(|h| h != hash);
        Some(txn)
    }

    /// Up to `max` transactions, oldest first. They stay pooled.
    pub fn peek(&self, max: usize) -> Vec<(Hash, Transaction)> {
        self.order
            .iter()
            .take(max)
            .filter_map(|h| self.txns.get(h).map(|t| (*h, t.clone())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.txns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txns.is_empty()
    }
}
