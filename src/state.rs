use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::account::Address;
use crate::block::{Block, Genesis, ValidatorKey};
use crate::error::{Error, Result};
use crate::txn::{Hash, Transaction};
use crate::validator;

/// Balances plus applied block history. `apply_block` is the only writer of
/// the balance table.
#[derive(Debug, Clone)]
pub struct Ledger {
    balances: HashMap<Address, u64>,
    validators: Vec<ValidatorKey>,
    blocks: Vec<Block>,
    last_block_num: u64,
    // Digests of every transaction in `blocks`.
    applied: HashSet<Hash>,
}

impl Ledger {
    pub fn new(genesis: &Genesis) -> Self {
        Self {
            balances: genesis.alloc.iter().map(|(a, b)| (a.clone(), *b)).collect(),
            validators: genesis.validators.clone(),
            blocks: Vec::default(),
            last_block_num: 0,
            applied: HashSet::default(),
        }
    }

    pub fn balance(&self, addy: &Address) -> u64 {
        self.balances.get(addy).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> u128 {
        self.balances.values().map(|b| *b as u128).sum()
    }

    pub fn last_block_num(&self) -> u64 {
        self.last_block_num
    }

    pub fn validators(&self) -> &[ValidatorKey] {
        &self.validators
    }

    pub fn block(&self, number: u64) -> Result<&Block> {
        number
            .checked_sub(1)
            .and_then(|i| self.blocks.get(i as usize))
            .ok_or(Error::BlockNotFound(number))
    }

    pub fn is_applied(&self, hash: &Hash) -> bool {
        self.applied.contains(hash)
    }

    /// Scratch view for assembling the next block.
    pub fn stage(&self) -> Result<Delta<'_>> {
        Delta::new(self, self.last_block_num + 1)
    }

    /// All or nothing: on error the table is exactly as before.
    pub fn apply_block(&mut self, block: Block) -> Result<()> {
        let expected = self.last_block_num + 1;
        if block.number != expected {
            return Err(Error::UnexpectedBlockNumber { expected, got: block.number });
        }
        // A transaction spends once, ever.
        let hashes = block.txns.iter().map(Transaction::hash).collect::<Result<Vec<_>>>()?;
        let mut fresh = HashSet::with_capacity(hashes.len());
        for hash in &hashes {
            if self.applied.contains(hash) || !fresh.insert(*hash) {
                return Err(Error::DuplicateTransaction(hex::encode(hash)));
            }
        }
        let touched = {
            let mut delta = Delta::new(self, block.number)?;
            for txn in &block.txns {
                delta.apply(txn)?;
            }
            delta.touched
        };
        debug!(block = block.number, accounts = touched.len(), "committing block");
        self.balances.extend(touched);
        self.last_block_num = block.number;
        self.applied.extend(hashes);
        info!(block = block.number, txns = block.txns.len(), "applied block");
        self.blocks.push(block);
        Ok(())
    }
}

/// Pending balance changes on top of a ledger for one block.
#[derive(Debug)]
pub struct Delta<'a> {
    ledger: &'a Ledger,
    validator: Address,
    touched: HashMap<Address, u64>,
}

impl<'a> Delta<'a> {
    fn new(ledger: &'a Ledger, block_number: u64) -> Result<Self> {
        Ok(Self {
            ledger,
            validator: validator::leader(&ledger.validators, block_number)?,
            touched: HashMap::default(),
        })
    }

    pub fn validator(&self) -> &Address {
        &self.validator
    }

    pub fn balance(&self, addy: &Address) -> u64 {
        self.touched
            .get(addy)
            .copied()
            .unwrap_or_else(|| self.ledger.balance(addy))
    }

    /// Applies one transaction, or nothing if it fails.
    pub fn apply(&mut self, txn: &Transaction) -> Result<()> {
        let saved = [&txn.from, &txn.to, &self.validator]
            .into_iter()
            .map(|a| (a.clone(), self.touched.get(a).copied()))
            .collect::<Vec<_>>();
        let res = self.transfer(txn);
        if res.is_err() {
            for (addy, old) in saved {
                match old {
                    Some(bal) => self.touched.insert(addy, bal),
                    None => self.touched.remove(&addy),
                };
            }
        }
        res
    }

    fn transfer(&mut self, txn: &Transaction) -> Result<()> {
        let cost = txn.cost().ok_or_else(|| Error::BalanceOverflow(txn.from.clone()))?;
        self.debit(&txn.from, cost)?;
        self.credit(&txn.to, txn.amount)?;
        let validator = self.validator.clone();
        self.credit(&validator, txn.fee)
    }

    fn debit(&mut self, addy: &Address, amount: u64) -> Result<()> {
        let available = self.balance(addy);
        let bal = available.checked_sub(amount).ok_or_else(|| Error::InsufficientBalance {
            address: addy.clone(),
            required: amount,
            available,
        })?;
        self.touched.insert(addy.clone(), bal);
        Ok(())
    }

    fn credit(&mut self, addy: &Address, amount: u64) -> Result<()> {
        let bal = self
            .balance(addy)
            .checked_add(amount)
            .ok_or_else(|| Error::BalanceOverflow(addy.clone()))?;
        self.touched.insert(addy.clone(), bal);
        Ok(())
    }
}
