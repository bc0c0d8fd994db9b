use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};
use std::collections::BTreeMap;
use std::path::Path;

use crate::account::{self, Address, PublicKey};
use crate::error::Result;
use crate::txn::{Hash, Transaction};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub txns: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Result<Hash> {
        Ok(Sha256::digest(serde_json::to_vec(self)?).into())
    }
}

/// Raw validator key as it appears in genesis. Not checked until a block
/// needs its address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ValidatorKey(#[serde(with = "hex::serde")] pub Vec<u8>);

impl ValidatorKey {
    pub fn address(&self) -> Result<Address> {
        account::address_of_bytes(&self.0)
    }
}

impl From<PublicKey> for ValidatorKey {
    fn from(pk: PublicKey) -> Self {
        ValidatorKey(pk.to_bytes().to_vec())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Genesis {
    pub alloc: BTreeMap<Address, u64>,
    pub validators: Vec<ValidatorKey>,
}

impl Genesis {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
