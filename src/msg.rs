use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

use crate::account::Address;
use crate::block::Block;
use crate::error::Result;
use crate::txn::{Hash, Transaction};

/// What a node announces about itself when a link comes up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeInfo {
    pub address: Address,
    pub last_block: u64,
}

/// Gossip payloads. Tags this build does not know decode as `Unknown`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    NodeInfo(NodeInfo),
    Transaction(Transaction),
    Block(Block),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub from: Address,
    pub payload: Payload,
}

impl Message {
    pub fn new(from: Address, payload: Payload) -> Self {
        Self { from, payload }
    }

    /// Content id used for de-duplication.
    pub fn id(&self) -> Result<Hash> {
        Ok(Sha256::digest(self.encode()?.as_bytes()).into())
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
