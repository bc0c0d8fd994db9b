use serde::{Serialize, Deserialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

pub const MSG_BUS_LEN: usize = 100;
pub const HANDSHAKE_TIMEOUT: u64 = 5_000; // ms
pub const SEEN_CACHE_CAPACITY: usize = 4_096;
pub const MAX_BLOCK_TXNS: usize = 1_024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Capacity of each outbound peer channel.
    pub msg_bus_len: usize,
    pub handshake_timeout_ms: u64,
    pub seen_cache_capacity: usize,
    pub max_block_txns: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            msg_bus_len: MSG_BUS_LEN,
            handshake_timeout_ms: HANDSHAKE_TIMEOUT,
            seen_cache_capacity: SEEN_CACHE_CAPACITY,
            max_block_txns: MAX_BLOCK_TXNS,
        }
    }
}

impl Config {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.msg_bus_len == 0 {
            return Err(Error::InvalidConfig("msg_bus_len must be at least 1".to_owned()));
        }
        if self.max_block_txns == 0 {
            return Err(Error::InvalidConfig("max_block_txns must be at least 1".to_owned()));
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}
