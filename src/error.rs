use thiserror::Error;

use crate::account::Address;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // Identity
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    // Topology
    #[error("self connection")]
    SelfConnection,

    #[error("not connected to peer {0}")]
    UnknownPeer(Address),

    // State transition
    #[error("validator set is empty")]
    UnknownValidatorSet,

    #[error("validator {index} has no address: {source}")]
    AddressDerivation {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("insufficient balance for {address}: required {required}, available {available}")]
    InsufficientBalance {
        address: Address,
        required: u64,
        available: u64,
    },

    #[error("balance overflow for {0}")]
    BalanceOverflow(Address),

    #[error("unexpected block number: expected {expected}, got {got}")]
    UnexpectedBlockNumber { expected: u64, got: u64 },

    #[error("transaction {0} already applied")]
    DuplicateTransaction(String),

    #[error("block {0} not found")]
    BlockNotFound(u64),

    // Transactions
    #[error("transaction is not signed")]
    MissingSignature,

    #[error("invalid transaction signature")]
    InvalidSignature,

    #[error("sender {from} does not match signer {signer}")]
    SenderMismatch { from: Address, signer: Address },

    // Plumbing
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http server error: {0}")]
    Http(String),
}
