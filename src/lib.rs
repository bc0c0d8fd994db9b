pub mod account;
pub mod app;
pub mod block;
pub mod config;
pub mod error;
pub mod msg;
pub mod node;
pub mod peer;
pub mod pool;
pub mod state;
pub mod txn;
pub mod validator;

pub use error::{Error, Result};
pub use node::{Node, RemoteNode};
