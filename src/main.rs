use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use names::Generator;
use tokio::time;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use peerledger::account::Keypair;
use peerledger::block::Genesis;
use peerledger::config::Config;
use peerledger::txn::Transaction;
use peerledger::{app, Node};

/// Runs a handful of nodes in one process, moves some money and prints the
/// resulting balances as every node sees them.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    #[arg(long, default_value_t = 5)]
    nodes: usize,
    #[arg(long, default_value_t = 3)]
    validators: usize,
    /// Starting balance for every node when no genesis file is given.
    #[arg(long, default_value_t = 100_000)]
    balance: u64,
    #[arg(long, default_value_t = 100)]
    amount: u64,
    #[arg(long, default_value_t = 10)]
    fee: u64,
    /// JSON node config.
    #[arg(long)]
    config: Option<PathBuf>,
    /// JSON genesis; replaces the generated allocation and validator set.
    #[arg(long)]
    genesis: Option<PathBuf>,
    /// Serve the first node's client API here once the run is done.
    #[arg(long)]
    serve: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> peerledger::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let count = args.nodes.max(2);
    let config = match &args.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };

    let keypairs = (0..count).map(|_| Keypair::gen()).collect::<Vec<_>>();
    let genesis = match &args.genesis {
        Some(path) => Genesis::from_json_file(path)?,
        None => {
            let mut genesis = Genesis::default();
            for kp in &keypairs {
                genesis.alloc.insert(kp.address(), args.balance);
            }
            for kp in keypairs.iter().take(args.validators.max(1)) {
                genesis.validators.push(kp.public().into());
            }
            genesis
        }
    };

    let mut generator = Generator::default();
    let mut name = HashMap::new();
    let nodes = keypairs
        .iter()
        .map(|kp| {
            name.insert(kp.address(), generator.next().unwrap_or_else(|| kp.address().to_string()));
            Node::with_config(kp.clone(), genesis.clone(), config.clone())
        })
        .collect::<Vec<_>>();

    for i in 0..nodes.len() {
        for j in i + 1..nodes.len() {
            nodes[i].add_peer(&nodes[j])?;
        }
    }

    let (from, to) = (count - 2, count - 1);
    let unsigned = Transaction::new(&keypairs[from], nodes[to].address().clone(), args.amount, args.fee);
    let txn = nodes[from].sign_transaction(&unsigned)?;
    info!(from = %name[nodes[from].address()], to = %name[nodes[to].address()], "submitting transfer");
    nodes[0].add_transaction(txn).await?;
    time::sleep(Duration::from_millis(200)).await;

    let block = nodes[0].seal_block().await?;
    info!(block = block.number, txns = block.txns.len(), "sealed");
    time::sleep(Duration::from_millis(200)).await;

    for node in &nodes {
        let last_block = node.node_info().await.last_block;
        if last_block != block.number {
            warn!(node = %name[node.address()], last_block, "node is behind");
        }
        for other in &nodes {
            println!(
                "{:>24} sees {:>24} with {}",
                name[node.address()],
                name[other.address()],
                node.get_balance(other.address()).await
            );
        }
    }

    match args.serve {
        Some(addr) => app::serve(nodes[0].clone(), addr).await,
        None => {
            for node in &nodes {
                node.shutdown();
            }
            Ok(())
        }
    }
}
