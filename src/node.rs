use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time;
use tracing::{debug, info, trace, warn};

use crate::account::{address_of, Address, Keypair, PublicKey};
use crate::block::{Block, Genesis};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::msg::{Message, NodeInfo, Payload};
use crate::peer::{PeerLink, SeenCache};
use crate::pool::Pool;
use crate::state::Ledger;
use crate::txn::{self, Transaction};

/// What a node needs from another node to link up with it.
pub trait RemoteNode {
    fn node_key(&self) -> PublicKey;
    fn node_address(&self) -> Address;
    /// Accepts a link from `address`. `inbound` carries what the caller will
    /// send us; the returned receiver carries what we send back.
    fn connection(&self, address: Address, inbound: mpsc::Receiver<Message>) -> mpsc::Receiver<Message>;
}

/// Cheap to clone handle, every clone is the same node.
#[derive(Debug, Clone)]
pub struct Node {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    kp: Keypair,
    address: Address,
    genesis: Genesis,
    config: Config,
    // Lock order: ledger before txpool.
    ledger: Mutex<Ledger>,
    txpool: Mutex<Pool>,
    // Never held across an await.
    peers: parking_lot::Mutex<HashMap<Address, PeerLink>>,
    peer_infos: parking_lot::Mutex<HashMap<Address, NodeInfo>>,
    seen: parking_lot::Mutex<SeenCache>,
    next_link: AtomicU64,
}

impl Node {
    pub fn new(kp: Keypair, genesis: Genesis) -> Self {
        Self::with_config(kp, genesis, Config::default())
    }

    pub fn with_config(kp: Keypair, genesis: Genesis, mut config: Config) -> Self {
        config.msg_bus_len = config.msg_bus_len.max(1);
        let address = kp.address();
        let ledger = Ledger::new(&genesis);
        Self {
            inner: Arc::new(Inner {
                kp,
                address,
                genesis,
                seen: parking_lot::Mutex::new(SeenCache::new(config.seen_cache_capacity)),
                config,
                ledger: Mutex::new(ledger),
                txpool: Mutex::new(Pool::default()),
                peers: parking_lot::Mutex::new(HashMap::default()),
                peer_infos: parking_lot::Mutex::new(HashMap::default()),
                next_link: AtomicU64::new(0),
            }),
        }
    }

    pub fn address(&self) -> &Address {
        &self.inner.address
    }

    pub fn genesis(&self) -> &Genesis {
        &self.inner.genesis
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    // ------------------------------------------------------------------ peers

    /// Other side of `add_peer`: wires `inbound` into a new link and hands
    /// back the receiving end of our outbound channel.
    pub fn accept(&self, address: Address, inbound: mpsc::Receiver<Message>) -> mpsc::Receiver<Message> {
        let (out, rx) = mpsc::channel(self.inner.config.msg_bus_len);
        self.establish(address.clone(), address, out, inbound);
        rx
    }

    pub fn add_peer(&self, peer: &dyn RemoteNode) -> Result<()> {
        let remote = address_of(&peer.node_key());
        if remote == self.inner.address {
            return Err(Error::SelfConnection);
        }
        if self.inner.peers.lock().contains_key(&remote) {
            return Ok(());
        }
        let (out, rx) = mpsc::channel(self.inner.config.msg_bus_len);
        let inbound = peer.connection(self.inner.address.clone(), rx);
        self.establish(remote, self.inner.address.clone(), out, inbound);
        Ok(())
    }

    /// Cancels the link and waits for its loop to finish. The remote sees
    /// its inbound channel close and drops its side.
    pub async fn remove_peer(&self, peer: &dyn RemoteNode) -> Result<()> {
        let remote = address_of(&peer.node_key());
        let mut link = self
            .inner
            .peers
            .lock()
            .remove(&remote)
            .ok_or_else(|| Error::UnknownPeer(remote.clone()))?;
        link.cancel();
        let handle = link.take_handle();
        drop(link);
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!(node = %self.inner.address, peer = %remote, "removed peer");
        Ok(())
    }

    /// Cancels every link.
    pub fn shutdown(&self) {
        let links = self.inner.peers.lock().drain().collect::<Vec<_>>();
        for (_, link) in links {
            link.cancel();
        }
    }

    pub fn peers(&self) -> Vec<Address> {
        let mut peers = self.inner.peers.lock().keys().cloned().collect::<Vec<_>>();
        peers.sort();
        peers
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers.lock().len()
    }

    /// Latest node info heard from each address, directly or relayed.
    pub fn peer_infos(&self) -> HashMap<Address, NodeInfo> {
        self.inner.peer_infos.lock().clone()
    }

    // Check, spawn and insert happen under one lock so crossing connects
    // settle on the same link at both ends. A rejected link is dropped here,
    // which closes the remote's half.
    fn establish(
        &self,
        remote: Address,
        initiator: Address,
        out: mpsc::Sender<Message>,
        inbound: mpsc::Receiver<Message>,
    ) {
        let mut peers = self.inner.peers.lock();
        if peers.get(&remote).map_or(false, |old| old.outranks(&initiator)) {
            debug!(node = %self.inner.address, peer = %remote, %initiator, "keeping existing link");
            return;
        }
        let id = self.inner.next_link.fetch_add(1, Ordering::Relaxed);
        let (mut link, cancelled) = PeerLink::new(id, remote.clone(), initiator, out.clone());
        link.attach(tokio::spawn(self.clone().peer_loop(id, remote.clone(), out, inbound, cancelled)));
        if let Some(old) = peers.insert(remote.clone(), link) {
            debug!(node = %self.inner.address, peer = %remote, "replacing link");
            old.cancel();
        }
        drop(peers);
        info!(node = %self.inner.address, peer = %remote, "connected");
    }

    fn drop_link(&self, remote: &Address, id: u64) {
        let mut peers = self.inner.peers.lock();
        if peers.get(remote).map(|l| l.id) == Some(id) {
            peers.remove(remote);
        }
    }

    async fn peer_loop(
        self,
        id: u64,
        remote: Address,
        out: mpsc::Sender<Message>,
        mut inbound: mpsc::Receiver<Message>,
        mut cancelled: watch::Receiver<bool>,
    ) {
        let hello = Message::new(self.inner.address.clone(), Payload::NodeInfo(self.node_info().await));
        self.mark_seen(&hello);
        tokio::select! {
            _ = cancelled.changed() => {
                debug!(node = %self.inner.address, peer = %remote, "cancelled before handshake");
                return;
            }
            sent = time::timeout(self.inner.config.handshake_timeout(), out.send(hello)) => match sent {
                Ok(Ok(())) => trace!(node = %self.inner.address, peer = %remote, "handshake sent"),
                Ok(Err(_)) => warn!(node = %self.inner.address, peer = %remote, "peer hung up before handshake"),
                Err(_) => warn!(node = %self.inner.address, peer = %remote, "handshake timed out"),
            }
        }
        // Only the link keeps the outbound side open from here on.
        drop(out);

        loop {
            tokio::select! {
                _ = cancelled.changed() => {
                    debug!(node = %self.inner.address, peer = %remote, "link cancelled");
                    break;
                }
                msg = inbound.recv() => match msg {
                    Some(msg) => self.handle_inbound(&remote, msg).await,
                    None => {
                        info!(node = %self.inner.address, peer = %remote, "peer closed link");
                        self.drop_link(&remote, id);
                        break;
                    }
                }
            }
        }
    }

    // ----------------------------------------------------------------- gossip

    async fn handle_inbound(&self, from: &Address, msg: Message) {
        let msg_id = match msg.id() {
            Ok(msg_id) => msg_id,
            Err(e) => {
                warn!(node = %self.inner.address, peer = %from, error = %e, "can't hash message");
                return;
            }
        };
        if !self.inner.seen.lock().insert(msg_id) {
            trace!(node = %self.inner.address, peer = %from, "duplicate message");
            return;
        }
        match self.process_message(from, &msg).await {
            Ok(()) if msg.payload == Payload::Unknown => {}
            Ok(()) => self.relay(&msg, Some(from)),
            Err(e) => warn!(node = %self.inner.address, peer = %from, error = %e, "process peer message"),
        }
    }

    /// Applies what a peer sent to local state.
    pub async fn process_message(&self, from: &Address, msg: &Message) -> Result<()> {
        match &msg.payload {
            Payload::NodeInfo(info) => {
                let last_block = self.inner.ledger.lock().await.last_block_num();
                info!(
                    node = %self.inner.address,
                    peer = %info.address,
                    via = %from,
                    their_block = info.last_block,
                    need_sync = last_block < info.last_block,
                    "node info"
                );
                self.inner.peer_infos.lock().insert(info.address.clone(), info.clone());
                Ok(())
            }
            Payload::Transaction(txn) => self.admit(txn.clone()).await.map(|_| ()),
            Payload::Block(block) => self.import_block(block.clone()).await,
            Payload::Unknown => {
                debug!(node = %self.inner.address, peer = %from, "ignoring unknown payload");
                Ok(())
            }
        }
    }

    /// Sends to every peer. Own messages are marked seen so echoes die out.
    pub fn broadcast(&self, msg: &Message) {
        self.mark_seen(msg);
        self.relay(msg, None);
    }

    fn mark_seen(&self, msg: &Message) {
        if let Ok(msg_id) = msg.id() {
            self.inner.seen.lock().insert(msg_id);
        }
    }

    // A full queue drops the message for that peer instead of stalling this loop.
    fn relay(&self, msg: &Message, except: Option<&Address>) {
        let targets = self
            .inner
            .peers
            .lock()
            .values()
            .filter(|l| l.address != self.inner.address && Some(&l.address) != except)
            .map(|l| (l.address.clone(), l.out.clone()))
            .collect::<Vec<_>>();
        for (peer, out) in targets {
            match out.try_send(msg.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(node = %self.inner.address, peer = %peer, "outbound queue full, dropping message")
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(node = %self.inner.address, peer = %peer, "peer gone, dropping message")
                }
            }
        }
    }

    // ----------------------------------------------------------------- ledger

    pub fn node_key(&self) -> PublicKey {
        self.inner.kp.public()
    }

    pub async fn node_info(&self) -> NodeInfo {
        NodeInfo {
            address: self.inner.address.clone(),
            last_block: self.inner.ledger.lock().await.last_block_num(),
        }
    }

    pub async fn get_balance(&self, addy: &Address) -> u64 {
        self.inner.ledger.lock().await.balance(addy)
    }

    pub async fn get_block_by_number(&self, number: u64) -> Result<Block> {
        self.inner.ledger.lock().await.block(number).cloned()
    }

    pub async fn total_supply(&self) -> u128 {
        self.inner.ledger.lock().await.total_supply()
    }

    pub fn sign_transaction(&self, txn: &Transaction) -> Result<Transaction> {
        txn::sign(txn, &self.inner.kp)
    }

    /// Verifies, pools and gossips a client transaction.
    pub async fn add_transaction(&self, txn: Transaction) -> Result<()> {
        if self.admit(txn.clone()).await? {
            self.broadcast(&Message::new(self.inner.address.clone(), Payload::Transaction(txn)));
        }
        Ok(())
    }

    pub async fn pool_len(&self) -> usize {
        self.inner.txpool.lock().await.len()
    }

    /// True if newly pooled.
    async fn admit(&self, txn: Transaction) -> Result<bool> {
        authorize(&txn)?;
        let cost = txn.cost().ok_or_else(|| Error::BalanceOverflow(txn.from.clone()))?;
        let hash = txn.hash()?;
        let ledger = self.inner.ledger.lock().await;
        if ledger.is_applied(&hash) {
            return Err(Error::DuplicateTransaction(hex::encode(hash)));
        }
        let available = ledger.balance(&txn.from);
        if available < cost {
            return Err(Error::InsufficientBalance { address: txn.from.clone(), required: cost, available });
        }
        let fresh = self.inner.txpool.lock().await.insert(hash, txn);
        if fresh {
            debug!(node = %self.inner.address, txn = %hex::encode(hash), "pooled transaction");
        }
        Ok(fresh)
    }

    /// Applies a block built elsewhere and clears its transactions from the pool.
    /// One badly signed transaction rejects the whole block.
    pub async fn import_block(&self, block: Block) -> Result<()> {
        for txn in &block.txns {
            authorize(txn)?;
        }
        let hashes = block.txns.iter().map(|t| t.hash()).collect::<Result<Vec<_>>>()?;
        let mut ledger = self.inner.ledger.lock().await;
        ledger.apply_block(block)?;
        let mut txpool = self.inner.txpool.lock().await;
        for hash in &hashes {
            txpool.remove(hash);
        }
        Ok(())
    }

    /// Packs pooled transactions into the next block, applies and gossips it.
    /// Transactions that no longer apply are dropped from the pool.
    pub async fn seal_block(&self) -> Result<Block> {
        let block = {
            let mut ledger = self.inner.ledger.lock().await;
            let mut txpool = self.inner.txpool.lock().await;
            let mut txns = Vec::default();
            let mut included = Vec::default();
            {
                let mut delta = ledger.stage()?;
                for (hash, txn) in txpool.peek(self.inner.config.max_block_txns) {
                    if ledger.is_applied(&hash) {
                        txpool.remove(&hash);
                        continue;
                    }
                    match delta.apply(&txn) {
                        Ok(()) => {
                            txns.push(txn);
                            included.push(hash);
                        }
                        Err(e) => {
                            warn!(node = %self.inner.address, txn = %hex::encode(hash), error = %e, "dropping stale transaction");
                            txpool.remove(&hash);
                        }
                    }
                }
            }
            let block = Block { number: ledger.last_block_num() + 1, txns };
            ledger.apply_block(block.clone())?;
            for hash in &included {
                txpool.remove(hash);
            }
            block
        };
        self.broadcast(&Message::new(self.inner.address.clone(), Payload::Block(block.clone())));
        Ok(block)
    }
}

/// Valid signature by the key that owns `from`.
fn authorize(txn: &Transaction) -> Result<()> {
    txn::check(txn)?;
    let signer = address_of(&txn.pub_key);
    if signer != txn.from {
        return Err(Error::SenderMismatch { from: txn.from.clone(), signer });
    }
    Ok(())
}

impl RemoteNode for Node {
    fn node_key(&self) -> PublicKey {
        self.inner.kp.public()
    }

    fn node_address(&self) -> Address {
        self.inner.address.clone()
    }

    fn connection(&self, address: Address, inbound: mpsc::Receiver<Message>) -> mpsc::Receiver<Message> {
        self.accept(address, inbound)
    }
}
