use std::collections::{HashSet, VecDeque};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::account::Address;
use crate::msg::Message;
use crate::txn::Hash;

/// One connected peer: where to send, and how to stop its read loop.
/// Dropping the link also stops the loop.
#[derive(Debug)]
pub struct PeerLink {
    pub id: u64,
    pub address: Address,
    /// Which side opened the connection.
    pub initiator: Address,
    pub out: mpsc::Sender<Message>,
    cancel: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl PeerLink {
    pub fn new(
        id: u64,
        address: Address,
        initiator: Address,
        out: mpsc::Sender<Message>,
    ) -> (Self, watch::Receiver<bool>) {
        let (cancel, cancelled) = watch::channel(false);
        (Self { id, address, initiator, out, cancel, handle: None }, cancelled)
    }

    /// When both sides dial each other at once, each ends up holding halves
    /// of two connections. Both keep the one opened by the lower address.
    pub fn outranks(&self, initiator: &Address) -> bool {
        self.initiator < *initiator
    }

    pub fn attach(&mut self, handle: JoinHandle<()>) {
        self.handle = Some(handle);
    }

    pub fn take_handle(&mut self) -> Option<JoinHandle<()>> {
        self.handle.take()
    }

    /// Stops the read loop. Safe to call more than once.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// Bounded set of recently seen message ids. Evicts oldest first.
#[derive(Debug)]
pub struct SeenCache {
    order: VecDeque<Hash>,
    set: HashSet<Hash>,
    capacity: usize,
}

impl SeenCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity.min(1024)),
            set: HashSet::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// True if the id is new.
    pub fn insert(&mut self, id: Hash) -> bool {
        if self.set.contains(&id) {
            return false;
        }
        if self.capacity == 0 {
            return true;
        }
        while self.order.len() >= self.capacity {
            match self.order.pop_front() {
                Some(old) => {
                    self.set.remove(&old);
                }
                None => break,
            }
        }
        self.order.push_back(id);
        self.set.insert(id);
        true
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.set.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Keypair;

    fn id(i: u8) -> Hash {
        [i; 32]
    }

    #[test]
    fn seen() {
        let mut cache = SeenCache::new(3);
        assert!(cache.insert(id(1)));
        assert!(!cache.insert(id(1)));
        assert!(cache.insert(id(2)));
        assert!(cache.insert(id(3)));
        assert_eq!(cache.len(), 3);
        // Evicts 1.
        assert!(cache.insert(id(4)));
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&id(1)));
        assert!(cache.contains(&id(2)));
        assert!(cache.insert(id(1)));
    }

    #[test]
    fn zero_capacity() {
        let mut cache = SeenCache::new(0);
        assert!(cache.insert(id(1)));
        assert!(cache.insert(id(1)));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let (tx, _rx) = mpsc::channel(1);
        let addy = Keypair::gen().address();
        let (link, mut cancelled) = PeerLink::new(7, addy.clone(), addy, tx);
        assert!(!link.is_cancelled());
        link.cancel();
        link.cancel();
        assert!(link.is_cancelled());
        assert!(cancelled.changed().await.is_ok());
        assert!(*cancelled.borrow());
        drop(link);
        assert!(cancelled.changed().await.is_err());
    }

    #[test]
    fn lower_initiator_wins() {
        let (tx, _rx) = mpsc::channel(1);
        let mut addys = [Keypair::gen().address(), Keypair::gen().address()];
        addys.sort();
        let [low, high] = addys;
        let (link, _) = PeerLink::new(0, high.clone(), low.clone(), tx.clone());
        assert!(link.outranks(&high));
        assert!(!link.outranks(&low));
        let (link, _) = PeerLink::new(1, low.clone(), high.clone(), tx);
        assert!(!link.outranks(&low));
        assert!(!link.outranks(&high));
    }
}
