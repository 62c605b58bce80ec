//! The replica
//!
//! A [`Node`] owns one ledger and composes it with the peer registry, the
//! gossip bus and the outbound client. Every public method here is one
//! operation of the node's surface; the TCP server only translates requests
//! into these calls.
//!
//! Three background threads run per node: the gossip drain worker, the gossip
//! sender (owned by the bus) and the reconciler that reacts to appended
//! blocks. The workers only hold a [`WeakNode`], so dropping the last `Node`
//! closes their channels and they exit even without [`Node::shutdown`]. The
//! accept loop is started separately by whoever binds the server and keeps
//! its node alive until shutdown.

pub mod reconciler;

pub use reconciler::{spawn_reconciler, NodeEvent};

use crate::config::Config;
use crate::core::{
    chain_digest, consensus, Block, Ledger, LedgerSnapshot, ProofOfWork, Transaction, TxInput,
    TxOutput, Utxo,
};
use crate::error::{LedgerError, Result};
use crate::network::{
    normalize_address, GossipBus, GossipMessage, MessageType, PeerClient, PeerRegistry, TrustMode,
};
use crate::wallet::KeyPair;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

// How long the drain worker blocks before looking at the shutdown flag
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const WAKE_TIMEOUT: Duration = Duration::from_millis(200);

struct NodeInner {
    id: Uuid,
    config: Config,
    keys: KeyPair,
    ledger: Mutex<Ledger>,
    peers: PeerRegistry,
    gossip: GossipBus,
    client: PeerClient,
    events: Mutex<Sender<NodeEvent>>,
    shutdown: AtomicBool,
}

/// Cheap to clone; all clones drive the same replica.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

/// A handle that does not keep the node alive.
#[derive(Clone)]
pub struct WeakNode {
    inner: Weak<NodeInner>,
}

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        self.inner.upgrade().map(|inner| Node { inner })
    }
}

impl Node {
    pub fn new(config: Config) -> Result<Node> {
        let keys = KeyPair::generate()?;
        Self::with_keys(config, keys)
    }

    pub fn with_keys(config: Config, keys: KeyPair) -> Result<Node> {
        config.validate()?;
        let client = PeerClient::new(config.peer_timeout());
        let (gossip, inbound) = GossipBus::new(&config.node_address, client.clone());
        let (events_tx, events_rx) = mpsc::channel();

        let node = Node {
            inner: Arc::new(NodeInner {
                id: Uuid::new_v4(),
                ledger: Mutex::new(Ledger::new(config.reward)),
                peers: PeerRegistry::new(&config.node_address),
                gossip,
                client,
                events: Mutex::new(events_tx),
                shutdown: AtomicBool::new(false),
                keys,
                config,
            }),
        };
        info!(
            "Node {} at {} with address {}",
            node.inner.id,
            node.inner.config.node_address,
            node.address()
        );

        node.spawn_drain_worker(inbound);
        spawn_reconciler(node.downgrade(), events_rx);
        Ok(node)
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn spawn_drain_worker(&self, inbound: Receiver<GossipMessage>) {
        let weak = self.downgrade();
        thread::spawn(move || loop {
            let message = match inbound.recv_timeout(DRAIN_POLL_INTERVAL) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            let node = match weak.upgrade() {
                Some(node) if !node.is_shut_down() => node,
                _ => break,
            };
            if let Some(message) = message {
                node.process_message(message);
            }
        });
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.inner
            .ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: NodeEvent) {
        let sent = self
            .inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(event);
        if sent.is_err() {
            debug!("Reconciler is gone; dropped {event:?}");
        }
    }

    /// `host:port` peers reach us at.
    pub fn node_address(&self) -> &str {
        self.inner.config.node_address.as_str()
    }

    /// The address our mining rewards are paid to.
    pub fn address(&self) -> String {
        self.inner.keys.address()
    }

    pub fn settle_delay(&self) -> Duration {
        self.inner.config.settle_delay()
    }

    /// Genesis when we know nobody, otherwise adopt what the peers agree on.
    pub fn start(&self) -> Result<()> {
        if self.inner.peers.is_empty() {
            if self.ledger().is_empty() {
                self.genesis()?;
            }
        } else {
            self.resolve_conflicts();
        }
        Ok(())
    }

    /// Registers every seed, subscribes to its gossip and asks it to
    /// register us back. Unreachable seeds are logged and skipped.
    pub fn join(&self, seeds: &[String]) {
        for seed in seeds {
            let peer = match normalize_address(seed) {
                Ok(peer) => peer,
                Err(e) => {
                    error!("Error registering seed {seed}: {e}");
                    continue;
                }
            };
            if let Err(e) = self.register_peer(&peer) {
                error!("Error registering seed {peer}: {e}");
                continue;
            }
            if let Err(e) = self.inner.client.register_with(&peer, self.node_address()) {
                error!("Error connecting to seed {peer}: {e}");
            }
        }
    }

    pub fn genesis(&self) -> Result<Block> {
        self.ledger().genesis(&self.inner.keys)
    }

    /// Returns the index of the block the transaction will land in. Reaching
    /// `transactions_per_block` pending transactions mines a block at once.
    pub fn submit_transaction(
        &self,
        ins: Vec<TxInput>,
        outs: Vec<TxOutput>,
        signing_key: &str,
    ) -> Result<u64> {
        let (tx, index, pending) = {
            let mut ledger = self.ledger();
            let (tx, index) = ledger.submit_transaction(ins, outs, signing_key)?;
            (tx, index, ledger.get_pending().len())
        };
        info!("Transaction {} will be added to block {index}", tx.get_hash());

        match serde_json::to_string(&tx) {
            Ok(payload) => {
                if let Err(e) = self.inner.gossip.publish(MessageType::NewTransaction, payload) {
                    warn!("Could not announce {}: {e}", tx.get_hash());
                }
            }
            Err(e) => warn!("Could not encode {}: {e}", tx.get_hash()),
        }

        let threshold = self.inner.config.transactions_per_block;
        if threshold > 0 && pending >= threshold {
            match self.mine() {
                Ok(block) => return Ok(block.get_index()),
                Err(e) => warn!("Automatic mining failed: {e}"),
            }
        }
        Ok(index)
    }

    /// Queues a coinbase paying the reward to this node. Coinbases are
    /// never gossiped.
    pub fn submit_coinbase(&self) -> Result<u64> {
        let (tx, index) = self.ledger().submit_coinbase(&self.inner.keys)?;
        info!("Coinbase {} will be added to block {index}", tx.get_hash());
        Ok(index)
    }

    /// Runs proof-of-work on the current tip without holding the ledger
    /// lock, then forges. If the tip moved meanwhile the search starts over.
    pub fn mine(&self) -> Result<Block> {
        if self.ledger().is_empty() {
            info!("No chain yet; syncing before mining");
            self.resolve_conflicts();
        }

        loop {
            let (last, last_hash) = {
                let ledger = self.ledger();
                ledger.verify_pending_signatures()?;
                let last = ledger.last_block().cloned().ok_or_else(|| {
                    LedgerError::Mining(
                        "Chain is empty: create a genesis block or sync with a peer".to_string(),
                    )
                })?;
                let last_hash = last.hash()?;
                (last, last_hash)
            };

            let difficulty = ProofOfWork::difficulty_for(
                self.inner.peers.len(),
                self.inner.config.base_difficulty,
            );
            let pow =
                ProofOfWork::new_proof_of_work(&last, &last_hash, difficulty, &self.address());
            let proof = pow.run_until(&self.inner.shutdown).ok_or_else(|| {
                LedgerError::Mining("Mining cancelled: node is shutting down".to_string())
            })?;

            let block = {
                let mut ledger = self.ledger();
                if ledger.last_hash()?.as_deref() != Some(last_hash.as_str()) {
                    info!("Chain tip moved while mining; restarting proof-of-work");
                    continue;
                }
                ledger.forge_block(proof, &last_hash, &self.inner.keys)?
            };

            info!("New block {} is mined!", block.get_index());
            self.notify(NodeEvent::BlockAppended {
                index: block.get_index(),
            });
            return Ok(block);
        }
    }

    pub fn chain(&self) -> Vec<Block> {
        self.ledger().get_chain().to_vec()
    }

    pub fn utxos(&self) -> Vec<Utxo> {
        self.ledger().get_utxo_set().to_vec()
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.ledger().get_pending().to_vec()
    }

    /// Chain, UTXO set and pending pool read under one lock.
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.ledger().snapshot()
    }

    /// Registers `address` and subscribes to its gossip. Returns the updated
    /// peer list.
    pub fn register_peer(&self, address: &str) -> Result<Vec<String>> {
        let peer = normalize_address(address)?;
        if self.inner.peers.register(&peer)? {
            self.inner.gossip.subscribe(&peer);
        }
        Ok(self.inner.peers.peers())
    }

    pub fn peers(&self) -> Vec<String> {
        self.inner.peers.peers()
    }

    pub fn trust(&self) -> TrustMode {
        self.inner.peers.trust()
    }

    pub fn flip_trust(&self) -> TrustMode {
        self.inner.peers.flip_trust()
    }

    pub fn set_trust(&self, good: bool) {
        self.inner.peers.set_trust(TrustMode::from_good(good));
    }

    /// `(address, signing key)` of this node, both as text.
    pub fn keys(&self) -> (String, String) {
        (self.address(), self.inner.keys.signing_key_text())
    }

    /// Adopts the chain the trusted peers agree on when it is longer than
    /// ours. Returns whether our ledger was replaced.
    pub fn resolve_conflicts(&self) -> bool {
        let peers = self.inner.peers.peers();
        if peers.is_empty() {
            return false;
        }
        let trust = self.trust();
        let own_chain = self.chain();

        // An empty chain has no history to vote for
        let mut digests: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if !own_chain.is_empty() {
            match chain_digest(&own_chain) {
                Ok(digest) => digests.insert(self.node_address().to_string(), digest),
                Err(e) => {
                    error!("Cannot digest our own chain: {e}");
                    return false;
                }
            };
        }

        let mut snapshots: BTreeMap<String, LedgerSnapshot> = BTreeMap::new();
        for peer in peers.iter().filter(|p| p.as_str() != self.node_address()) {
            match self.inner.client.fetch_trust(peer) {
                Ok(mode) if mode == trust => {}
                Ok(mode) => {
                    debug!("Skipping {peer}: it is {mode}, we are {trust}");
                    continue;
                }
                Err(e) => {
                    warn!("Skipping unreachable peer {peer}: {e}");
                    continue;
                }
            }

            let snapshot = match self.inner.client.fetch_snapshot(peer) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Skipping unreachable peer {peer}: {e}");
                    continue;
                }
            };
            if snapshot.chain.is_empty() || !Ledger::valid_chain(&snapshot.chain) {
                warn!("Skipping {peer}: its chain is empty or invalid");
                continue;
            }
            match chain_digest(&snapshot.chain) {
                Ok(digest) => {
                    digests.insert(peer.clone(), digest);
                    snapshots.insert(peer.clone(), snapshot);
                }
                Err(e) => warn!("Skipping {peer}: {e}"),
            }
        }

        let winner = consensus(&digests);
        // Our own address or no majority at all
        let snapshot = match snapshots.remove(&winner) {
            Some(snapshot) => snapshot,
            None => return false,
        };
        if snapshot.chain.len() <= own_chain.len() {
            return false;
        }

        let length = snapshot.chain.len();
        match self.ledger().replace(snapshot) {
            Ok(true) => {
                info!("Replaced our chain with {winner}'s ({length} blocks)");
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("Rejected chain from {winner}: {e}");
                false
            }
        }
    }

    /// Asks every known peer, trusted or not, to run its own resolution.
    pub fn force_resolve(&self) {
        for peer in self.inner.peers.peers() {
            match self.inner.client.request_resolve(&peer) {
                Ok(replaced) => debug!("{peer} resolved (replaced: {replaced})"),
                Err(e) => warn!("Could not ask {peer} to resolve: {e}"),
            }
        }
    }

    /// A peer subscribed to us and wants us to subscribe back.
    pub fn subscribe_back(&self, address: &str) -> Result<()> {
        let peer = normalize_address(address)?;
        self.inner.gossip.subscribe(&peer);
        Ok(())
    }

    pub fn receive_gossip(&self, text: &str) -> Result<()> {
        self.inner.gossip.push_message(text)
    }

    /// Handles one drained gossip message.
    pub fn process_message(&self, message: GossipMessage) {
        match message.mtype {
            MessageType::NewTransaction => {
                let tx: Transaction = match message.json_data() {
                    Ok(tx) => tx,
                    Err(e) => {
                        warn!("Unreadable transaction from {}: {e}", message.origin);
                        return;
                    }
                };
                let hash = tx.get_hash().to_string();
                match self.ledger().admit_gossiped(tx) {
                    Ok(true) => debug!("Admitted transaction {hash} from {}", message.origin),
                    Ok(false) => debug!("Ignored transaction {hash} from {}", message.origin),
                    Err(e) => debug!("Rejected transaction {hash} from {}: {e}", message.origin),
                }
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Stops the background workers, cancels any running proof-of-work and
    /// wakes the accept loop so it can exit.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Node {} shutting down", self.inner.id);
        self.notify(NodeEvent::Shutdown);

        let wake = self
            .node_address()
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next());
        if let Some(addr) = wake {
            let _ = TcpStream::connect_timeout(&addr, WAKE_TIMEOUT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::test_config;
    use crate::wallet::generate_keypair;

    fn started_node() -> Node {
        let node = Node::new(test_config()).unwrap();
        node.start().unwrap();
        node
    }

    #[test]
    fn test_start_without_peers_creates_genesis() {
        let node = started_node();
        let chain = node.chain();
        assert_eq!(chain.len(), 1);
        assert_eq!(node.utxos()[0].addr, node.address());

        // A second start leaves the chain alone
        node.start().unwrap();
        assert_eq!(node.chain().len(), 1);
        node.shutdown();
    }

    #[test]
    fn test_mine_on_empty_chain_without_peers_fails() {
        let node = Node::new(test_config()).unwrap();
        assert!(matches!(node.mine(), Err(LedgerError::Mining(_))));
        node.shutdown();
    }

    #[test]
    fn test_submit_then_mine() {
        let node = started_node();
        let bob = generate_keypair().unwrap();
        let (address, secret) = node.keys();
        let ins = node.utxos();

        let index = node
            .submit_transaction(ins, vec![TxOutput::new(2, &bob.address())], &secret)
            .unwrap();
        assert_eq!(index, 2);
        assert_eq!(node.pending().len(), 1);

        let block = node.mine().unwrap();
        assert_eq!(block.get_index(), 2);
        assert!(node.pending().is_empty());

        let balances: u64 = node
            .utxos()
            .iter()
            .filter(|u| u.addr == address)
            .map(|u| u.amount)
            .sum();
        assert_eq!(balances, 2);
        node.shutdown();
    }

    #[test]
    fn test_automatic_mining_at_threshold() {
        let config = Config {
            transactions_per_block: 1,
            ..test_config()
        };
        let node = Node::new(config).unwrap();
        node.start().unwrap();
        let (address, secret) = node.keys();

        let index = node
            .submit_transaction(node.utxos(), vec![TxOutput::new(2, &address)], &secret)
            .unwrap();
        assert_eq!(index, 2);
        assert_eq!(node.chain().len(), 2);
        assert!(node.pending().is_empty());
        node.shutdown();
    }

    #[test]
    fn test_gossip_messages_reach_the_ledger() {
        let sender = started_node();
        let receiver = Node::new(test_config()).unwrap();
        receiver.ledger().replace(sender.snapshot()).unwrap();

        let (_, secret) = sender.keys();
        sender
            .submit_transaction(
                sender.utxos(),
                vec![TxOutput::new(2, &receiver.address())],
                &secret,
            )
            .unwrap();
        let tx = sender.pending().remove(0);
        let text = GossipMessage::new(
            sender.node_address(),
            MessageType::NewTransaction,
            serde_json::to_string(&tx).unwrap(),
        )
        .to_string();

        receiver.process_message(text.parse().unwrap());
        assert_eq!(receiver.pending(), vec![tx.clone()]);

        // Replays are ignored
        receiver.process_message(text.parse().unwrap());
        assert_eq!(receiver.pending().len(), 1);

        sender.shutdown();
        receiver.shutdown();
    }

    #[test]
    fn test_dropped_node_releases_its_workers() {
        let node = Node::new(test_config()).unwrap();
        node.start().unwrap();
        node.mine().unwrap();
        let weak = node.downgrade();
        drop(node);

        // Only transient upgrades by the workers may keep it alive briefly
        let mut released = false;
        for _ in 0..50 {
            if weak.upgrade().is_none() {
                released = true;
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(released);
    }

    #[test]
    fn test_shutdown_cancels_mining() {
        let config = Config {
            base_difficulty: 64,
            ..test_config()
        };
        let node = Node::new(config).unwrap();
        node.start().unwrap();
        node.shutdown();
        assert!(matches!(node.mine(), Err(LedgerError::Mining(_))));
        assert_eq!(node.chain().len(), 1);
    }
}
