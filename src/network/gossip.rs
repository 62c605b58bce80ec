// Publish/subscribe fan-out of transaction announcements.
//
// Outbound messages are handed to a background sender thread that delivers
// each one to every subscriber once, best effort. Inbound messages are pushed
// onto an mpsc channel; the node drains it on its own worker thread.

use crate::error::{LedgerError, Result};
use crate::network::client::PeerClient;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread;

const SEPARATOR: &str = "::";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    NewTransaction,
}

impl MessageType {
    pub fn code(self) -> &'static str {
        match self {
            MessageType::NewTransaction => "2",
        }
    }

    pub fn from_code(code: &str) -> Option<MessageType> {
        match code {
            "2" => Some(MessageType::NewTransaction),
            _ => None,
        }
    }
}

/// `origin::type::payload` on the wire. Only the first two separators
/// count, so the JSON payload may contain `::` itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipMessage {
    pub origin: String,
    pub mtype: MessageType,
    pub data: String,
}

impl GossipMessage {
    pub fn new(origin: &str, mtype: MessageType, data: String) -> GossipMessage {
        GossipMessage {
            origin: origin.to_string(),
            mtype,
            data,
        }
    }

    pub fn json_data<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.data)?)
    }
}

impl fmt::Display for GossipMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.origin,
            self.mtype.code(),
            self.data
        )
    }
}

impl FromStr for GossipMessage {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<GossipMessage> {
        let mut parts = s.splitn(3, SEPARATOR);
        let (origin, code, data) = match (parts.next(), parts.next(), parts.next()) {
            (Some(origin), Some(code), Some(data)) => (origin, code, data),
            _ => {
                return Err(LedgerError::Serialization(format!(
                    "Malformed gossip message: {s}"
                )))
            }
        };
        let mtype = MessageType::from_code(code).ok_or_else(|| {
            LedgerError::Serialization(format!("Unsupported gossip message type {code}"))
        })?;
        Ok(GossipMessage::new(origin, mtype, data.to_string()))
    }
}

struct Outbound {
    peers: Vec<String>,
    text: String,
}

pub struct GossipBus {
    origin: String,
    client: PeerClient,
    subscribers: Mutex<BTreeSet<String>>,
    outbound: Mutex<Sender<Outbound>>,
    inbound: Mutex<Sender<GossipMessage>>,
}

impl GossipBus {
    /// Creates the bus and starts its sender thread. The returned receiver
    /// yields inbound messages in arrival order.
    pub fn new(origin: &str, client: PeerClient) -> (GossipBus, Receiver<GossipMessage>) {
        let (outbound_tx, outbound_rx) = mpsc::channel::<Outbound>();
        let (inbound_tx, inbound_rx) = mpsc::channel();

        let sender_client = client.clone();
        // Ends once the bus is dropped and the channel closes
        thread::spawn(move || {
            for out in outbound_rx {
                for peer in out.peers {
                    if let Err(e) = sender_client.send_gossip(&peer, out.text.clone()) {
                        warn!("Dropped gossip for {peer}: {e}");
                    }
                }
            }
        });

        let bus = GossipBus {
            origin: origin.to_string(),
            client,
            subscribers: Mutex::new(BTreeSet::new()),
            outbound: Mutex::new(outbound_tx),
            inbound: Mutex::new(inbound_tx),
        };
        (bus, inbound_rx)
    }

    pub fn subscribers(&self) -> Vec<String> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Queues `payload` for every current subscriber and returns at once.
    pub fn publish(&self, mtype: MessageType, payload: String) -> Result<()> {
        let message = GossipMessage::new(&self.origin, mtype, payload);
        let peers = self.subscribers();
        if peers.is_empty() {
            return Ok(());
        }
        debug!("Publishing {:?} to {} peers", mtype, peers.len());
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(Outbound {
                peers,
                text: message.to_string(),
            })
            .map_err(|_| LedgerError::Network("Gossip sender has stopped".to_string()))
    }

    /// Adds `peer` to the outbound list and asks it to subscribe back.
    /// Returns false for ourselves and for peers already subscribed.
    pub fn subscribe(&self, peer: &str) -> bool {
        if peer == self.origin {
            return false;
        }
        let added = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer.to_string());
        if !added {
            return false;
        }
        info!("{} subscribed to {peer}", self.origin);

        // The lock is released before this call: the peer answers by
        // subscribing back, which lands in our own server
        if let Err(e) = self.client.notify_subscribe(peer, &self.origin) {
            warn!("Could not ask {peer} to subscribe back: {e}");
        }
        true
    }

    pub fn unsubscribe(&self, peer: &str) -> bool {
        let removed = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(peer);
        if removed {
            info!("{} unsubscribed from {peer}", self.origin);
        }
        removed
    }

    /// Parses an inbound message and queues it for the drain worker.
    pub fn push_message(&self, text: &str) -> Result<()> {
        let message: GossipMessage = text.parse()?;
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(message)
            .map_err(|_| LedgerError::Network("Gossip queue is closed".to_string()))
    }
}
