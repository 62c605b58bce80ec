//! Peer-to-peer networking
//!
//! The JSON-over-TCP protocol between nodes, the client used to call other
//! nodes, the accept loop, the peer registry with its trust mode and the
//! gossip bus that spreads new transactions.

pub mod client;
pub mod gossip;
pub mod peers;
pub mod protocol;
pub mod server;

pub use client::PeerClient;
pub use gossip::{GossipBus, GossipMessage, MessageType};
pub use peers::{normalize_address, PeerRegistry, TrustMode};
pub use protocol::{Request, Response};
pub use server::{handle_request, Server};
