use crate::core::LedgerSnapshot;
use crate::error::{LedgerError, Result};
use crate::network::peers::TrustMode;
use crate::network::protocol::{Request, Response};
use log::debug;
use serde_json::Deserializer;
use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Outbound calls to other nodes. Every call is bounded by `timeout` for
/// the connect, the write and the read; any failure surfaces as
/// `LedgerError::Network`.
#[derive(Debug, Clone)]
pub struct PeerClient {
    timeout: Duration,
}

impl PeerClient {
    pub fn new(timeout: Duration) -> PeerClient {
        PeerClient { timeout }
    }

    fn resolve(addr: &str) -> Result<SocketAddr> {
        addr.to_socket_addrs()
            .map_err(|e| LedgerError::Network(format!("Invalid address {addr}: {e}")))?
            .next()
            .ok_or_else(|| LedgerError::Network(format!("No address found for {addr}")))
    }

    /// Sends one request and waits for the single response.
    pub fn call(&self, addr: &str, request: &Request) -> Result<Response> {
        let socket_addr = Self::resolve(addr)?;
        debug!("Sending {request:?} to {addr}");

        let stream = TcpStream::connect_timeout(&socket_addr, self.timeout)
            .map_err(|e| LedgerError::Network(format!("Failed to connect to {addr}: {e}")))?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(|e| LedgerError::Network(format!("Failed to set write timeout: {e}")))?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| LedgerError::Network(format!("Failed to set read timeout: {e}")))?;

        serde_json::to_writer(&stream, request)
            .map_err(|e| LedgerError::Network(format!("Failed to send to {addr}: {e}")))?;
        stream
            .shutdown(Shutdown::Write)
            .map_err(|e| LedgerError::Network(format!("Failed to finish request: {e}")))?;

        let reader = BufReader::new(&stream);
        let response = Deserializer::from_reader(reader)
            .into_iter::<Response>()
            .next()
            .ok_or_else(|| LedgerError::Network(format!("{addr} closed without answering")))?
            .map_err(|e| LedgerError::Network(format!("Malformed response from {addr}: {e}")))?;

        match response {
            Response::Error { message, code } => Err(LedgerError::Network(format!(
                "{addr} answered with error {code}: {message}"
            ))),
            other => Ok(other),
        }
    }

    pub fn fetch_trust(&self, addr: &str) -> Result<TrustMode> {
        match self.call(addr, &Request::GetTrust)? {
            Response::Trust { good } => Ok(TrustMode::from_good(good)),
            other => Err(unexpected(addr, &other)),
        }
    }

    pub fn fetch_snapshot(&self, addr: &str) -> Result<LedgerSnapshot> {
        match self.call(addr, &Request::GetSnapshot)? {
            Response::Snapshot { chain, utxos, txs } => Ok(LedgerSnapshot { chain, utxos, txs }),
            other => Err(unexpected(addr, &other)),
        }
    }

    pub fn request_resolve(&self, addr: &str) -> Result<bool> {
        match self.call(addr, &Request::Resolve)? {
            Response::Resolved { replaced, .. } => Ok(replaced),
            other => Err(unexpected(addr, &other)),
        }
    }

    pub fn send_gossip(&self, addr: &str, message: String) -> Result<()> {
        self.expect_ack(addr, &Request::Gossip { message })
    }

    /// Asks `addr` to subscribe to gossip from `our_address`.
    pub fn notify_subscribe(&self, addr: &str, our_address: &str) -> Result<()> {
        self.expect_ack(
            addr,
            &Request::Subscribe {
                addr: our_address.to_string(),
            },
        )
    }

    /// Asks `addr` to register `our_address` as a peer; returns its peer list.
    pub fn register_with(&self, addr: &str, our_address: &str) -> Result<Vec<String>> {
        let request = Request::RegisterPeer {
            node: our_address.to_string(),
        };
        match self.call(addr, &request)? {
            Response::Peers { nodes } => Ok(nodes),
            other => Err(unexpected(addr, &other)),
        }
    }

    fn expect_ack(&self, addr: &str, request: &Request) -> Result<()> {
        match self.call(addr, request)? {
            Response::Ack => Ok(()),
            other => Err(unexpected(addr, &other)),
        }
    }
}

fn unexpected(addr: &str, response: &Response) -> LedgerError {
    LedgerError::Network(format!("Unexpected response from {addr}: {response:?}"))
}
