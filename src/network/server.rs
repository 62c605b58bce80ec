use crate::error::{LedgerError, Result};
use crate::network::protocol::{Request, Response};
use crate::node::Node;
use crate::wallet::generate_keypair;
use log::{debug, error, info, warn};
use serde_json::Deserializer;
use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const TCP_READ_TIMEOUT: u64 = 60_000;
const TCP_WRITE_TIMEOUT: u64 = 5000;

/// Accepts peer and client connections for one node: one handler thread per
/// connection, one request and one response per connection.
pub struct Server {
    listener: TcpListener,
}

impl Server {
    pub fn bind(addr: &str) -> Result<Server> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| LedgerError::Network(format!("Failed to bind to {addr}: {e}")))?;
        Ok(Server { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the accept loop on a background thread.
    pub fn spawn(self, node: Node) -> JoinHandle<()> {
        thread::spawn(move || self.serve(node))
    }

    /// Accepts connections until the node shuts down.
    pub fn serve(self, node: Node) {
        if let Ok(addr) = self.local_addr() {
            info!("Server listening on {addr}");
        }

        for stream in self.listener.incoming() {
            if node.is_shut_down() {
                break;
            }
            match stream {
                Ok(stream) => {
                    let node = node.clone();
                    thread::spawn(move || {
                        let peer_addr = stream
                            .peer_addr()
                            .map(|a| a.to_string())
                            .unwrap_or_else(|_| "unknown".to_string());
                        if let Err(e) = Self::handle_connection(&node, stream) {
                            error!("Error handling connection from {peer_addr}: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }
        info!("Server stopped");
    }

    fn handle_connection(node: &Node, stream: TcpStream) -> Result<()> {
        stream
            .set_read_timeout(Some(Duration::from_millis(TCP_READ_TIMEOUT)))
            .map_err(|e| LedgerError::Network(format!("Failed to set read timeout: {e}")))?;
        stream
            .set_write_timeout(Some(Duration::from_millis(TCP_WRITE_TIMEOUT)))
            .map_err(|e| LedgerError::Network(format!("Failed to set write timeout: {e}")))?;

        let reader = BufReader::new(&stream);
        let request = match Deserializer::from_reader(reader)
            .into_iter::<Request>()
            .next()
        {
            Some(Ok(request)) => request,
            Some(Err(e)) => {
                warn!("Rejected malformed request: {e}");
                let response = Response::Error {
                    message: format!("Malformed request: {e}"),
                    code: 400,
                };
                return Self::respond(&stream, &response);
            }
            // Connections that close without a request are the shutdown wake-up
            None => return Ok(()),
        };

        debug!("Received request {request:?}");
        let response = handle_request(node, request);
        Self::respond(&stream, &response)
    }

    fn respond(stream: &TcpStream, response: &Response) -> Result<()> {
        serde_json::to_writer(stream, response)
            .map_err(|e| LedgerError::Network(format!("Failed to send response: {e}")))?;
        let _ = stream.shutdown(Shutdown::Write);
        Ok(())
    }
}

/// Maps one request onto the node's operation set.
pub fn handle_request(node: &Node, request: Request) -> Response {
    match request {
        Request::SubmitTransaction {
            inputs,
            outputs,
            priv_key,
            coinbase,
        } => {
            let submitted = if coinbase {
                node.submit_coinbase()
            } else {
                node.submit_transaction(inputs, outputs, &priv_key)
            };
            match submitted {
                Ok(index) => Response::Submitted { index },
                Err(e) => e.into(),
            }
        }
        Request::Mine => match node.mine() {
            Ok(block) => Response::Mined { block },
            Err(e) => e.into(),
        },
        Request::GetChain => Response::chain(node.chain()),
        Request::GetUtxos => Response::Utxos {
            utxos: node.utxos(),
        },
        Request::GetPending => Response::Pending {
            txs: node.pending(),
        },
        Request::GetSnapshot => {
            let snapshot = node.snapshot();
            Response::Snapshot {
                chain: snapshot.chain,
                utxos: snapshot.utxos,
                txs: snapshot.txs,
            }
        }
        Request::RegisterPeer { node: peer } => match node.register_peer(&peer) {
            Ok(nodes) => Response::Peers { nodes },
            Err(e) => e.into(),
        },
        Request::ListPeers => Response::Peers {
            nodes: node.peers(),
        },
        Request::Resolve => {
            let replaced = node.resolve_conflicts();
            Response::Resolved {
                replaced,
                chain: node.chain(),
            }
        }
        Request::GetTrust => Response::Trust {
            good: node.trust().is_good(),
        },
        Request::FlipTrust => Response::Trust {
            good: node.flip_trust().is_good(),
        },
        Request::SetTrust { good } => {
            node.set_trust(good);
            Response::Trust {
                good: node.trust().is_good(),
            }
        }
        Request::GetKeys => {
            let (public_key, secret_key) = node.keys();
            Response::Keys {
                public_key,
                secret_key,
            }
        }
        // The node sees the secret half; this is a teaching network
        Request::GenerateKeys => match generate_keypair() {
            Ok(keys) => Response::Keys {
                public_key: keys.address(),
                secret_key: keys.signing_key_text(),
            },
            Err(e) => e.into(),
        },
        Request::Genesis => match node.genesis() {
            Ok(_) => Response::chain(node.chain()),
            Err(e) => e.into(),
        },
        Request::Subscribe { addr } => match node.subscribe_back(&addr) {
            Ok(()) => Response::Ack,
            Err(e) => e.into(),
        },
        Request::Gossip { message } => match node.receive_gossip(&message) {
            Ok(()) => Response::Ack,
            Err(e) => e.into(),
        },
    }
}
