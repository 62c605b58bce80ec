// Wire packages. Each connection carries exactly one Request followed by
// exactly one Response, both as JSON objects tagged by "op".

use crate::core::{Block, Transaction, TxInput, TxOutput, Utxo};
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    SubmitTransaction {
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        priv_key: String,
        // A coinbase pays the reward to the node itself; the other fields are ignored
        #[serde(default)]
        coinbase: bool,
    },
    Mine,
    GetChain,
    GetUtxos,
    GetPending,
    GetSnapshot,
    RegisterPeer {
        node: String,
    },
    ListPeers,
    Resolve,
    GetTrust,
    FlipTrust,
    SetTrust {
        good: bool,
    },
    GetKeys,
    GenerateKeys,
    Genesis,
    Subscribe {
        addr: String,
    },
    Gossip {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Response {
    Submitted {
        index: u64,
    },
    Mined {
        block: Block,
    },
    Chain {
        chain: Vec<Block>,
        length: usize,
    },
    Utxos {
        utxos: Vec<Utxo>,
    },
    Pending {
        txs: Vec<Transaction>,
    },
    Snapshot {
        chain: Vec<Block>,
        utxos: Vec<Utxo>,
        txs: Vec<Transaction>,
    },
    Peers {
        nodes: Vec<String>,
    },
    Resolved {
        replaced: bool,
        chain: Vec<Block>,
    },
    Trust {
        good: bool,
    },
    Keys {
        public_key: String,
        secret_key: String,
    },
    Ack,
    Error {
        message: String,
        code: u16,
    },
}

impl Response {
    pub fn chain(chain: Vec<Block>) -> Response {
        let length = chain.len();
        Response::Chain { chain, length }
    }
}

impl From<LedgerError> for Response {
    fn from(err: LedgerError) -> Self {
        Response::Error {
            message: err.message(),
            code: err.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_tags() {
        let json = serde_json::to_value(&Request::RegisterPeer {
            node: "127.0.0.1:5001".to_string(),
        })
        .unwrap();
        assert_eq!(json["op"], "register_peer");
        assert_eq!(json["node"], "127.0.0.1:5001");

        let parsed: Request = serde_json::from_str(r#"{"op":"get_chain"}"#).unwrap();
        assert_eq!(parsed, Request::GetChain);
    }

    #[test]
    fn test_error_response_keeps_code() {
        let response = Response::from(LedgerError::invalid_transaction(
            "Must provide transaction outputs.",
        ));
        assert_eq!(
            response,
            Response::Error {
                message: "Must provide transaction outputs.".to_string(),
                code: 400,
            }
        );
    }

    #[test]
    fn test_chain_response_reports_length() {
        match Response::chain(vec![]) {
            Response::Chain { chain, length } => {
                assert!(chain.is_empty());
                assert_eq!(length, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
