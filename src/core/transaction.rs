// Transactions move value between addresses using the UTXO model: every input
// names an unspent output by (tx_hash, output_index) and carries its amount and
// owner address, every output is just an amount paid to an address.
//
// A transaction's hash covers exactly {ins, outs, time, coinbase}, plus a
// random nonce on coinbases so two rewards to the same miner within one
// millisecond still hash apart. The signature is made over the UTF-8 bytes of
// that hex hash with the key of the first input's address.

use crate::error::{LedgerError, Result};
use crate::storage::UtxoSet;
use crate::utils::{base58_decode, base58_encode, canonical_hash, current_timestamp};
use crate::wallet::{address_to_verifying_key, KeyPair};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

pub const MSG_COINBASE_HAS_INPUTS: &str = "Coinbase transaction should have no inputs.";
pub const MSG_COINBASE_OUTPUT_COUNT: &str = "Coinbase transaction should have a single output.";
pub const MSG_COINBASE_REWARD: &str = "Output amount should equal reward.";
pub const MSG_NO_INPUTS: &str = "Must provide transaction inputs.";
pub const MSG_NO_OUTPUTS: &str = "Must provide transaction outputs.";
pub const MSG_INPUTS_NOT_FOUND: &str = "Inputs not found in UTXO pool.";
pub const MSG_SUM_MISMATCH: &str = "Sum of inputs does not equal sum of outputs.";
pub const MSG_MIXED_KEYS: &str = "All transaction inputs must share the same public key.";
pub const MSG_BAD_TIMESTAMP: &str = "Transaction timestamp is incorrect.";
pub const MSG_BAD_SIGNATURE: &str = "Signature not valid.";
pub const MSG_BAD_SIGNING_KEY: &str = "Signing key could not be decoded.";

// An unspent output. Inputs use the same shape, so I alias it below instead of
// duplicating the struct.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Utxo {
    pub tx_hash: String,
    pub output_index: usize,
    pub amount: u64,
    pub addr: String,
}

pub type TxInput = Utxo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub amount: u64,
    pub addr: String,
}

impl TxOutput {
    pub fn new(amount: u64, addr: &str) -> TxOutput {
        TxOutput {
            amount,
            addr: addr.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    ins: Vec<TxInput>,
    outs: Vec<TxOutput>,
    time: i64, // milliseconds; doubles as a nonce so identical transfers hash differently
    coinbase: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    nonce: String,
    #[serde(default)]
    hash: String,
    #[serde(default)]
    sig: String, // base58 of the fixed-length ECDSA signature
}

// What actually gets hashed. Field names match the wire names so the canonical
// form is the same no matter which side computes it.
#[derive(Serialize)]
struct TransactionBody<'a> {
    ins: &'a [TxInput],
    outs: &'a [TxOutput],
    time: i64,
    coinbase: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<&'a str>,
}

impl Transaction {
    /// Builds an unsigned transaction stamped with the current time.
    pub fn new(ins: Vec<TxInput>, outs: Vec<TxOutput>, coinbase: bool) -> Result<Transaction> {
        Self::new_with_time(ins, outs, coinbase, current_timestamp()?)
    }

    pub fn new_with_time(
        ins: Vec<TxInput>,
        outs: Vec<TxOutput>,
        coinbase: bool,
        time: i64,
    ) -> Result<Transaction> {
        let mut tx = Transaction {
            ins,
            outs,
            time,
            coinbase,
            nonce: String::new(),
            hash: String::new(),
            sig: String::new(),
        };
        tx.hash = tx.compute_hash()?;
        Ok(tx)
    }

    // The mining reward: no inputs, one output paying `reward` to the miner.
    // Random data stands in for the inputs that would otherwise make it unique.
    pub fn new_coinbase(to: &str, reward: u64) -> Result<Transaction> {
        let mut tx = Transaction {
            ins: vec![],
            outs: vec![TxOutput::new(reward, to)],
            time: current_timestamp()?,
            coinbase: true,
            nonce: Uuid::new_v4().simple().to_string(),
            hash: String::new(),
            sig: String::new(),
        };
        tx.hash = tx.compute_hash()?;
        Ok(tx)
    }

    pub fn compute_hash(&self) -> Result<String> {
        canonical_hash(&TransactionBody {
            ins: &self.ins,
            outs: &self.outs,
            time: self.time,
            coinbase: self.coinbase,
            nonce: Some(self.nonce.as_str()).filter(|n| !n.is_empty()),
        })
    }

    pub fn sign(&mut self, keys: &KeyPair) -> Result<()> {
        let signature = keys.sign(self.hash.as_bytes())?;
        self.sig = base58_encode(&signature);
        Ok(())
    }

    /// Coinbase transactions always pass: they have no input address to check
    /// the signature against.
    pub fn verify_signature(&self) -> bool {
        if self.coinbase {
            return true;
        }

        match self.compute_hash() {
            Ok(hash) if hash == self.hash => {}
            _ => return false,
        }

        let first = match self.ins.first() {
            Some(input) => input,
            None => return false,
        };
        let verifying_key = match address_to_verifying_key(&first.addr) {
            Ok(vk) => vk,
            Err(_) => return false,
        };
        let signature = match base58_decode(&self.sig) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        verifying_key.verify(self.hash.as_bytes(), &signature)
    }

    /// Applies every validation rule except the signature check, in order;
    /// the first failing rule is reported.
    pub fn validate_structure(&self, utxo_set: &UtxoSet, reward: u64) -> Result<()> {
        if self.coinbase {
            if !self.ins.is_empty() {
                return Err(LedgerError::invalid_transaction(MSG_COINBASE_HAS_INPUTS));
            }
            if self.outs.len() != 1 {
                return Err(LedgerError::invalid_transaction(MSG_COINBASE_OUTPUT_COUNT));
            }
            if self.outs[0].amount != reward {
                return Err(LedgerError::invalid_transaction(MSG_COINBASE_REWARD));
            }
            return Ok(());
        }

        if self.ins.is_empty() {
            return Err(LedgerError::invalid_transaction(MSG_NO_INPUTS));
        }
        if self.outs.is_empty() {
            return Err(LedgerError::invalid_transaction(MSG_NO_OUTPUTS));
        }

        // Listing the same output twice would let it be spent twice
        let mut seen = BTreeSet::new();
        for input in &self.ins {
            if !seen.insert(input) || !utxo_set.contains(input) {
                return Err(LedgerError::invalid_transaction(MSG_INPUTS_NOT_FOUND));
            }
        }

        match (self.input_value(), self.output_value()) {
            (Some(total_in), Some(total_out)) if total_in == total_out => {}
            _ => return Err(LedgerError::invalid_transaction(MSG_SUM_MISMATCH)),
        }

        let owners: BTreeSet<&str> = self.ins.iter().map(|i| i.addr.as_str()).collect();
        if owners.len() != 1 {
            return Err(LedgerError::invalid_transaction(MSG_MIXED_KEYS));
        }

        if self.time > current_timestamp()? {
            return Err(LedgerError::invalid_transaction(MSG_BAD_TIMESTAMP));
        }

        Ok(())
    }

    /// Full check used for transactions that arrive already signed.
    pub fn validate(&self, utxo_set: &UtxoSet, reward: u64) -> Result<()> {
        self.validate_structure(utxo_set, reward)?;
        if !self.verify_signature() {
            return Err(LedgerError::invalid_transaction(MSG_BAD_SIGNATURE));
        }
        Ok(())
    }

    // None on overflow
    pub fn input_value(&self) -> Option<u64> {
        self.ins
            .iter()
            .try_fold(0u64, |acc, i| acc.checked_add(i.amount))
    }

    pub fn output_value(&self) -> Option<u64> {
        self.outs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.amount))
    }

    pub fn is_coinbase(&self) -> bool {
        self.coinbase
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_sig(&self) -> &str {
        self.sig.as_str()
    }

    pub fn get_ins(&self) -> &[TxInput] {
        self.ins.as_slice()
    }

    pub fn get_outs(&self) -> &[TxOutput] {
        self.outs.as_slice()
    }

    pub fn get_time(&self) -> i64 {
        self.time
    }
}
