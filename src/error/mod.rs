//! Error handling for the ledger
//!
//! Every fallible operation in the crate returns [`LedgerError`]. Validation
//! failures carry a numeric code so the operation surface can hand them back
//! to callers as structured errors instead of aborting.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Code reported for every rejected transaction.
pub const INVALID_TRANSACTION_CODE: u16 = 400;

/// Error types for ledger, consensus and peer operations
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// A transaction broke one of the validation rules
    InvalidTransaction { message: String, code: u16 },
    /// Malformed peer address or key address
    InvalidAddress(String),
    /// Key generation, decoding or signing failed
    Crypto(String),
    /// Peer unreachable, timed out or answered with garbage
    Network(String),
    /// JSON encoding/decoding errors
    Serialization(String),
    /// Block structure errors
    InvalidBlock(String),
    /// Mining could not produce a block
    Mining(String),
    /// Configuration errors
    Config(String),
    /// File I/O errors
    Io(String),
}

impl LedgerError {
    pub fn invalid_transaction(message: impl Into<String>) -> Self {
        LedgerError::InvalidTransaction {
            message: message.into(),
            code: INVALID_TRANSACTION_CODE,
        }
    }

    /// Status code used when the error crosses the operation surface.
    pub fn code(&self) -> u16 {
        match self {
            LedgerError::InvalidTransaction { code, .. } => *code,
            LedgerError::InvalidAddress(_) | LedgerError::InvalidBlock(_) => 400,
            LedgerError::Network(_) => 502,
            _ => 500,
        }
    }

    /// The bare message, without the category prefix added by `Display`.
    pub fn message(&self) -> String {
        match self {
            LedgerError::InvalidTransaction { message, .. } => message.clone(),
            LedgerError::InvalidAddress(msg)
            | LedgerError::Crypto(msg)
            | LedgerError::Network(msg)
            | LedgerError::Serialization(msg)
            | LedgerError::InvalidBlock(msg)
            | LedgerError::Mining(msg)
            | LedgerError::Config(msg)
            | LedgerError::Io(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::InvalidTransaction { message, code } => {
                write!(f, "Invalid transaction ({code}): {message}")
            }
            LedgerError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            LedgerError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            LedgerError::Network(msg) => write!(f, "Network error: {msg}"),
            LedgerError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            LedgerError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            LedgerError::Mining(msg) => write!(f, "Mining error: {msg}"),
            LedgerError::Config(msg) => write!(f, "Configuration error: {msg}"),
            LedgerError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}
