use crate::error::{LedgerError, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Whether this node plays honest or adversarial. Honest nodes only
/// reconcile with honest peers and adversarial ones only with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustMode {
    Good,
    Bad,
}

impl TrustMode {
    pub fn from_good(good: bool) -> TrustMode {
        if good {
            TrustMode::Good
        } else {
            TrustMode::Bad
        }
    }

    pub fn is_good(self) -> bool {
        self == TrustMode::Good
    }

    pub fn flipped(self) -> TrustMode {
        match self {
            TrustMode::Good => TrustMode::Bad,
            TrustMode::Bad => TrustMode::Good,
        }
    }
}

impl fmt::Display for TrustMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustMode::Good => write!(f, "good"),
            TrustMode::Bad => write!(f, "bad"),
        }
    }
}

/// Reduces `http://host:port/path` or `host:port` to `host:port`.
pub fn normalize_address(address: &str) -> Result<String> {
    let trimmed = address.trim();
    let without_scheme = match trimmed.split_once("://") {
        Some((_, rest)) => rest,
        None => trimmed,
    };
    let netloc = without_scheme.split('/').next().unwrap_or_default();

    let (host, port) = netloc
        .rsplit_once(':')
        .ok_or_else(|| LedgerError::InvalidAddress(format!("Invalid URL: {address}")))?;
    if host.is_empty() {
        return Err(LedgerError::InvalidAddress(format!(
            "Invalid URL (missing host): {address}"
        )));
    }
    if port.parse::<u16>().is_err() {
        return Err(LedgerError::InvalidAddress(format!(
            "Invalid URL (bad port): {address}"
        )));
    }
    Ok(netloc.to_string())
}

/// Known peers and the local trust mode, each under its own lock.
pub struct PeerRegistry {
    self_address: String,
    peers: Mutex<BTreeSet<String>>,
    trust: Mutex<TrustMode>,
}

impl PeerRegistry {
    pub fn new(self_address: &str) -> PeerRegistry {
        PeerRegistry {
            self_address: self_address.to_string(),
            peers: Mutex::new(BTreeSet::new()),
            trust: Mutex::new(TrustMode::Good),
        }
    }

    /// Returns true when the peer was not known before. Our own address is
    /// never registered.
    pub fn register(&self, address: &str) -> Result<bool> {
        let peer = normalize_address(address)?;
        if peer == self.self_address {
            return Ok(false);
        }
        let added = self
            .peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer.clone());
        if added {
            info!("Registered peer {peer}");
        }
        Ok(added)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(address)
    }

    pub fn peers(&self) -> Vec<String> {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn trust(&self) -> TrustMode {
        *self.trust.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_trust(&self, mode: TrustMode) {
        *self.trust.lock().unwrap_or_else(PoisonError::into_inner) = mode;
        info!("Trust mode set to {mode}");
    }

    pub fn flip_trust(&self) -> TrustMode {
        let mut trust = self.trust.lock().unwrap_or_else(PoisonError::into_inner);
        *trust = trust.flipped();
        info!("Trust mode flipped to {}", *trust);
        *trust
    }
}
