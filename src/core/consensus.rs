// Longest chain with the longest common prefix.
//
// Chains are compared through their digests: the previous-hash of every block
// in order followed by the hash of the last block. Two replicas that agree on
// a prefix of their digests agree on that prefix of their chains.

use crate::core::Block;
use crate::error::Result;
use std::collections::BTreeMap;

/// Peer identifier returned when there is nothing to choose from.
pub const NO_CONSENSUS: &str = "";

pub fn chain_digest(chain: &[Block]) -> Result<Vec<String>> {
    let mut digest: Vec<String> = chain
        .iter()
        .map(|block| block.get_previous_hash().to_string())
        .collect();
    if let Some(last) = chain.last() {
        digest.push(last.hash()?);
    }
    Ok(digest)
}

/// Picks the peer whose chain everyone should adopt.
///
/// Scans prefix lengths from the longest digest down to 1 and stops at the
/// first length where some prefix is held by a strict majority of all peers.
/// The winner is the longest digest extending one of those majority prefixes.
/// While every digest is at most two entries long there is no history worth
/// voting on yet, so the longest digest wins outright.
pub fn consensus(digests: &BTreeMap<String, Vec<String>>) -> String {
    if digests.is_empty() {
        return NO_CONSENSUS.to_string();
    }
    if digests.len() == 1 {
        return digests.keys().next().cloned().unwrap_or_default();
    }

    let max_length = digests.values().map(Vec::len).max().unwrap_or(0);
    if max_length <= 2 {
        return bootstrap_winner(digests);
    }

    let peer_count = digests.len();
    for length in (1..=max_length).rev() {
        let mut prefix_counter: BTreeMap<&[String], usize> = BTreeMap::new();
        for digest in digests.values().filter(|d| d.len() >= length) {
            *prefix_counter.entry(&digest[..length]).or_insert(0) += 1;
        }

        let majority: Vec<&[String]> = prefix_counter
            .into_iter()
            .filter(|(_, count)| count * 2 > peer_count)
            .map(|(prefix, _)| prefix)
            .collect();
        if majority.is_empty() {
            continue;
        }

        // BTreeMap iteration is in peer-id order, and only a strictly longer
        // digest displaces the current pick
        let mut winner: Option<(&String, usize)> = None;
        for (peer, digest) in digests {
            let extends_majority = majority.iter().any(|prefix| digest.starts_with(prefix));
            if !extends_majority {
                continue;
            }
            match winner {
                Some((_, best)) if best >= digest.len() => {}
                _ => winner = Some((peer, digest.len())),
            }
        }
        return winner
            .map(|(peer, _)| peer.clone())
            .unwrap_or_else(|| NO_CONSENSUS.to_string());
    }

    NO_CONSENSUS.to_string()
}

// Longest digest first; among equal lengths the digest held by more peers
// wins, then the smaller peer id.
fn bootstrap_winner(digests: &BTreeMap<String, Vec<String>>) -> String {
    let mut holders: BTreeMap<&[String], usize> = BTreeMap::new();
    for digest in digests.values() {
        *holders.entry(digest.as_slice()).or_insert(0) += 1;
    }

    let mut winner: Option<(&String, usize, usize)> = None;
    for (peer, digest) in digests {
        let held_by = holders.get(digest.as_slice()).copied().unwrap_or(0);
        let better = match winner {
            None => true,
            Some((_, len, count)) => (digest.len(), held_by) > (len, count),
        };
        if better {
            winner = Some((peer, digest.len(), held_by));
        }
    }
    winner
        .map(|(peer, _, _)| peer.clone())
        .unwrap_or_else(|| NO_CONSENSUS.to_string())
}
