use crate::core::Block;
use crate::utils::sha256_hex;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};

// How often (in attempts) the search looks at its cancellation flag
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Nonce search for the block that follows `last_block`.
///
/// A candidate proof is `"{difficulty}-{miner}{counter}"`. It is valid when
/// `sha256_hex(last_proof ‖ proof ‖ last_hash)` starts with `difficulty` zero
/// hex digits. Embedding the difficulty in the proof lets any replica check
/// the block without knowing how many peers the miner saw.
pub struct ProofOfWork {
    last_proof: String,
    last_hash: String,
    difficulty: u32,
    miner_address: String,
}

impl ProofOfWork {
    pub fn new_proof_of_work(
        last_block: &Block,
        last_hash: &str,
        difficulty: u32,
        miner_address: &str,
    ) -> ProofOfWork {
        ProofOfWork {
            last_proof: last_block.get_proof().to_string(),
            last_hash: last_hash.to_string(),
            difficulty,
            miner_address: miner_address.to_string(),
        }
    }

    /// `floor(sqrt(peer_count)) + base`: more peers, harder puzzle.
    pub fn difficulty_for(peer_count: usize, base: u32) -> u32 {
        let root = (peer_count as f64).sqrt().floor() as u32;
        root.saturating_add(base)
    }

    fn candidate(&self, counter: u64) -> String {
        format!("{}-{}{}", self.difficulty, self.miner_address, counter)
    }

    pub fn run(&self) -> String {
        let never = AtomicBool::new(false);
        // The flag is never raised, so the search only ends with a proof
        self.run_until(&never).unwrap_or_default()
    }

    /// Searches until a proof is found or `cancel` is raised.
    pub fn run_until(&self, cancel: &AtomicBool) -> Option<String> {
        info!(
            "Starting proof-of-work on {} with difficulty {}",
            self.last_hash, self.difficulty
        );
        let mut counter: u64 = 0;
        loop {
            if counter % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                debug!("Proof-of-work cancelled after {counter} attempts");
                return None;
            }
            let proof = self.candidate(counter);
            if Self::valid_proof(&self.last_proof, &proof, &self.last_hash) {
                info!("Proof-of-work found after {} attempts: {proof}", counter + 1);
                return Some(proof);
            }
            counter = counter.wrapping_add(1);
        }
    }

    pub fn valid_proof(last_proof: &str, proof: &str, last_hash: &str) -> bool {
        let difficulty = match Self::proof_difficulty(proof) {
            Some(d) => d,
            None => return false,
        };
        let guess = format!("{last_proof}{proof}{last_hash}");
        let digest = sha256_hex(guess.as_bytes());
        digest.len() >= difficulty && digest.bytes().take(difficulty).all(|b| b == b'0')
    }

    /// The difficulty a proof claims: the number before its first `-`.
    pub fn proof_difficulty(proof: &str) -> Option<usize> {
        let (prefix, _) = proof.split_once('-')?;
        prefix.parse::<usize>().ok()
    }
}
