//! Utility functions and helpers
//!
//! Hashing, base58, ECDSA primitives and the canonical JSON form that every
//! ledger hash is computed over.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, sha256_digest, sha256_hex,
};

pub use serialization::{canonical_hash, to_canonical_json};
