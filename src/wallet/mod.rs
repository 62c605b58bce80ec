//! Key management
//!
//! Keypair generation and the stateless conversions between raw key bytes,
//! base58 addresses and signing/verifying keys. An address is the only
//! identity a transaction knows about; there is no account object.

pub mod keypair;

pub use keypair::{
    address_to_verifying_key, decode_signing_key, generate_keypair, key_to_address,
    validate_address, KeyPair, VerifyingKey, PUBLIC_KEY_LEN,
};
