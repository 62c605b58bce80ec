use crate::error::{LedgerError, Result};
use crate::utils::{base58_decode, base58_encode, ecdsa_p256_sha256_sign_digest};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair as _, ECDSA_P256_SHA256_FIXED_SIGNING};
use std::fmt;

/// Length of an uncompressed SEC1 P-256 point (0x04 || X || Y).
pub const PUBLIC_KEY_LEN: usize = 65;
const UNCOMPRESSED_POINT_TAG: u8 = 0x04;

/// A signing key and its verifying half.
///
/// The signing key is kept as the PKCS#8 document ring produces; its textual
/// form is the base58 encoding of those bytes. The address is the base58
/// encoding of the raw public point.
#[derive(Clone)]
pub struct KeyPair {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl KeyPair {
    pub fn generate() -> Result<KeyPair> {
        let pkcs8 = crate::utils::new_key_pair()?;
        KeyPair::from_pkcs8(&pkcs8)
    }

    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<KeyPair> {
        let rng = SystemRandom::new();
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
            .map_err(|e| LedgerError::Crypto(format!("Invalid signing key: {e}")))?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        Ok(KeyPair {
            pkcs8: pkcs8.to_vec(),
            public_key,
        })
    }

    pub fn address(&self) -> String {
        key_to_address(&self.public_key)
    }

    pub fn signing_key_text(&self) -> String {
        base58_encode(&self.pkcs8)
    }

    pub fn public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        ecdsa_p256_sha256_sign_digest(&self.pkcs8, message)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// The public half recovered from an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyingKey {
    bytes: Vec<u8>,
}

impl VerifyingKey {
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        crate::utils::ecdsa_p256_sha256_sign_verify(&self.bytes, signature, message)
    }
}

pub fn generate_keypair() -> Result<KeyPair> {
    KeyPair::generate()
}

pub fn key_to_address(key: &[u8]) -> String {
    base58_encode(key)
}

pub fn address_to_verifying_key(address: &str) -> Result<VerifyingKey> {
    let bytes = base58_decode(address)?;
    if bytes.len() != PUBLIC_KEY_LEN || bytes[0] != UNCOMPRESSED_POINT_TAG {
        return Err(LedgerError::InvalidAddress(format!(
            "{address} does not encode a P-256 public key"
        )));
    }
    Ok(VerifyingKey { bytes })
}

pub fn validate_address(address: &str) -> bool {
    address_to_verifying_key(address).is_ok()
}

/// Decode the textual signing key. Users paste keys with stray quotes often
/// enough that one layer of `'` or `"` around the text is ignored.
pub fn decode_signing_key(text: &str) -> Result<KeyPair> {
    let trimmed = text
        .trim()
        .trim_start_matches(['\'', '"'])
        .trim_end_matches(['\'', '"']);
    let pkcs8 = base58_decode(trimmed)
        .map_err(|e| LedgerError::Crypto(format!("Signing key is not base58: {e}")))?;
    KeyPair::from_pkcs8(&pkcs8)
}
