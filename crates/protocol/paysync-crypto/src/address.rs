//! Neo N3 address encoding.
//!
//! An address is the base58 encoding of:
//! ```text
//! 0x35 || script_hash (20 bytes, little-endian) || checksum (4 bytes)
//! checksum = SHA256(SHA256(0x35 || script_hash))[0:4]
//! ```

use sha2::{Digest, Sha256};

use crate::error::CryptoError;
use crate::ScriptHash;

/// Address version byte for Neo N3.
pub const NEO_ADDRESS_VERSION: u8 = 0x35;

const PAYLOAD_LEN: usize = 21;
const CHECKSUM_LEN: usize = 4;

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let first = Sha256::digest(payload);
    let second = Sha256::digest(first);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&second[..CHECKSUM_LEN]);
    out
}

/// Encode a script hash as a Neo N3 address.
pub fn address_from_script_hash(hash: &ScriptHash) -> String {
    let mut data = Vec::with_capacity(PAYLOAD_LEN + CHECKSUM_LEN);
    data.push(NEO_ADDRESS_VERSION);
    data.extend_from_slice(&hash.0);
    let check = checksum(&data);
    data.extend_from_slice(&check);
    bs58::encode(data).into_string()
}

/// Decode a Neo N3 address back into its script hash.
pub fn script_hash_from_address(address: &str) -> Result<ScriptHash, CryptoError> {
    let data = bs58::decode(address)
        .into_vec()
        .map_err(|e| CryptoError::InvalidBase58(e.to_string()))?;

    if data.len() != PAYLOAD_LEN + CHECKSUM_LEN {
        return Err(CryptoError::InvalidLength {
            expected: PAYLOAD_LEN + CHECKSUM_LEN,
            actual: data.len(),
        });
    }

    let (payload, check) = data.split_at(PAYLOAD_LEN);
    if payload[0] != NEO_ADDRESS_VERSION {
        return Err(CryptoError::InvalidAddressVersion(payload[0]));
    }
    if checksum(payload) != check {
        return Err(CryptoError::ChecksumMismatch);
    }

    ScriptHash::from_le_slice(&payload[1..])
}

/// Check whether a string is a well-formed Neo N3 address.
pub fn is_valid_address(address: &str) -> bool {
    script_hash_from_address(address).is_ok()
}
