//! Cryptographic helpers for paysync.
//!
//! This crate provides the small amount of cryptography the payment
//! reconciliation pipeline needs:
//!
//! - **Random tokens**: 128-bit nonces and opaque identifiers from the OS CSPRNG
//! - **Script hashes**: Neo N3 `UInt160` values in their two textual forms
//! - **Addresses**: Neo N3 base58check address encoding and validation
//!
//! # Example
//!
//! ```
//! use paysync_crypto::{address_from_script_hash, random_token, script_hash_from_address, ScriptHash};
//!
//! let nonce = random_token();
//! assert_eq!(nonce.len(), 32);
//!
//! let hash = ScriptHash([7u8; 20]);
//! let address = address_from_script_hash(&hash);
//! assert!(address.starts_with('N'));
//! assert_eq!(script_hash_from_address(&address).unwrap(), hash);
//! ```

mod address;
mod error;
mod token;

pub use address::{
    address_from_script_hash, is_valid_address, script_hash_from_address, NEO_ADDRESS_VERSION,
};
pub use error::CryptoError;
pub use token::{random_token, random_token_with_len, NONCE_BYTES};

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// A Neo N3 `UInt160` script hash.
///
/// Stored in little-endian byte order, which is the order used on the wire
/// and inside notification stack items. The conventional display form is
/// `0x` followed by the big-endian hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptHash(pub [u8; 20]);

impl ScriptHash {
    /// Build from little-endian bytes as found in stack items.
    pub fn from_le_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 20 {
            return Err(CryptoError::InvalidLength {
                expected: 20,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// Parse the `0x`-prefixed big-endian display form.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes =
            hex::decode(trimmed).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        bytes.reverse();
        Self::from_le_slice(&bytes)
    }

    /// Render the `0x`-prefixed big-endian display form.
    pub fn to_hex(&self) -> String {
        let mut bytes = self.0;
        bytes.reverse();
        format!("0x{}", hex::encode(bytes))
    }
}

impl std::fmt::Debug for ScriptHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ScriptHash({})", self.to_hex())
    }
}

impl std::fmt::Display for ScriptHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Current wall-clock time in milliseconds.
pub fn current_timestamp() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_hash_hex_roundtrip_reverses_bytes() {
        // GAS token contract hash as displayed by explorers
        let gas = ScriptHash::from_hex("0xd2a4cff31913016155e38e474a2c06d08be276cf").unwrap();
        assert_eq!(gas.0[0], 0xcf);
        assert_eq!(gas.0[19], 0xd2);
        assert_eq!(gas.to_hex(), "0xd2a4cff31913016155e38e474a2c06d08be276cf");
    }

    #[test]
    fn test_script_hash_rejects_wrong_length() {
        let err = ScriptHash::from_le_slice(&[1, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            CryptoError::InvalidLength {
                expected: 20,
                actual: 3
            }
        );
        assert!(ScriptHash::from_hex("0xzz").is_err());
    }

    #[test]
    fn test_current_timestamp_is_millis() {
        let ts = current_timestamp();
        // After 2020-01-01 in milliseconds
        assert!(ts > 1_577_836_800_000);
    }
}
