//! Error types for paysync-crypto

use thiserror::Error;

/// Errors that can occur while decoding addresses and hashes
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Invalid base58 encoding
    #[error("Invalid base58 encoding: {0}")]
    InvalidBase58(String),

    /// Invalid hex encoding
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),

    /// Decoded payload has the wrong length
    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Address version byte is not the Neo N3 version
    #[error("Invalid address version: expected 0x35, got {0:#04x}")]
    InvalidAddressVersion(u8),

    /// Base58check checksum did not match
    #[error("Address checksum mismatch")]
    ChecksumMismatch,
}
