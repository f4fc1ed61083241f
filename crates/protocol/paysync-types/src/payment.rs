//! Pending payment types and the payment status state machine.

use serde::{Deserialize, Serialize};

use paysync_crypto::{is_valid_address, random_token, script_hash_from_address, ScriptHash, Timestamp};

use crate::constants::{MAX_NONCE_LENGTH, MAX_TX_DIGEST_LENGTH};
use crate::error::{PaysyncError, Result};
use crate::ledger::Amount;

// =============================================================================
// Identifiers
// =============================================================================

/// Opaque unique identifier of a pending payment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(random_token())
    }

    /// Parse an identifier supplied by a caller.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PaysyncError::invalid_input("payment id", "must not be empty"));
        }
        Ok(Self(s.to_string()))
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A Neo N3 wallet address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parse and validate a base58check address.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if !is_valid_address(s) {
            return Err(PaysyncError::InvalidAddress(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Wrap a value read back from storage, which was validated on insert.
    pub fn new_unchecked(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Build the address for a script hash.
    pub fn from_script_hash(hash: &ScriptHash) -> Self {
        Self(paysync_crypto::address_from_script_hash(hash))
    }

    /// Decode the script hash behind this address.
    pub fn script_hash(&self) -> Result<ScriptHash> {
        script_hash_from_address(&self.0).map_err(|e| PaysyncError::InvalidAddress(e.to_string()))
    }

    /// Get the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single-use token binding a payment intent to one address and amount.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    /// Generate a fresh 128-bit random nonce.
    pub fn generate() -> Self {
        Self(random_token())
    }

    /// Parse a client-supplied nonce.
    ///
    /// Accepts 1 to 128 characters from `[A-Za-z0-9_.:-]`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PaysyncError::invalid_input("nonce", "must not be empty"));
        }
        if s.len() > MAX_NONCE_LENGTH {
            return Err(PaysyncError::invalid_input(
                "nonce",
                format!("longer than {} characters", MAX_NONCE_LENGTH),
            ));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
        {
            return Err(PaysyncError::invalid_input(
                "nonce",
                "contains characters outside [A-Za-z0-9_.:-]",
            ));
        }
        Ok(Self(s.to_string()))
    }

    /// Wrap a value read back from storage.
    pub fn new_unchecked(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the nonce as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a finalized chain transaction.
///
/// Normalized to lowercase so that case variants of the same hash cannot
/// slip past the uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxDigest(String);

impl TxDigest {
    /// Parse and normalize a digest.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PaysyncError::invalid_input("tx digest", "must not be empty"));
        }
        if s.len() > MAX_TX_DIGEST_LENGTH {
            return Err(PaysyncError::invalid_input(
                "tx digest",
                format!("longer than {} characters", MAX_TX_DIGEST_LENGTH),
            ));
        }
        if !s.chars().all(|c| c.is_ascii_graphic()) {
            return Err(PaysyncError::invalid_input("tx digest", "must be printable ASCII"));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Wrap a value read back from storage.
    pub fn new_unchecked(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TxDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Status state machine
// =============================================================================

/// Lifecycle status of a pending payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Created, waiting for the client to sign and submit.
    Pending,
    /// Client attached a signed submission reference.
    Signed,
    /// Matched against a chain event and credited. Terminal.
    Verified,
    /// Expired or rejected. Terminal.
    Failed,
}

/// Who is requesting a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// An end-user request handler.
    Client,
    /// The chain transaction ingester.
    Ingester,
    /// The payment timeout sweep.
    Sweeper,
}

impl PaymentStatus {
    /// Stored string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Signed => "signed",
            Self::Verified => "verified",
            Self::Failed => "failed",
        }
    }

    /// Returns true for `pending` and `signed`.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Signed)
    }

    /// Returns true for `verified` and `failed`.
    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    /// Validate a transition requested by `actor`.
    ///
    /// Permitted:
    /// - `pending -> signed` by a client
    /// - `pending | signed -> verified` by the ingester
    /// - `pending | signed -> failed` by the ingester or the sweep
    ///
    /// A client asking for a terminal state is `Forbidden` regardless of the
    /// current state; the sweep asking for `verified` likewise. Every other
    /// disallowed pair is an `InvalidTransition`.
    pub fn transition(self, to: PaymentStatus, actor: Actor) -> Result<PaymentStatus> {
        let permitted_target = match actor {
            Actor::Client => matches!(to, Self::Signed | Self::Pending),
            Actor::Ingester => to.is_terminal(),
            Actor::Sweeper => to == Self::Failed,
        };
        if !permitted_target && (to.is_terminal() || actor != Actor::Client) {
            return Err(PaysyncError::Forbidden { from: self, to });
        }

        match (self, to) {
            (Self::Pending, Self::Signed) if actor == Actor::Client => Ok(to),
            (Self::Pending | Self::Signed, Self::Verified | Self::Failed) => Ok(to),
            _ => Err(PaysyncError::InvalidTransition { from: self, to }),
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = PaysyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "signed" => Ok(Self::Signed),
            "verified" => Ok(Self::Verified),
            "failed" => Ok(Self::Failed),
            other => Err(PaysyncError::invalid_input(
                "payment status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

// =============================================================================
// PendingPayment
// =============================================================================

/// A client-declared intent to pay, awaiting on-chain confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayment {
    /// Opaque unique identifier
    pub id: PaymentId,
    /// Paying wallet
    pub address: Address,
    /// Single-use nonce for this intent
    pub nonce: Nonce,
    /// Expected transfer amount in the smallest chain unit
    pub amount: Amount,
    /// Lifecycle status
    pub status: PaymentStatus,
    /// Digest of the matched chain transaction, set once on finalization
    pub tx_digest: Option<TxDigest>,
    /// Client-supplied submission reference, advisory only
    pub tx_digest_hint: Option<TxDigest>,
    /// Creation time (ms)
    pub created_at: Timestamp,
    /// Last status change (ms)
    pub updated_at: Timestamp,
}

impl PendingPayment {
    /// Returns true while the payment can still be matched.
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Returns true if the payment is older than `expiry_ms` at `now`.
    pub fn is_expired(&self, now: Timestamp, expiry_ms: u64) -> bool {
        now.saturating_sub(self.created_at) >= expiry_ms
    }
}
