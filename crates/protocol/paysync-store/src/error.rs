//! Error types for the storage layer.
//!
//! Unique-index violations raised by SQLite are translated into the domain
//! errors callers can act on (`DuplicateNonce`, `DuplicateTxDigest`); see
//! [`StoreError::from_unique_violation`].

use paysync_types::{ErrorCode, PaysyncError, Points, Timestamp};
use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error while preparing the data directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// State machine or validation error from the shared types.
    #[error(transparent)]
    Types(#[from] PaysyncError),

    /// Nonce already used by the address, or another payment is still open.
    #[error("Duplicate nonce: {0}")]
    DuplicateNonce(String),

    /// Chain digest already stamped on another payment.
    #[error("Transaction digest already consumed: {0}")]
    DuplicateTxDigest(String),

    /// Pending payment not found.
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// Zero amount, or an amount that does not fit the column.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Debit would take the balance below zero.
    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: Points, requested: Points },

    /// Cursor is in `error` status.
    #[error("Cursor stalled: {0}")]
    CursorStalled(String),

    /// Cursor is in `paused` status.
    #[error("Cursor paused: {0}")]
    CursorPaused(String),

    /// Stream lease held by another runner.
    #[error("Stream {stream} locked by {holder} until {expires_at}")]
    StreamLocked {
        stream: String,
        holder: String,
        expires_at: Timestamp,
    },

    /// Schema initialization error.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Stored row could not be decoded.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Lock poisoning error.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    /// Create a payment not found error.
    pub fn payment_not_found(id: impl Into<String>) -> Self {
        StoreError::PaymentNotFound(id.into())
    }

    /// Create an invalid amount error.
    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        StoreError::InvalidAmount(msg.into())
    }

    /// Create a schema error.
    pub fn schema(msg: impl Into<String>) -> Self {
        StoreError::Schema(msg.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        StoreError::InvalidData(msg.into())
    }

    /// Create a lock poisoned error.
    pub fn lock_poisoned(msg: impl Into<String>) -> Self {
        StoreError::LockPoisoned(msg.into())
    }

    /// Translate a unique-index violation on `pending_payments`.
    ///
    /// SQLite reports the violated index by its column list:
    /// `pending_payments.tx_digest` for the digest index, and
    /// `pending_payments.address[, pending_payments.nonce]` for the nonce
    /// retirement constraint and the one-open-payment-per-address index.
    /// Any other error is returned unchanged.
    pub fn from_unique_violation(err: rusqlite::Error, context: &str) -> Self {
        if let rusqlite::Error::SqliteFailure(ref e, Some(ref msg)) = err {
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
                if msg.contains("pending_payments.tx_digest") {
                    return StoreError::DuplicateTxDigest(context.to_string());
                }
                if msg.contains("pending_payments.nonce") {
                    return StoreError::DuplicateNonce(format!("{} (nonce already used)", context));
                }
                if msg.contains("pending_payments.address") {
                    return StoreError::DuplicateNonce(format!(
                        "{} (another payment is open)",
                        context
                    ));
                }
            }
        }
        StoreError::Database(err)
    }

    /// Whether the error is a transient SQLite lock contention.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _))
                if matches!(e.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
        )
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            StoreError::Types(e) => e.error_code(),
            StoreError::DuplicateNonce(_) => ErrorCode::DuplicateNonce,
            StoreError::DuplicateTxDigest(_) => ErrorCode::DuplicateTxDigest,
            StoreError::PaymentNotFound(_) => ErrorCode::PaymentNotFound,
            StoreError::InvalidAmount(_) => ErrorCode::InvalidAmount,
            StoreError::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
            StoreError::CursorStalled(_) => ErrorCode::CursorStalled,
            StoreError::CursorPaused(_) => ErrorCode::CursorPaused,
            StoreError::StreamLocked { .. } => ErrorCode::StreamLocked,
            StoreError::Io(_)
            | StoreError::Database(_)
            | StoreError::Serialization(_)
            | StoreError::Schema(_)
            | StoreError::InvalidData(_)
            | StoreError::LockPoisoned(_) => ErrorCode::InternalError,
        }
    }
}
