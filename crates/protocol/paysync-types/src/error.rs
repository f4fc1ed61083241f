//! Error types for paysync.
//!
//! This module defines the error codes returned to callers of the request
//! surface and the validation error used by the types in this crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::payment::PaymentStatus;

/// Structured error codes.
///
/// Every crate error maps to one of these so that callers receive a stable,
/// machine-readable failure kind alongside the human message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
#[non_exhaustive]
pub enum ErrorCode {
    // =========================================================================
    // Validation Errors (0x0001 - 0x00FF)
    // =========================================================================
    /// Amount is zero, negative, or overflows
    InvalidAmount = 0x0001,
    /// Address is not a valid Neo N3 address
    InvalidAddress = 0x0002,
    /// Malformed request field (nonce, digest, page, cursor token)
    InvalidInput = 0x0003,

    // =========================================================================
    // Payment Errors (0x0100 - 0x01FF)
    // =========================================================================
    /// Nonce is already used by this address, or another payment is open
    DuplicateNonce = 0x0100,
    /// Status transition not permitted from the current state
    InvalidTransition = 0x0101,
    /// Caller is not permitted to perform this transition
    Forbidden = 0x0102,
    /// Chain amount disagrees with the pending payment
    AmountMismatch = 0x0103,
    /// Chain digest already consumed by another payment
    DuplicateTxDigest = 0x0104,
    /// Chain event nonce disagrees with the pending payment
    NonceMismatch = 0x0105,
    /// Pending payment does not exist
    PaymentNotFound = 0x0106,

    // =========================================================================
    // Balance Errors (0x0200 - 0x02FF)
    // =========================================================================
    /// Debit exceeds the available balance
    InsufficientBalance = 0x0200,

    // =========================================================================
    // Sync Errors (0x0300 - 0x03FF)
    // =========================================================================
    /// Chain could not be reached (transient)
    ChainUnavailable = 0x0300,
    /// Cursor exceeded its error threshold and needs a manual resume
    CursorStalled = 0x0301,
    /// Cursor was paused by an operator
    CursorPaused = 0x0302,
    /// Another runner holds the stream lease
    StreamLocked = 0x0303,

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (storage, serialization, lock poisoning)
    InternalError = 0xFFFF,
}

impl ErrorCode {
    /// Returns true if this is a validation error (0x0001-0x00FF)
    pub fn is_validation_error(&self) -> bool {
        let code = *self as u16;
        (0x0001..=0x00FF).contains(&code)
    }

    /// Returns true if this is a payment error (0x0100-0x01FF)
    pub fn is_payment_error(&self) -> bool {
        let code = *self as u16;
        (0x0100..=0x01FF).contains(&code)
    }

    /// Returns true if this is a balance error (0x0200-0x02FF)
    pub fn is_balance_error(&self) -> bool {
        let code = *self as u16;
        (0x0200..=0x02FF).contains(&code)
    }

    /// Returns true if this is a sync error (0x0300-0x03FF)
    pub fn is_sync_error(&self) -> bool {
        let code = *self as u16;
        (0x0300..=0x03FF).contains(&code)
    }

    /// Get the numeric code value
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Get a recovery hint for this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::InvalidAmount => Some("Amounts must be positive integers in the smallest unit."),
            Self::InvalidAddress => Some("Use a Neo N3 address (starts with 'N')."),
            Self::InvalidInput => Some("Check the request fields and try again."),

            Self::DuplicateNonce => Some("Finish or wait out the open payment, then request a fresh nonce with 'paysync nonce'."),
            Self::InvalidTransition => Some("Check the payment status with 'paysync payment show'."),
            Self::Forbidden => Some("Payments are finalized only by chain confirmation."),
            Self::AmountMismatch => Some("The transferred amount must equal the pending payment amount exactly."),
            Self::DuplicateTxDigest => Some("This transaction was already credited to a payment."),
            Self::NonceMismatch => Some("The transfer data must carry the payment nonce."),
            Self::PaymentNotFound => Some("Verify the payment id. Use 'paysync payment show' to list the open payment."),

            Self::InsufficientBalance => Some("Top up the balance with a new payment."),

            Self::ChainUnavailable => Some("Check the RPC endpoint in config.toml. The ingester retries automatically."),
            Self::CursorStalled => Some("Inspect the RPC errors, then run 'paysync cursor resume'."),
            Self::CursorPaused => Some("Run 'paysync cursor resume' to continue ingestion."),
            Self::StreamLocked => Some("Another runner holds this stream. Stop it or wait for its lease to expire."),

            Self::InternalError => Some("An internal error occurred. Please report this issue."),
        }
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        if self.is_validation_error() {
            "Validation"
        } else if self.is_payment_error() {
            "Payment"
        } else if self.is_balance_error() {
            "Balance"
        } else if self.is_sync_error() {
            "Sync"
        } else {
            "Internal"
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::InvalidAmount => write!(f, "INVALID_AMOUNT"),
            ErrorCode::InvalidAddress => write!(f, "INVALID_ADDRESS"),
            ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
            ErrorCode::DuplicateNonce => write!(f, "DUPLICATE_NONCE"),
            ErrorCode::InvalidTransition => write!(f, "INVALID_TRANSITION"),
            ErrorCode::Forbidden => write!(f, "FORBIDDEN"),
            ErrorCode::AmountMismatch => write!(f, "AMOUNT_MISMATCH"),
            ErrorCode::DuplicateTxDigest => write!(f, "DUPLICATE_TX_DIGEST"),
            ErrorCode::NonceMismatch => write!(f, "NONCE_MISMATCH"),
            ErrorCode::PaymentNotFound => write!(f, "PAYMENT_NOT_FOUND"),
            ErrorCode::InsufficientBalance => write!(f, "INSUFFICIENT_BALANCE"),
            ErrorCode::ChainUnavailable => write!(f, "CHAIN_UNAVAILABLE"),
            ErrorCode::CursorStalled => write!(f, "CURSOR_STALLED"),
            ErrorCode::CursorPaused => write!(f, "CURSOR_PAUSED"),
            ErrorCode::StreamLocked => write!(f, "STREAM_LOCKED"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// Validation and state-machine errors raised by the types in this crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PaysyncError {
    /// Status transition not permitted from the current state.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: PaymentStatus,
        /// Requested status
        to: PaymentStatus,
    },

    /// Actor may not perform this transition.
    #[error("transition from {from} to {to} is reserved for chain reconciliation")]
    Forbidden {
        /// Current status
        from: PaymentStatus,
        /// Requested status
        to: PaymentStatus,
    },

    /// Malformed address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Malformed field value.
    #[error("invalid {field}: {reason}")]
    InvalidInput {
        /// Field name
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },
}

impl PaysyncError {
    /// Create an invalid input error.
    pub fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::InvalidAddress(_) => ErrorCode::InvalidAddress,
            Self::InvalidInput { .. } => ErrorCode::InvalidInput,
        }
    }
}

/// Result type alias for type-level validation.
pub type Result<T> = std::result::Result<T, PaysyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::InvalidAmount as u16, 0x0001);
        assert_eq!(ErrorCode::DuplicateNonce as u16, 0x0100);
        assert_eq!(ErrorCode::DuplicateTxDigest as u16, 0x0104);
        assert_eq!(ErrorCode::InsufficientBalance as u16, 0x0200);
        assert_eq!(ErrorCode::ChainUnavailable as u16, 0x0300);
        assert_eq!(ErrorCode::CursorStalled as u16, 0x0301);
        assert_eq!(ErrorCode::InternalError as u16, 0xFFFF);
    }

    #[test]
    fn test_error_code_categories() {
        assert!(ErrorCode::InvalidAmount.is_validation_error());
        assert!(ErrorCode::Forbidden.is_payment_error());
        assert!(!ErrorCode::Forbidden.is_validation_error());
        assert!(ErrorCode::InsufficientBalance.is_balance_error());
        assert!(ErrorCode::CursorStalled.is_sync_error());

        assert_eq!(ErrorCode::AmountMismatch.category(), "Payment");
        assert_eq!(ErrorCode::StreamLocked.category(), "Sync");
        assert_eq!(ErrorCode::InternalError.category(), "Internal");
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::DuplicateTxDigest.to_string(), "DUPLICATE_TX_DIGEST");
        assert_eq!(ErrorCode::CursorStalled.to_string(), "CURSOR_STALLED");
    }

    #[test]
    fn test_every_code_has_suggestion() {
        let codes = [
            ErrorCode::InvalidAmount,
            ErrorCode::InvalidAddress,
            ErrorCode::InvalidInput,
            ErrorCode::DuplicateNonce,
            ErrorCode::InvalidTransition,
            ErrorCode::Forbidden,
            ErrorCode::AmountMismatch,
            ErrorCode::DuplicateTxDigest,
            ErrorCode::NonceMismatch,
            ErrorCode::PaymentNotFound,
            ErrorCode::InsufficientBalance,
            ErrorCode::ChainUnavailable,
            ErrorCode::CursorStalled,
            ErrorCode::CursorPaused,
            ErrorCode::StreamLocked,
            ErrorCode::InternalError,
        ];
        for code in codes {
            assert!(code.suggestion().is_some(), "{} has no suggestion", code);
        }
    }

    #[test]
    fn test_paysync_error_codes() {
        let err = PaysyncError::Forbidden {
            from: PaymentStatus::Pending,
            to: PaymentStatus::Verified,
        };
        assert_eq!(err.error_code(), ErrorCode::Forbidden);
        assert!(err.to_string().contains("pending"));

        let err = PaysyncError::invalid_input("nonce", "empty");
        assert_eq!(err.error_code(), ErrorCode::InvalidInput);
        assert_eq!(err.to_string(), "invalid nonce: empty");
    }
}
