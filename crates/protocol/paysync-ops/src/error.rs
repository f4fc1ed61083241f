//! Error types for the operations layer.
//!
//! This module defines the `OpsError` enum used by the ingester, the sweep
//! and the request surface.

use paysync_chain::ChainError;
use paysync_econ::EconError;
use paysync_store::StoreError;
use paysync_types::{Address, Amount, ErrorCode, PaysyncError};
use thiserror::Error;

/// Result type for operations.
pub type OpsResult<T> = std::result::Result<T, OpsError>;

/// Errors that can occur during reconciliation operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OpsError {
    // =========================================================================
    // Payment Errors
    // =========================================================================
    /// Payment does not exist or belongs to another address.
    #[error("payment not found: {0}")]
    PaymentNotFound(String),

    /// Chain amount differs from the pending payment amount.
    #[error("amount mismatch: payment expects {expected}, transaction carries {actual}")]
    AmountMismatch {
        /// Amount of the pending payment
        expected: Amount,
        /// Amount observed on chain
        actual: Amount,
    },

    /// Chain nonce differs from the pending payment nonce.
    #[error("nonce mismatch: payment expects {expected}, transaction carries {actual}")]
    NonceMismatch {
        /// Nonce of the pending payment
        expected: String,
        /// Nonce observed on chain
        actual: String,
    },

    /// Transaction was sent from a different address.
    #[error("transaction sender {actual} is not the payment owner {expected}")]
    SenderMismatch {
        /// Owner of the pending payment
        expected: Address,
        /// Sender observed on chain
        actual: Address,
    },

    /// Configuration rejected before starting a task.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// Storage error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Economics error.
    #[error("econ error: {0}")]
    Econ(#[from] EconError),

    /// Chain access error.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// Validation or state-machine error.
    #[error(transparent)]
    Types(#[from] PaysyncError),
}

impl OpsError {
    /// Create a payment not found error.
    pub fn payment_not_found(id: impl Into<String>) -> Self {
        OpsError::PaymentNotFound(id.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        OpsError::InvalidConfig(msg.into())
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::PaymentNotFound(_) => ErrorCode::PaymentNotFound,
            Self::AmountMismatch { .. } => ErrorCode::AmountMismatch,
            Self::NonceMismatch { .. } => ErrorCode::NonceMismatch,
            Self::SenderMismatch { .. } => ErrorCode::InvalidInput,
            Self::InvalidConfig(_) => ErrorCode::InvalidInput,

            // Wrapped errors - delegate to inner type
            Self::Store(e) => e.error_code(),
            Self::Econ(e) => e.error_code(),
            Self::Chain(e) => e.error_code(),
            Self::Types(e) => e.error_code(),
        }
    }

    /// Get a recovery hint for this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        self.error_code().suggestion()
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Chain(e) => e.is_retryable(),
            Self::Store(e) => e.is_busy(),
            _ => false,
        }
    }

    /// Whether the error means the cursor is halted rather than failing.
    pub fn is_cursor_halted(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::CursorStalled(_)) | Self::Store(StoreError::CursorPaused(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paysync_types::PaymentStatus;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            OpsError::AmountMismatch {
                expected: 1000,
                actual: 500
            }
            .error_code(),
            ErrorCode::AmountMismatch
        );
        assert_eq!(
            OpsError::payment_not_found("p1").error_code(),
            ErrorCode::PaymentNotFound
        );
        assert_eq!(
            OpsError::from(StoreError::DuplicateTxDigest("0xabc".into())).error_code(),
            ErrorCode::DuplicateTxDigest
        );
        assert_eq!(
            OpsError::from(ChainError::timeout("slow")).error_code(),
            ErrorCode::ChainUnavailable
        );
        assert_eq!(
            OpsError::from(PaysyncError::Forbidden {
                from: PaymentStatus::Pending,
                to: PaymentStatus::Verified,
            })
            .error_code(),
            ErrorCode::Forbidden
        );
    }

    #[test]
    fn test_retryable_and_halted() {
        assert!(OpsError::from(ChainError::network("refused")).is_retryable());
        assert!(!OpsError::from(ChainError::rpc(-32601, "method not found")).is_retryable());
        assert!(!OpsError::payment_not_found("p1").is_retryable());

        assert!(OpsError::from(StoreError::CursorStalled("s".into())).is_cursor_halted());
        assert!(OpsError::from(StoreError::CursorPaused("s".into())).is_cursor_halted());
        assert!(!OpsError::from(ChainError::network("refused")).is_cursor_halted());
    }

    #[test]
    fn test_suggestion_present() {
        let err = OpsError::NonceMismatch {
            expected: "a".into(),
            actual: "b".into(),
        };
        assert!(err.suggestion().is_some());
        assert!(err.to_string().contains("nonce mismatch"));
    }
}
