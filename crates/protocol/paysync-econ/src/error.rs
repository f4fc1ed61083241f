//! Economic error types.

use paysync_types::ErrorCode;
use thiserror::Error;

/// Errors that can occur during points conversion.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EconError {
    /// Input is negative or the result does not fit in an `i64`
    #[error("invalid amount {value}: {reason}")]
    InvalidAmount {
        /// The submitted value
        value: i128,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Pricing table does not yield exact integer rates
    #[error("invalid pricing table: {0}")]
    InvalidPricing(String),
}

impl EconError {
    /// Create an invalid amount error.
    pub fn invalid_amount(value: impl Into<i128>, reason: &'static str) -> Self {
        Self::InvalidAmount {
            value: value.into(),
            reason,
        }
    }

    /// Create an invalid pricing error.
    pub fn invalid_pricing(msg: impl Into<String>) -> Self {
        Self::InvalidPricing(msg.into())
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidAmount { .. } => ErrorCode::InvalidAmount,
            Self::InvalidPricing(_) => ErrorCode::InvalidInput,
        }
    }
}

/// Result type alias for economic operations.
pub type EconResult<T> = std::result::Result<T, EconError>;
