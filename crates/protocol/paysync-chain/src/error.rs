//! Error types for chain access.

use paysync_types::ErrorCode;
use thiserror::Error;

/// Result type alias for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Errors that can occur while reading the chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Network error (retryable).
    #[error("network error: {0}")]
    Network(String),

    /// Timeout error (retryable).
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message from the node
        message: String,
    },

    /// The node answered with something we cannot decode.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error (lock poisoning, unexpected state).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChainError {
    /// Create a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an RPC error.
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Create an invalid response error.
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Rpc { .. } | Self::InvalidResponse(_) => {
                ErrorCode::ChainUnavailable
            }
            Self::Config(_) => ErrorCode::InvalidInput,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(e.to_string())
        } else if e.is_decode() {
            Self::invalid_response(e.to_string())
        } else {
            Self::network(e.to_string())
        }
    }
}
