//! CLI error types.

use paysync_types::ErrorCode;
use thiserror::Error;

/// CLI result type.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error enum wrapping all crate errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operations error.
    #[error("{0}")]
    Ops(#[from] paysync_ops::OpsError),

    /// Store error.
    #[error("{0}")]
    Store(#[from] paysync_store::StoreError),

    /// Chain source error.
    #[error("{0}")]
    Chain(#[from] paysync_chain::ChainError),

    /// Pricing error.
    #[error("{0}")]
    Econ(#[from] paysync_econ::EconError),

    /// Invalid argument (address, nonce, digest, id).
    #[error("{0}")]
    Input(#[from] paysync_types::PaysyncError),

    /// IO error.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// User-facing error with actionable message.
    #[error("{0}")]
    User(String),

    /// Config file already exists.
    #[error("Configuration already exists at {0}. Pass --force to overwrite.")]
    ConfigExists(String),
}

impl CliError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a user-facing error.
    pub fn user(msg: impl Into<String>) -> Self {
        Self::User(msg.into())
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Config errors: 3
            Self::Config(_) | Self::Toml(_) | Self::ConfigExists(_) => 3,
            // IO errors: 9
            Self::Io(_) => 9,
            // JSON/format errors: 10
            Self::Json(_) => 10,
            Self::User(_) => 1,
            _ => exit_code_for(self.error_code()),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Ops(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
            Self::Chain(e) => e.error_code(),
            Self::Econ(e) => e.error_code(),
            Self::Input(e) => e.error_code(),

            Self::Config(_) | Self::Toml(_) | Self::ConfigExists(_) | Self::User(_) => {
                ErrorCode::InvalidInput
            }
            Self::Io(_) | Self::Json(_) => ErrorCode::InternalError,
        }
    }
}

/// Exit code grouping for domain errors.
fn exit_code_for(code: ErrorCode) -> i32 {
    match code {
        // Not found: 2
        ErrorCode::PaymentNotFound => 2,
        // Chain unreachable: 5
        ErrorCode::ChainUnavailable => 5,
        // Internal/store: 6
        ErrorCode::InternalError => 6,
        c if c.is_validation_error() => 1,
        // Balance errors: 4
        c if c.is_balance_error() => 4,
        // Payment errors: 7
        c if c.is_payment_error() => 7,
        // Cursor halted or stream locked: 8
        c if c.is_sync_error() => 8,
        _ => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paysync_store::StoreError;

    #[test]
    fn test_exit_codes_by_class() {
        assert_eq!(CliError::config("bad").exit_code(), 3);
        assert_eq!(CliError::user("nope").exit_code(), 1);

        let not_found = CliError::from(paysync_ops::OpsError::payment_not_found("p1"));
        assert_eq!(not_found.exit_code(), 2);

        let broke = CliError::from(StoreError::InsufficientBalance {
            available: 1,
            requested: 2,
        });
        assert_eq!(broke.exit_code(), 4);
        assert_eq!(broke.error_code(), ErrorCode::InsufficientBalance);

        let chain = CliError::from(paysync_chain::ChainError::network("refused"));
        assert_eq!(chain.exit_code(), 5);

        let mismatch = CliError::from(paysync_ops::OpsError::AmountMismatch {
            expected: 10,
            actual: 5,
        });
        assert_eq!(mismatch.exit_code(), 7);
    }

    #[test]
    fn test_input_errors_are_validation() {
        let err = CliError::from(paysync_types::Address::parse("not-an-address").unwrap_err());
        assert_eq!(err.exit_code(), 1);
    }
}
