//! Configuration for chain access.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use paysync_crypto::ScriptHash;

use crate::error::{ChainError, ChainResult};

/// Neo N3 JSON-RPC source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeoRpcConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,

    /// Payment contract script hash (`0x` big-endian form)
    pub payment_contract: String,

    /// Notification emitted by the payment contract on receipt
    pub event_name: String,

    /// First block to scan when a stream has no cursor yet
    pub start_height: u64,

    /// Blocks are read only once they have this many confirmations
    pub confirmations: u64,

    /// Upper bound on blocks scanned per fetch
    pub max_blocks_per_batch: u64,

    /// Per-request timeout
    #[serde(with = "millis")]
    pub request_timeout: Duration,
}

impl Default for NeoRpcConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:10332".to_string(),
            payment_contract: String::new(),
            event_name: "PaymentReceived".to_string(),
            start_height: 0,
            confirmations: 1,
            max_blocks_per_batch: 50,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl NeoRpcConfig {
    /// Set the RPC endpoint.
    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = url.into();
        self
    }

    /// Set the payment contract hash.
    pub fn with_payment_contract(mut self, hash: impl Into<String>) -> Self {
        self.payment_contract = hash.into();
        self
    }

    /// Set the first block to scan.
    pub fn with_start_height(mut self, height: u64) -> Self {
        self.start_height = height;
        self
    }

    /// Parse the payment contract hash.
    pub fn parse_contract(&self) -> ChainResult<ScriptHash> {
        ScriptHash::from_hex(&self.payment_contract).map_err(|e| {
            ChainError::config(format!(
                "invalid payment contract '{}': {}",
                self.payment_contract, e
            ))
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ChainResult<()> {
        if !(self.rpc_url.starts_with("http://") || self.rpc_url.starts_with("https://")) {
            return Err(ChainError::config(format!(
                "rpc_url must be an http(s) URL, got '{}'",
                self.rpc_url
            )));
        }
        self.parse_contract()?;
        if self.event_name.is_empty() {
            return Err(ChainError::config("event_name must not be empty"));
        }
        if self.max_blocks_per_batch == 0 {
            return Err(ChainError::config("max_blocks_per_batch must be positive"));
        }
        Ok(())
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per request
    pub max_attempts: u32,
    /// Base delay between retries
    #[serde(with = "millis")]
    pub base_delay: Duration,
    /// Maximum delay between retries
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Serde helper storing `Duration` as integer milliseconds.
pub mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: &str = "0xd2a4cff31913016155e38e474a2c06d08be276cf";

    #[test]
    fn test_defaults() {
        let config = NeoRpcConfig::default();
        assert_eq!(config.event_name, "PaymentReceived");
        assert_eq!(config.confirmations, 1);

        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_validate() {
        let config = NeoRpcConfig::default().with_payment_contract(CONTRACT);
        config.validate().unwrap();

        let bad_url = config.clone().with_rpc_url("localhost:10332");
        assert!(matches!(bad_url.validate(), Err(ChainError::Config(_))));

        let missing_contract = NeoRpcConfig::default();
        assert!(matches!(
            missing_contract.validate(),
            Err(ChainError::Config(_))
        ));
    }

    #[test]
    fn test_partial_toml() {
        let config: NeoRpcConfig = toml::from_str(
            r#"
            rpc_url = "https://testnet1.neo.coz.io:443"
            payment_contract = "0xd2a4cff31913016155e38e474a2c06d08be276cf"
            request_timeout = 2500
            "#,
        )
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.max_blocks_per_batch, 50);
        assert_eq!(config.parse_contract().unwrap().to_hex(), CONTRACT);

        let retry: RetryConfig = toml::from_str("max_delay = 1000").unwrap();
        assert_eq!(retry.max_delay, Duration::from_secs(1));
        assert_eq!(retry.max_attempts, 3);
    }
}
