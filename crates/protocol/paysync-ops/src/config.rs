//! Configuration types for the operations layer.
//!
//! This module defines the ingestion loop and timeout sweep settings.

use std::time::Duration;

use paysync_chain::config::millis;
use paysync_types::{
    StreamId, DEFAULT_BATCH_SIZE, DEFAULT_CURSOR_ERROR_THRESHOLD, DEFAULT_LEASE_TTL_MS,
    DEFAULT_PAYMENT_EXPIRY_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_STREAM_ID,
    DEFAULT_SWEEP_INTERVAL_MS,
};
use serde::{Deserialize, Serialize};

use crate::error::{OpsError, OpsResult};

/// Configuration for the ingestion loop and the timeout sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Stream this runner ingests.
    pub stream_id: StreamId,
    /// Maximum events requested per batch.
    pub batch_size: u32,
    /// Wait between polls once the stream is caught up.
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Consecutive errors after which the cursor enters `error`.
    pub cursor_error_threshold: u32,
    /// Lifetime of the single-runner lease; renewed every iteration.
    #[serde(with = "millis")]
    pub lease_ttl: Duration,
    /// Age after which an unmatched payment is failed.
    #[serde(with = "millis")]
    pub payment_expiry: Duration,
    /// Wait between timeout sweeps.
    #[serde(with = "millis")]
    pub sweep_interval: Duration,
    /// Payments expired per sweep query.
    pub sweep_batch_limit: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            stream_id: StreamId::new_unchecked(DEFAULT_STREAM_ID),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            cursor_error_threshold: DEFAULT_CURSOR_ERROR_THRESHOLD,
            lease_ttl: Duration::from_millis(DEFAULT_LEASE_TTL_MS),
            payment_expiry: Duration::from_millis(DEFAULT_PAYMENT_EXPIRY_MS),
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
            sweep_batch_limit: 100,
        }
    }
}

impl IngestConfig {
    /// Set the stream to ingest.
    pub fn with_stream(mut self, stream_id: StreamId) -> Self {
        self.stream_id = stream_id;
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the payment expiry age.
    pub fn with_payment_expiry(mut self, expiry: Duration) -> Self {
        self.payment_expiry = expiry;
        self
    }

    /// Set the lease time-to-live.
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// Lease TTL in milliseconds, as stored.
    pub fn lease_ttl_ms(&self) -> u64 {
        self.lease_ttl.as_millis() as u64
    }

    /// Payment expiry in milliseconds, as compared against timestamps.
    pub fn payment_expiry_ms(&self) -> u64 {
        self.payment_expiry.as_millis() as u64
    }

    /// Validate the configuration.
    pub fn validate(&self) -> OpsResult<()> {
        StreamId::parse(self.stream_id.as_str())?;
        if self.batch_size == 0 {
            return Err(OpsError::invalid_config("batch_size must be positive"));
        }
        if self.cursor_error_threshold == 0 {
            return Err(OpsError::invalid_config(
                "cursor_error_threshold must be positive",
            ));
        }
        if self.lease_ttl <= self.poll_interval {
            return Err(OpsError::invalid_config(
                "lease_ttl must exceed poll_interval or the lease lapses between polls",
            ));
        }
        if self.payment_expiry.is_zero() {
            return Err(OpsError::invalid_config("payment_expiry must be positive"));
        }
        if self.sweep_batch_limit == 0 {
            return Err(OpsError::invalid_config("sweep_batch_limit must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = IngestConfig::default();
        config.validate().unwrap();
        assert_eq!(config.stream_id.as_str(), "balance_sync");
        assert_eq!(config.lease_ttl_ms(), 60_000);
        assert_eq!(config.payment_expiry_ms(), 3_600_000);
    }

    #[test]
    fn test_validate_rejects() {
        let zero_batch = IngestConfig::default().with_batch_size(0);
        assert!(matches!(zero_batch.validate(), Err(OpsError::InvalidConfig(_))));

        let short_lease = IngestConfig::default()
            .with_poll_interval(Duration::from_secs(30))
            .with_lease_ttl(Duration::from_secs(10));
        assert!(short_lease.validate().is_err());

        let bad_stream = IngestConfig::default().with_stream(StreamId::new_unchecked("Bad Id"));
        assert!(matches!(bad_stream.validate(), Err(OpsError::Types(_))));
    }

    #[test]
    fn test_partial_toml() {
        let config: IngestConfig = toml::from_str(
            r#"
            stream_id = "gas_payments"
            poll_interval = 5000
            payment_expiry = 900000
            "#,
        )
        .unwrap();
        assert_eq!(config.stream_id.as_str(), "gas_payments");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.payment_expiry, Duration::from_secs(900));
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    }
}
