//! CLI configuration.
//!
//! One TOML file holds every section the library crates take as typed
//! config. Missing sections and fields fall back to their defaults.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use paysync_chain::{NeoRpcConfig, RetryConfig};
use paysync_econ::PricingTable;
use paysync_ops::IngestConfig;
use paysync_store::StateConfig;

use crate::error::{CliError, CliResult};

/// Expand environment variables in a string.
/// Supports `${VAR_NAME}` syntax; unset variables are left as written.
fn expand_env_vars(input: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN
        .get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static pattern"));
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .to_string()
}

/// CLI configuration loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Neo N3 RPC source.
    pub chain: NeoRpcConfig,
    /// Per-request retry policy for the RPC source.
    pub retry: RetryConfig,
    /// Ingestion loop and timeout sweep.
    pub ingest: IngestConfig,
    /// Points pricing.
    pub pricing: PricingTable,
    /// Prometheus endpoint.
    pub metrics: MetricsConfig,
}

impl CliConfig {
    /// Load configuration from a file.
    ///
    /// A missing file yields the defaults. `${VAR}` references in the RPC
    /// URL and payment contract are expanded.
    pub fn load(path: &Path) -> CliResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> CliResult<Self> {
        let mut config: Self = toml::from_str(contents)?;
        config.chain.rpc_url = expand_env_vars(&config.chain.rpc_url);
        config.chain.payment_contract = expand_env_vars(&config.chain.payment_contract);
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> CliResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| CliError::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Storage configuration for opening state.
    pub fn state_config(&self) -> StateConfig {
        let config = StateConfig::new(&self.storage.base_dir)
            .with_cursor_error_threshold(self.ingest.cursor_error_threshold);
        match &self.storage.database {
            Some(path) => config.with_database_path(path),
            None => config,
        }
    }

    /// Whether a payment contract is configured.
    pub fn has_chain(&self) -> bool {
        !self.chain.payment_contract.trim().is_empty()
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for service data.
    pub base_dir: PathBuf,
    /// SQLite database path (default: `<base_dir>/paysync.db`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            database: None,
        }
    }
}

/// Prometheus endpoint configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve `/metrics` while `run` is active.
    pub enabled: bool,
    /// Listen port.
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9464,
        }
    }
}

/// Get the default base directory.
pub fn default_base_dir() -> PathBuf {
    paysync_store::default_data_dir()
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    default_base_dir().join("config.toml")
}

/// Format a millisecond timestamp for display.
pub fn format_timestamp(ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert!(!config.metrics.enabled);
        assert_eq!(config.chain.event_name, "PaymentReceived");
        assert_eq!(config.pricing.margin_percent, 15);
        assert!(!config.has_chain());
    }

    #[test]
    fn test_partial_sections() {
        let config = CliConfig::parse(
            r#"
            [storage]
            base_dir = "/var/lib/paysync"

            [chain]
            payment_contract = "0xd2a4cff31913016155e38e474a2c06d08be276cf"
            confirmations = 3

            [ingest]
            batch_size = 25
            poll_interval = 2000

            [metrics]
            enabled = true
            "#,
        )
        .unwrap();

        assert!(config.has_chain());
        assert_eq!(config.chain.confirmations, 3);
        assert_eq!(config.chain.max_blocks_per_batch, 50);
        assert_eq!(config.ingest.batch_size, 25);
        assert_eq!(config.ingest.poll_interval, Duration::from_secs(2));
        assert_eq!(config.metrics.port, 9464);
        assert_eq!(
            config.state_config().database_path(),
            PathBuf::from("/var/lib/paysync/paysync.db")
        );
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut config = CliConfig::default();
        config.storage.base_dir = temp_dir.path().to_path_buf();
        config.ingest.batch_size = 7;
        config.save(&config_path).unwrap();

        let loaded = CliConfig::load(&config_path).unwrap();
        assert_eq!(loaded.ingest, config.ingest);
        assert_eq!(loaded.pricing, config.pricing);
        assert_eq!(loaded.storage.base_dir, config.storage.base_dir);
    }

    #[test]
    fn test_config_load_nonexistent_returns_default() {
        let path = Path::new("/tmp/paysync_nonexistent_12345/config.toml");
        let config = CliConfig::load(path).unwrap();
        assert_eq!(config.ingest, IngestConfig::default());
    }

    #[test]
    fn test_rpc_url_env_expansion() {
        std::env::set_var("PAYSYNC_TEST_RPC_HOST", "rpc.example.org");
        let config = CliConfig::parse(
            r#"
            [chain]
            rpc_url = "https://${PAYSYNC_TEST_RPC_HOST}:443"
            "#,
        )
        .unwrap();
        assert_eq!(config.chain.rpc_url, "https://rpc.example.org:443");
        std::env::remove_var("PAYSYNC_TEST_RPC_HOST");

        assert_eq!(
            expand_env_vars("${PAYSYNC_UNSET_VAR_12345}"),
            "${PAYSYNC_UNSET_VAR_12345}"
        );
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_timestamp(1_700_000_000_000), "2023-11-14 22:13:20 UTC");
    }
}
