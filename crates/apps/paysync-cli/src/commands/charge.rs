//! Debit AI usage.

use crate::config::CliConfig;
use crate::context::{parse_address, AppContext};
use crate::error::CliResult;
use crate::output::{ChargeOutput, OutputFormat, Render};

/// Execute the charge command.
pub fn charge(
    config: CliConfig,
    format: OutputFormat,
    address: &str,
    input_tokens: i64,
    output_tokens: i64,
) -> CliResult<String> {
    let ctx = AppContext::local(config)?;
    let address = parse_address(address)?;
    let receipt = ctx
        .service
        .charge_usage(&address, input_tokens, output_tokens)?;
    Ok(ChargeOutput { receipt }.render(format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_address;
    use paysync_ops::current_timestamp;
    use paysync_store::BalanceStore;
    use paysync_types::Address;
    use tempfile::TempDir;

    fn setup_config(temp_dir: &TempDir) -> CliConfig {
        let mut config = CliConfig::default();
        config.storage.base_dir = temp_dir.path().to_path_buf();
        config
    }

    #[test]
    fn test_charge_debits_balance() {
        let temp_dir = TempDir::new().unwrap();
        let config = setup_config(&temp_dir);
        let address = test_address(10);

        let ctx = AppContext::local(config.clone()).unwrap();
        ctx.state
            .ledger
            .credit_or_debit(&Address::parse(&address).unwrap(), 10_000, "top up", current_timestamp())
            .unwrap();

        let output = charge(config, OutputFormat::Json, &address, 1, 0).unwrap();
        assert!(output.contains("\"totalPoints\": 3450"));
        assert!(output.contains("\"newBalance\": 6550"));
    }

    #[test]
    fn test_charge_without_funds() {
        let temp_dir = TempDir::new().unwrap();
        let config = setup_config(&temp_dir);

        let err = charge(config.clone(), OutputFormat::Json, &test_address(11), 0, 1).unwrap_err();
        assert_eq!(err.exit_code(), 4);

        let err = charge(config, OutputFormat::Json, &test_address(11), -1, 0).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }
}
