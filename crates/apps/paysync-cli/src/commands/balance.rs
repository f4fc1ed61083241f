//! Show a points balance.

use crate::config::CliConfig;
use crate::context::{parse_address, AppContext};
use crate::error::CliResult;
use crate::output::{BalanceOutput, OutputFormat, Render};

/// Execute the balance command.
///
/// An address seen for the first time gets a zero-balance account.
pub fn balance(config: CliConfig, format: OutputFormat, address: &str) -> CliResult<String> {
    let ctx = AppContext::local(config)?;
    let address = parse_address(address)?;
    let balance = ctx.service.get_balance(&address)?;
    Ok(BalanceOutput { address, balance }.render(format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_address;
    use tempfile::TempDir;

    #[test]
    fn test_new_address_has_zero_balance() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = CliConfig::default();
        config.storage.base_dir = temp_dir.path().to_path_buf();

        let output = balance(config, OutputFormat::Json, &test_address(9)).unwrap();
        assert!(output.contains("\"balance\": 0"));
    }
}
