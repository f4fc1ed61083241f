//! Show transaction history.

use crate::config::CliConfig;
use crate::context::{parse_address, AppContext};
use crate::error::CliResult;
use crate::output::{HistoryOutput, OutputFormat, Render};

/// Execute the history command.
pub fn history(
    config: CliConfig,
    format: OutputFormat,
    address: &str,
    page: Option<u32>,
    page_size: Option<u32>,
) -> CliResult<String> {
    let ctx = AppContext::local(config)?;
    let address = parse_address(address)?;
    let page = ctx.service.get_transactions(&address, page, page_size)?;
    Ok(HistoryOutput { page }.render(format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_address;
    use paysync_ops::current_timestamp;
    use paysync_store::BalanceStore;
    use paysync_types::Address;
    use tempfile::TempDir;

    #[test]
    fn test_history_pages_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = CliConfig::default();
        config.storage.base_dir = temp_dir.path().to_path_buf();
        let address = test_address(8);

        let ctx = AppContext::local(config.clone()).unwrap();
        let parsed = Address::parse(&address).unwrap();
        for i in 1..=3 {
            ctx.state
                .ledger
                .credit_or_debit(&parsed, 10_000 * i, &format!("credit {}", i), current_timestamp() + i as u64)
                .unwrap();
        }

        let first = history(config.clone(), OutputFormat::Human, &address, Some(1), Some(2)).unwrap();
        assert!(first.contains("credit 3"));
        assert!(!first.contains("credit 1"));
        assert!(first.contains("Page 1 of 2"));

        let second = history(config, OutputFormat::Json, &address, Some(2), Some(2)).unwrap();
        assert!(second.contains("credit 1"));
    }
}
