//! Issue a payment nonce.

use crate::config::CliConfig;
use crate::context::{parse_address, AppContext};
use crate::error::CliResult;
use crate::output::{NonceOutput, OutputFormat, Render};

/// Execute the nonce command.
pub fn nonce(config: CliConfig, format: OutputFormat, address: &str) -> CliResult<String> {
    let ctx = AppContext::local(config)?;
    let address = parse_address(address)?;
    let nonce = ctx.service.issue_nonce(&address);

    let output = NonceOutput {
        address: address.to_string(),
        nonce: nonce.to_string(),
    };
    Ok(output.render(format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = CliConfig::default();
        config.storage.base_dir = temp_dir.path().to_path_buf();
        let address = &crate::commands::test_address(7);

        let first = nonce(config.clone(), OutputFormat::Json, address).unwrap();
        let second = nonce(config.clone(), OutputFormat::Json, address).unwrap();
        assert_ne!(first, second);
        assert!(first.contains(address));

        let err = nonce(config, OutputFormat::Json, "not-an-address").unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }
}
