//! Initialize configuration and storage.

use std::path::Path;

use paysync_store::PaysyncState;
use tracing::info;

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::{InitOutput, OutputFormat, Render};

/// Execute the init command.
///
/// Writes `config` to `config_path` and creates the database with its
/// schema. An existing configuration is kept unless `force` is set.
pub fn init(
    config: CliConfig,
    config_path: &Path,
    format: OutputFormat,
    force: bool,
) -> CliResult<String> {
    if config_path.exists() && !force {
        return Err(CliError::ConfigExists(config_path.display().to_string()));
    }

    config.save(config_path)?;
    let state_config = config.state_config();
    let database_path = state_config.database_path();
    PaysyncState::open(state_config)?;
    info!(config = %config_path.display(), database = %database_path.display(), "Initialized");

    let output = InitOutput {
        config_path: config_path.display().to_string(),
        database_path: database_path.display().to_string(),
    };
    Ok(output.render(format))
}
