//! One timeout sweep pass.

use crate::config::CliConfig;
use crate::context::AppContext;
use crate::error::CliResult;
use crate::output::{OutputFormat, Render, SweepOutput};

/// Execute the sweep command.
pub fn sweep(config: CliConfig, format: OutputFormat) -> CliResult<String> {
    let ctx = AppContext::local(config)?;
    let report = ctx.sweep().sweep_once()?;
    let output = SweepOutput {
        expired: report.expired,
    };
    Ok(output.render(format))
}
