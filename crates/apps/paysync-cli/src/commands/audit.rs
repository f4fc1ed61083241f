//! Balance audit.

use crate::config::CliConfig;
use crate::context::AppContext;
use crate::error::CliResult;
use crate::output::{AuditOutput, OutputFormat, Render};

/// Execute the audit command.
pub fn audit(config: CliConfig, format: OutputFormat) -> CliResult<String> {
    let ctx = AppContext::local(config)?;
    let discrepancies = ctx.service.audit()?;
    Ok(AuditOutput { discrepancies }.render(format))
}
