//! Sync cursor inspection and control.

use paysync_store::CursorStore;
use tracing::info;

use crate::config::CliConfig;
use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::{CursorListOutput, CursorOutput, OutputFormat, Render};

/// Show one stream's cursor.
pub fn cursor_show(
    config: CliConfig,
    format: OutputFormat,
    stream: Option<&str>,
) -> CliResult<String> {
    let ctx = AppContext::local(config)?;
    let stream = ctx.stream(stream)?;
    let cursor = ctx.state.cursors.get(&stream)?.ok_or_else(|| {
        CliError::user(format!("Stream {} has not been ingested yet", stream))
    })?;
    Ok(CursorOutput { cursor }.render(format))
}

/// List every cursor.
pub fn cursor_list(config: CliConfig, format: OutputFormat) -> CliResult<String> {
    let ctx = AppContext::local(config)?;
    let cursors = ctx.state.cursors.list()?;
    Ok(CursorListOutput { cursors }.render(format))
}

/// Pause a stream.
pub fn cursor_pause(
    config: CliConfig,
    format: OutputFormat,
    stream: Option<&str>,
) -> CliResult<String> {
    let ctx = AppContext::local(config)?;
    let stream = ctx.stream(stream)?;
    let cursor = ctx.state.cursors.pause(&stream)?;
    info!(stream = %stream, "Cursor paused by operator");
    Ok(CursorOutput { cursor }.render(format))
}

/// Resume a paused or errored stream.
pub fn cursor_resume(
    config: CliConfig,
    format: OutputFormat,
    stream: Option<&str>,
) -> CliResult<String> {
    let ctx = AppContext::local(config)?;
    let stream = ctx.stream(stream)?;
    let cursor = ctx.state.cursors.resume(&stream)?;
    info!(stream = %stream, "Cursor resumed by operator");
    Ok(CursorOutput { cursor }.render(format))
}
