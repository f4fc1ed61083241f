//! Run the ingester and timeout sweep.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use paysync_ops::{IngestEvent, TransactionIngester};
use tracing::{info, warn};

use crate::config::CliConfig;
use crate::context::AppContext;
use crate::error::CliResult;
use crate::metrics::{serve_metrics, Metrics, SharedMetrics};
use crate::output::{OutputFormat, Render, RunOutput};
use crate::signals::RunStop;

/// Execute the run command.
///
/// With `once`, runs a single batch and a single sweep pass. Otherwise runs
/// until SIGINT or SIGTERM, serving metrics when enabled.
pub async fn run(
    config: CliConfig,
    format: OutputFormat,
    once: bool,
    stream: Option<String>,
) -> CliResult<String> {
    let ctx = AppContext::with_chain(config)?;
    let ingest = ctx.ingest_config(stream.as_deref())?;
    let ingester = ctx.ingester(ingest)?;

    let output = if once {
        run_once(&ctx, &ingester).await?
    } else {
        run_until_shutdown(&ctx, ingester, RunStop::with_os_signals()).await?
    };
    Ok(output.render(format))
}

async fn run_once(ctx: &AppContext, ingester: &TransactionIngester) -> CliResult<RunOutput> {
    let report = ingester.ingest_leased().await?;
    let sweep = ctx.sweep().sweep_once()?;

    let mut output = RunOutput {
        stream: ingester.stream().to_string(),
        expired: sweep.expired.len() as u64,
        ..RunOutput::default()
    };
    output.record_batch(&report);
    Ok(output)
}

async fn run_until_shutdown(
    ctx: &AppContext,
    ingester: TransactionIngester,
    stop: RunStop,
) -> CliResult<RunOutput> {
    let metrics: SharedMetrics = Arc::new(Metrics::new());

    let metrics_task = if ctx.config.metrics.enabled {
        let port = ctx.config.metrics.port;
        let task_metrics = Arc::clone(&metrics);
        let rx = stop.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = serve_metrics(port, task_metrics, rx).await {
                warn!(error = %e, "Metrics server stopped");
            }
        }))
    } else {
        None
    };

    let expired = Arc::new(AtomicU64::new(0));
    let sweep_task = {
        let sweep = ctx.sweep();
        let sweep_metrics = Arc::clone(&metrics);
        let sweep_expired = Arc::clone(&expired);
        let rx = stop.subscribe();
        tokio::spawn(async move {
            sweep
                .run_with(rx, move |report| {
                    sweep_metrics.observe_sweep(report);
                    sweep_expired.fetch_add(report.expired.len() as u64, Ordering::Relaxed);
                })
                .await;
        })
    };

    let mut output = RunOutput {
        stream: ingester.stream().to_string(),
        ..RunOutput::default()
    };
    info!(stream = %output.stream, "Runner started, press Ctrl+C to stop");

    let result = ingester
        .run_with(stop.subscribe(), |event| match event {
            IngestEvent::Batch(report) => {
                metrics.observe_batch(report);
                output.record_batch(report);
            }
            IngestEvent::Failed(e) => {
                metrics.record_ingest_error(e);
                output.errors += 1;
            }
            IngestEvent::Idle(_) => {}
        })
        .await;

    // The ingester may stop on its own (lost lease); take the rest down too.
    stop.trigger();
    if let Err(e) = sweep_task.await {
        warn!(error = %e, "Sweep task panicked");
    }
    if let Some(task) = metrics_task {
        if let Err(e) = task.await {
            warn!(error = %e, "Metrics task panicked");
        }
    }

    result?;
    output.expired = expired.load(Ordering::Relaxed);
    info!(stream = %output.stream, batches = output.batches, "Runner stopped");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use paysync_crypto::current_timestamp;
    use paysync_store::LeaseStore;
    use tempfile::TempDir;

    fn chain_context(temp_dir: &TempDir) -> AppContext {
        let mut config = CliConfig::default();
        config.storage.base_dir = temp_dir.path().to_path_buf();
        config.chain.payment_contract = "0xd2a4cff31913016155e38e474a2c06d08be276cf".to_string();
        AppContext::with_chain(config).unwrap()
    }

    #[tokio::test]
    async fn test_run_requires_payment_contract() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = CliConfig::default();
        config.storage.base_dir = temp_dir.path().to_path_buf();

        let err = run(config, OutputFormat::Human, true, None).await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_stream() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = CliConfig::default();
        config.storage.base_dir = temp_dir.path().to_path_buf();
        config.chain.payment_contract = "0xd2a4cff31913016155e38e474a2c06d08be276cf".to_string();

        let err = run(config, OutputFormat::Human, true, Some(String::new()))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_runner_honors_stop_raised_before_start() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = chain_context(&temp_dir);
        let ingester = ctx.ingester(ctx.ingest_config(None).unwrap()).unwrap();
        let stream = ctx.stream(None).unwrap();

        let stop = RunStop::new();
        stop.trigger();
        let output = run_until_shutdown(&ctx, ingester, stop).await.unwrap();

        assert_eq!(output.batches, 0);
        assert!(ctx.state.leases.get(&stream).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ingester_exit_stops_sweep() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = chain_context(&temp_dir);
        let ingester = ctx.ingester(ctx.ingest_config(None).unwrap()).unwrap();
        let stream = ctx.stream(None).unwrap();
        ctx.state
            .leases
            .acquire(&stream, "other-runner", 60_000, current_timestamp())
            .unwrap();

        let stop = RunStop::new();
        let err = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            run_until_shutdown(&ctx, ingester, stop.clone()),
        )
        .await
        .unwrap()
        .unwrap_err();

        assert_eq!(err.exit_code(), 8);
        assert!(stop.is_stopped());
    }
}
