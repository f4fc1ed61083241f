//! Prometheus metrics for the reconciliation runner.
//!
//! Counters are fed from the ingester and sweep observers; the `run`
//! command serves them on `GET /metrics`.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info};

use paysync_ops::{BatchReport, OpsError, SweepReport};

use crate::error::{CliError, CliResult};

/// Metrics registry and definitions for the runner.
pub struct Metrics {
    /// The Prometheus registry containing all metrics.
    pub registry: Registry,

    // =========================================================================
    // Ingestion Metrics
    // =========================================================================
    /// Chain events processed, by outcome.
    pub events_processed_total: IntCounterVec,

    /// Payments verified and credited.
    pub payments_credited_total: IntCounter,

    /// Micro-points credited.
    pub points_credited_total: IntCounter,

    /// Failed ingestion iterations, by error kind.
    pub ingest_errors_total: IntCounterVec,

    /// Block height of the committed cursor.
    pub cursor_height: IntGauge,

    /// Fetch-and-apply latency in seconds.
    pub batch_latency_seconds: Histogram,

    // =========================================================================
    // Sweep Metrics
    // =========================================================================
    /// Payments failed by the timeout sweep.
    pub payments_expired_total: IntCounter,

    // =========================================================================
    // Process Metrics
    // =========================================================================
    /// Runner uptime in seconds.
    pub uptime_seconds: IntGauge,
}

impl Metrics {
    /// Create a new Metrics instance with all metrics registered.
    pub fn new() -> Self {
        let registry = Registry::new();

        let events_processed_total = IntCounterVec::new(
            Opts::new(
                "paysync_events_processed_total",
                "Chain events processed by outcome",
            ),
            &["outcome"],
        )
        .expect("metric creation should not fail");

        let payments_credited_total = IntCounter::with_opts(Opts::new(
            "paysync_payments_credited_total",
            "Payments verified and credited",
        ))
        .expect("metric creation should not fail");

        let points_credited_total = IntCounter::with_opts(Opts::new(
            "paysync_points_credited_total",
            "Micro-points credited to balances",
        ))
        .expect("metric creation should not fail");

        let ingest_errors_total = IntCounterVec::new(
            Opts::new("paysync_ingest_errors_total", "Failed ingestion iterations"),
            &["kind"],
        )
        .expect("metric creation should not fail");

        let cursor_height = IntGauge::with_opts(Opts::new(
            "paysync_cursor_height",
            "Block height of the committed cursor",
        ))
        .expect("metric creation should not fail");

        let batch_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "paysync_batch_latency_seconds",
                "Fetch-and-apply latency in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .expect("metric creation should not fail");

        let payments_expired_total = IntCounter::with_opts(Opts::new(
            "paysync_payments_expired_total",
            "Payments failed by the timeout sweep",
        ))
        .expect("metric creation should not fail");

        let uptime_seconds = IntGauge::with_opts(Opts::new(
            "paysync_uptime_seconds",
            "Runner uptime in seconds",
        ))
        .expect("metric creation should not fail");

        registry
            .register(Box::new(events_processed_total.clone()))
            .expect("registration should not fail");
        registry
            .register(Box::new(payments_credited_total.clone()))
            .expect("registration should not fail");
        registry
            .register(Box::new(points_credited_total.clone()))
            .expect("registration should not fail");
        registry
            .register(Box::new(ingest_errors_total.clone()))
            .expect("registration should not fail");
        registry
            .register(Box::new(cursor_height.clone()))
            .expect("registration should not fail");
        registry
            .register(Box::new(batch_latency_seconds.clone()))
            .expect("registration should not fail");
        registry
            .register(Box::new(payments_expired_total.clone()))
            .expect("registration should not fail");
        registry
            .register(Box::new(uptime_seconds.clone()))
            .expect("registration should not fail");

        Self {
            registry,
            events_processed_total,
            payments_credited_total,
            points_credited_total,
            ingest_errors_total,
            cursor_height,
            batch_latency_seconds,
            payments_expired_total,
            uptime_seconds,
        }
    }

    /// Encode all metrics in Prometheus text format.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            debug!(error = %e, "Metrics encoding failed");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Record a completed ingestion batch.
    pub fn observe_batch(&self, report: &BatchReport) {
        self.batch_latency_seconds
            .observe(report.elapsed.as_secs_f64());
        if report.matched > 0 {
            self.events_processed_total
                .with_label_values(&["matched"])
                .inc_by(report.matched);
            self.payments_credited_total.inc_by(report.matched);
        }
        for reason in &report.skipped {
            self.events_processed_total
                .with_label_values(&[reason.label()])
                .inc();
        }
        if report.points_credited > 0 {
            self.points_credited_total
                .inc_by(report.points_credited as u64);
        }
        if let Some(position) = report.cursor.last_cursor {
            self.cursor_height
                .set(i64::try_from(position.height).unwrap_or(i64::MAX));
        }
    }

    /// Record a failed ingestion iteration by its kind label.
    pub fn record_ingest_error(&self, error: &OpsError) {
        self.ingest_errors_total
            .with_label_values(&[Self::error_to_label(error)])
            .inc();
    }

    /// Record a sweep pass.
    pub fn observe_sweep(&self, report: &SweepReport) {
        self.payments_expired_total
            .inc_by(report.expired.len() as u64);
    }

    /// Convert an OpsError to a metric label.
    fn error_to_label(error: &OpsError) -> &'static str {
        match error {
            OpsError::Chain(_) => "chain",
            OpsError::Store(_) if error.is_cursor_halted() => "cursor_halted",
            OpsError::Store(e) if e.is_busy() => "store_busy",
            OpsError::Store(_) => "store",
            OpsError::Econ(_) => "econ",
            OpsError::InvalidConfig(_) => "config",
            _ => "other",
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics handle for use across async tasks.
pub type SharedMetrics = Arc<Metrics>;

/// Serve `/metrics` and `/health` until shutdown.
pub async fn serve_metrics(
    port: u16,
    metrics: SharedMetrics,
    mut shutdown_rx: watch::Receiver<bool>,
) -> CliResult<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        CliError::config(format!("Failed to bind metrics server to {}: {}", addr, e))
    })?;
    let started = Instant::now();

    info!(addr = %addr, "Metrics server listening");

    loop {
        tokio::select! {
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    info!("Metrics server shutting down");
                    break;
                }
            }

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((mut socket, _)) => {
                        let mut buf = [0u8; 1024];
                        let n = socket.read(&mut buf).await.unwrap_or(0);
                        let request = String::from_utf8_lossy(&buf[..n]);

                        // "GET /metrics HTTP/1.1"
                        let path = request
                            .lines()
                            .next()
                            .and_then(|line| line.split_whitespace().nth(1))
                            .unwrap_or("/health");

                        let uptime_secs = started.elapsed().as_secs();
                        let (content_type, body) = if path == "/metrics" {
                            metrics.uptime_seconds.set(uptime_secs as i64);
                            ("text/plain; version=0.0.4; charset=utf-8", metrics.encode())
                        } else {
                            (
                                "application/json",
                                format!(r#"{{"status":"ok","uptime_secs":{}}}"#, uptime_secs),
                            )
                        };

                        let response = format!(
                            "HTTP/1.1 200 OK\r\n\
                             Content-Type: {}\r\n\
                             Content-Length: {}\r\n\
                             Connection: close\r\n\
                             \r\n\
                             {}",
                            content_type,
                            body.len(),
                            body
                        );

                        // Client may have disconnected
                        let _ = socket.write_all(response.as_bytes()).await;
                    }
                    Err(e) => {
                        debug!(error = %e, "Metrics server accept error");
                    }
                }
            }
        }
    }

    Ok(())
}
