//! Timeout sweep.
//!
//! Fails open payments older than the configured expiry. The sweep runs on
//! its own interval and does not depend on chain progress; a payment it
//! fails is terminal, so a matching transfer that arrives later is skipped
//! by the ingester.

use std::time::Duration;

use paysync_crypto::current_timestamp;
use paysync_store::{PaymentStore, PaysyncState};
use paysync_types::{PaymentId, Timestamp};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::OpsResult;

/// Payments failed by one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: Vec<PaymentId>,
}

/// Fails stale open payments.
#[derive(Clone)]
pub struct TimeoutSweep {
    state: PaysyncState,
    expiry_ms: u64,
    interval: Duration,
    batch_limit: u32,
}

impl TimeoutSweep {
    /// Create a sweep failing payments older than `expiry`.
    pub fn new(state: PaysyncState, expiry: Duration, interval: Duration) -> Self {
        Self {
            state,
            expiry_ms: expiry.as_millis() as u64,
            interval,
            batch_limit: 100,
        }
    }

    /// Set how many payments are loaded per query.
    pub fn with_batch_limit(mut self, limit: u32) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// Sweep as of the current time.
    pub fn sweep_once(&self) -> OpsResult<SweepReport> {
        self.sweep_at(current_timestamp())
    }

    /// Fail every open payment created at or before `now - expiry`.
    pub fn sweep_at(&self, now: Timestamp) -> OpsResult<SweepReport> {
        let cutoff = now.saturating_sub(self.expiry_ms);
        let mut report = SweepReport::default();

        loop {
            let stale = self.state.payments.list_expired(cutoff, self.batch_limit)?;
            let exhausted = stale.len() < self.batch_limit as usize;

            for payment in stale {
                if let Some(failed) = self.state.payments.expire(&payment.id, now)? {
                    report.expired.push(failed.id);
                }
            }
            if exhausted {
                break;
            }
        }

        if !report.expired.is_empty() {
            info!(count = report.expired.len(), "Expired stale payments");
        }
        Ok(report)
    }

    /// Sweep every interval until `shutdown` turns true.
    ///
    /// Failed passes are logged and retried on the next tick.
    pub async fn run_with<F>(&self, mut shutdown: watch::Receiver<bool>, mut observe: F)
    where
        F: FnMut(&SweepReport) + Send,
    {
        info!(interval = ?self.interval, expiry_ms = self.expiry_ms, "Timeout sweep started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.sweep_once() {
                Ok(report) => observe(&report),
                Err(e) => warn!(error = %e, "Timeout sweep failed"),
            }
            tokio::select! {
                _ = sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Timeout sweep stopped");
    }
}
