//! The reconciliation loop.
//!
//! One [`TransactionIngester`] drives one stream. Each iteration loads the
//! cursor, fetches a bounded batch of events strictly after it, applies them
//! in ascending order and then advances the cursor past everything handled.
//!
//! # Failure handling
//!
//! - A failed fetch records a cursor error and leaves the cursor untouched.
//! - A failed event (its transaction rolled back) stops the batch. The
//!   cursor advances through the last event that was handled, the error is
//!   recorded, and the failed event is fetched again on the next poll.
//! - Once the cursor's consecutive errors reach the threshold it enters
//!   `error` and the loop idles until an operator resumes it.
//!
//! Only one runner may drive a stream at a time. [`run`](TransactionIngester::run)
//! takes the stream lease before its first iteration, renews it after every
//! fetch and before every event, and releases it on shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use paysync_chain::{ChainSource, RetryPolicy};
use paysync_crypto::{current_timestamp, random_token_with_len};
use paysync_store::{CursorStore, LeaseStore, PaysyncState, StoreError};
use paysync_types::{
    CursorPosition, CursorStatus, ErrorCode, Points, StreamId, SyncCursor, TxDigest,
};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::error::{OpsError, OpsResult};
use crate::matcher::{MatchOutcome, PaymentMatcher, SkipReason};

/// Summary of one completed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Events returned by the chain source.
    pub fetched: usize,
    /// Events that credited a payment.
    pub matched: u64,
    /// Events skipped, by reason.
    pub skipped: Vec<SkipReason>,
    /// Total points credited by this batch.
    pub points_credited: Points,
    /// Whether the cursor moved.
    pub advanced: bool,
    /// Cursor after the batch.
    pub cursor: SyncCursor,
    /// Time spent fetching and applying.
    pub elapsed: Duration,
}

impl BatchReport {
    /// Events processed, matched or skipped.
    pub fn processed(&self) -> u64 {
        self.matched + self.skipped.len() as u64
    }
}

/// What the loop did in one iteration, passed to the observer.
#[derive(Debug)]
pub enum IngestEvent<'a> {
    /// A batch completed.
    Batch(&'a BatchReport),
    /// The iteration failed and will be retried after a backoff.
    Failed(&'a OpsError),
    /// The cursor is stalled or paused; the loop is waiting.
    Idle(CursorStatus),
}

/// Drives reconciliation for one stream.
pub struct TransactionIngester {
    state: PaysyncState,
    chain: Arc<dyn ChainSource>,
    matcher: PaymentMatcher,
    config: IngestConfig,
    backoff: RetryPolicy,
    holder: String,
}

impl TransactionIngester {
    /// Create an ingester.
    ///
    /// `backoff` paces retries after failed iterations; requests inside a
    /// chain source carry their own retry policy.
    pub fn new(
        state: PaysyncState,
        chain: Arc<dyn ChainSource>,
        matcher: PaymentMatcher,
        config: IngestConfig,
        backoff: RetryPolicy,
    ) -> Self {
        let holder = format!("ingester-{}-{}", std::process::id(), random_token_with_len(4));
        Self {
            state,
            chain,
            matcher,
            config,
            backoff,
            holder,
        }
    }

    /// Replace the lease holder name.
    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    /// Stream driven by this ingester.
    pub fn stream(&self) -> &StreamId {
        &self.config.stream_id
    }

    /// Lease holder name.
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Run one fetch-and-apply iteration.
    ///
    /// # Errors
    /// - `CursorStalled` / `CursorPaused` if the cursor is halted; nothing is
    ///   fetched or recorded
    /// - `Chain` if the fetch failed
    /// - the first event failure, after a partial advance
    pub async fn ingest_once(&self) -> OpsResult<BatchReport> {
        self.ingest_batch(false).await
    }

    /// Take the stream lease, run one iteration while holding it, then
    /// release it.
    ///
    /// Fails with `StreamLocked` if another runner holds the stream, or
    /// loses it mid-batch.
    pub async fn ingest_leased(&self) -> OpsResult<BatchReport> {
        let stream = &self.config.stream_id;
        self.state.leases.acquire(
            stream,
            &self.holder,
            self.config.lease_ttl_ms(),
            current_timestamp(),
        )?;
        let result = self.ingest_batch(true).await;
        if let Err(e) = self.state.leases.release(stream, &self.holder) {
            warn!(stream = %stream, error = %e, "Failed to release stream lease");
        }
        result
    }

    /// With `leased`, the lease is renewed after the fetch and before every
    /// event, so a batch that outlives the TTL stops instead of overlapping
    /// with a new holder.
    async fn ingest_batch(&self, leased: bool) -> OpsResult<BatchReport> {
        let stream = &self.config.stream_id;
        let started = Instant::now();
        let cursor = self.state.cursors.load(stream)?;
        match cursor.status {
            CursorStatus::Error => return Err(StoreError::CursorStalled(stream.to_string()).into()),
            CursorStatus::Paused => return Err(StoreError::CursorPaused(stream.to_string()).into()),
            CursorStatus::Active => {}
        }

        let batch = match self
            .chain
            .fetch_events(stream, cursor.last_cursor, self.config.batch_size)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                let cursor = self.state.cursors.record_error(stream)?;
                warn!(
                    stream = %stream,
                    error = %e,
                    consecutive_errors = cursor.consecutive_errors,
                    "Chain fetch failed"
                );
                return Err(e.into());
            }
        };

        self.hold_lease(leased)?;
        let mut progress = Progress::default();
        for event in &batch.events {
            // Sources must not return events at or before the cursor; ignore
            // any that do rather than crediting them twice.
            if !cursor.is_behind(&event.position) {
                continue;
            }
            if let Err(e) = self.hold_lease(leased) {
                error!(stream = %stream, holder = %self.holder, error = %e, "Lost stream lease mid-batch");
                if let Some(position) = progress.last_position {
                    self.commit(stream, position, &progress)?;
                }
                return Err(e);
            }

            match self.matcher.apply_event(event, current_timestamp()) {
                Ok(MatchOutcome::Credited { points, .. }) => {
                    progress.matched += 1;
                    progress.points = progress.points.saturating_add(points);
                    progress.last_digest = Some(event.tx_digest.clone());
                }
                Ok(MatchOutcome::Skipped(reason)) => progress.skipped.push(reason),
                Err(e) => {
                    error!(
                        stream = %stream,
                        position = %event.position,
                        tx_digest = %event.tx_digest,
                        error = %e,
                        "Failed to apply chain event, batch stopped"
                    );
                    if let Some(position) = progress.last_position {
                        self.commit(stream, position, &progress)?;
                    }
                    self.state.cursors.record_error(stream)?;
                    return Err(e);
                }
            }
            progress.last_position = Some(event.position);
        }

        let before = cursor.last_cursor;
        let cursor = match batch.high_water_mark() {
            Some(position) => self.commit(stream, position, &progress)?,
            None => cursor,
        };

        let report = BatchReport {
            fetched: batch.events.len(),
            matched: progress.matched,
            skipped: progress.skipped,
            points_credited: progress.points,
            advanced: cursor.last_cursor != before,
            cursor,
            elapsed: started.elapsed(),
        };
        if report.processed() > 0 {
            info!(
                stream = %stream,
                matched = report.matched,
                skipped = report.skipped.len(),
                cursor = ?report.cursor.last_cursor.map(|p| p.to_string()),
                "Processed batch"
            );
        }
        Ok(report)
    }

    fn hold_lease(&self, leased: bool) -> OpsResult<()> {
        if leased {
            self.state.leases.renew(
                &self.config.stream_id,
                &self.holder,
                self.config.lease_ttl_ms(),
                current_timestamp(),
            )?;
        }
        Ok(())
    }

    fn commit(
        &self,
        stream: &StreamId,
        position: CursorPosition,
        progress: &Progress,
    ) -> OpsResult<SyncCursor> {
        let processed = progress.matched + progress.skipped.len() as u64;
        let cursor = self.state.cursors.advance_with(
            stream,
            position,
            processed,
            current_timestamp(),
            |metadata| {
                metadata.record_receipts(
                    progress.matched,
                    progress.skipped.len() as u64,
                    progress.last_digest.as_ref(),
                )
            },
        )?;
        Ok(cursor)
    }

    /// Run until `shutdown` turns true.
    ///
    /// The shutdown signal is checked between batches only; a batch in
    /// flight always completes. Fails with `StreamLocked` if another runner
    /// holds the stream.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> OpsResult<()> {
        self.run_with(shutdown, |_| {}).await
    }

    /// [`run`](Self::run), reporting every iteration to `observe`.
    pub async fn run_with<F>(&self, mut shutdown: watch::Receiver<bool>, mut observe: F) -> OpsResult<()>
    where
        F: FnMut(IngestEvent<'_>) + Send,
    {
        self.config.validate()?;
        let stream = &self.config.stream_id;
        let ttl = self.config.lease_ttl_ms();
        self.state
            .leases
            .acquire(stream, &self.holder, ttl, current_timestamp())?;
        info!(stream = %stream, holder = %self.holder, "Ingester started");

        let mut failures: u32 = 0;
        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }
            if let Err(e) = self
                .state
                .leases
                .renew(stream, &self.holder, ttl, current_timestamp())
            {
                error!(stream = %stream, error = %e, "Lost stream lease, stopping");
                break Err(e.into());
            }

            let delay = match self.ingest_batch(true).await {
                Ok(report) => {
                    failures = 0;
                    observe(IngestEvent::Batch(&report));
                    if report.advanced {
                        Duration::ZERO
                    } else {
                        self.config.poll_interval
                    }
                }
                Err(e) if e.error_code() == ErrorCode::StreamLocked => {
                    error!(stream = %stream, error = %e, "Lost stream lease, stopping");
                    break Err(e);
                }
                Err(e) if e.is_cursor_halted() => {
                    let status = match e {
                        OpsError::Store(StoreError::CursorPaused(_)) => CursorStatus::Paused,
                        _ => CursorStatus::Error,
                    };
                    debug!(stream = %stream, status = %status, "Cursor halted, waiting");
                    observe(IngestEvent::Idle(status));
                    self.config.poll_interval
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    observe(IngestEvent::Failed(&e));
                    let delay = self.backoff.delay_for_attempt(failures);
                    debug!(stream = %stream, failures, ?delay, "Backing off after failure");
                    delay
                }
            };

            if delay.is_zero() {
                continue;
            }
            tokio::select! {
                _ = sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                }
            }
        };

        match self.state.leases.release(stream, &self.holder) {
            Ok(_) => {}
            Err(e) => warn!(stream = %stream, error = %e, "Failed to release stream lease"),
        }
        info!(stream = %stream, "Ingester stopped");
        result
    }
}

#[derive(Default)]
struct Progress {
    matched: u64,
    skipped: Vec<SkipReason>,
    points: Points,
    last_digest: Option<TxDigest>,
    last_position: Option<CursorPosition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use paysync_econ::PointsConverter;
    use paysync_store::{BalanceStore, PaymentStore};
    use paysync_test_utils::{payment_event, test_address, test_state, MockChain};
    use paysync_types::{Nonce, StreamMetadata};

    fn ingester(state: &PaysyncState, chain: &MockChain, batch_size: u32) -> TransactionIngester {
        TransactionIngester::new(
            state.clone(),
            Arc::new(chain.clone()),
            PaymentMatcher::new(state.clone(), PointsConverter::default()),
            IngestConfig::default().with_batch_size(batch_size),
            RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn test_leased_batch_stops_when_lease_taken_during_fetch() {
        let state = test_state();
        let a = test_address(1);
        state
            .payments
            .create(&a, &Nonce::parse("n1").unwrap(), 1000, 1)
            .unwrap();

        let chain = MockChain::new();
        chain.push_event(payment_event(5, 0, &a, 1000, "0x1", None));
        chain.set_fetch_delay(Duration::from_millis(200));
        let ingester = TransactionIngester::new(
            state.clone(),
            Arc::new(chain.clone()),
            PaymentMatcher::new(state.clone(), PointsConverter::default()),
            IngestConfig::default().with_lease_ttl(Duration::from_millis(20)),
            RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1)),
        );
        let stream = ingester.stream().clone();

        let takeover = async {
            sleep(Duration::from_millis(80)).await;
            state
                .leases
                .acquire(&stream, "other-runner", 60_000, current_timestamp())
        };
        let (result, taken) = tokio::join!(ingester.ingest_leased(), takeover);

        assert!(taken.is_ok());
        let err = result.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::StreamLocked);
        assert_eq!(state.ledger.get_balance(&a).unwrap(), 0);
        assert!(state.payments.get_open_by_address(&a).unwrap().is_some());
        assert_eq!(state.cursors.load(&stream).unwrap().last_cursor, None);
        assert_eq!(state.leases.get(&stream).unwrap().unwrap().holder, "other-runner");
    }

    #[tokio::test]
    async fn test_ingest_leased_releases_lease() {
        let state = test_state();
        let a = test_address(1);
        state
            .payments
            .create(&a, &Nonce::parse("n1").unwrap(), 1000, 1)
            .unwrap();

        let chain = MockChain::new();
        chain.push_event(payment_event(5, 0, &a, 1000, "0x1", None));
        let ingester = ingester(&state, &chain, 10);

        let report = ingester.ingest_leased().await.unwrap();
        assert_eq!(report.matched, 1);
        assert!(state.leases.get(ingester.stream()).unwrap().is_none());

        state
            .leases
            .acquire(ingester.stream(), "other-runner", 60_000, current_timestamp())
            .unwrap();
        let err = ingester.ingest_leased().await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::StreamLocked);
        assert_eq!(chain.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_batch_points_total_saturates() {
        let state = test_state();
        let a = test_address(1);
        let b = test_address(2);
        let amount = (i64::MAX / 10) as u64;
        for (address, nonce) in [(&a, "n1"), (&b, "n2")] {
            state
                .payments
                .create(address, &Nonce::parse(nonce).unwrap(), amount, 1)
                .unwrap();
        }

        let chain = MockChain::new();
        chain.push_event(payment_event(5, 0, &a, amount, "0x1", None));
        chain.push_event(payment_event(5, 1, &b, amount, "0x2", None));
        let ingester = ingester(&state, &chain, 10);

        let report = ingester.ingest_once().await.unwrap();
        assert_eq!(report.matched, 2);
        assert_eq!(report.points_credited, i64::MAX);
        assert_eq!(report.cursor.last_cursor, Some(CursorPosition::new(5, 1)));
        assert_eq!(state.ledger.get_balance(&a).unwrap(), amount as i64 * 10);
        assert_eq!(state.ledger.get_balance(&b).unwrap(), amount as i64 * 10);
    }

    #[tokio::test]
    async fn test_ingest_credits_and_advances() {
        let state = test_state();
        let a = test_address(1);
        let b = test_address(2);
        state
            .payments
            .create(&a, &Nonce::parse("n1").unwrap(), 1000, 1)
            .unwrap();

        let chain = MockChain::new();
        chain.push_event(payment_event(5, 0, &b, 1000, "0x1", None));
        chain.push_event(payment_event(6, 0, &a, 1000, "0x2", None));
        let ingester = ingester(&state, &chain, 10);

        let report = ingester.ingest_once().await.unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(report.matched, 1);
        assert_eq!(report.skipped, vec![SkipReason::NoOpenPayment]);
        assert_eq!(report.points_credited, 10_000);
        assert!(report.advanced);
        assert_eq!(report.cursor.last_cursor, Some(CursorPosition::new(6, 0)));
        assert_eq!(report.cursor.processed_count, 2);
        assert_eq!(
            report.cursor.metadata,
            StreamMetadata::PaymentReceipts {
                matched: 1,
                skipped: 1,
                last_tx_digest: Some(TxDigest::parse("0x2").unwrap()),
            }
        );
        assert_eq!(state.ledger.get_balance(&a).unwrap(), 10_000);

        // Caught up: nothing new, cursor unchanged
        let report = ingester.ingest_once().await.unwrap();
        assert_eq!(report.fetched, 0);
        assert!(!report.advanced);
    }

    #[tokio::test]
    async fn test_batch_limit_and_checkpoint() {
        let state = test_state();
        let chain = MockChain::new();
        for height in 1..=3 {
            chain.push_event(payment_event(height, 0, &test_address(9), 5, &format!("0x{}", height), None));
        }
        chain.set_checkpoint(Some(CursorPosition::end_of_block(40)));
        let ingester = ingester(&state, &chain, 2);

        let report = ingester.ingest_once().await.unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(report.cursor.last_cursor, Some(CursorPosition::new(2, 0)));

        // The last batch carries the empty-block checkpoint.
        let report = ingester.ingest_once().await.unwrap();
        assert_eq!(report.fetched, 1);
        assert_eq!(
            report.cursor.last_cursor,
            Some(CursorPosition::end_of_block(40))
        );
        assert_eq!(report.cursor.processed_count, 3);
    }

    #[tokio::test]
    async fn test_fetch_failure_records_error_without_advancing() {
        let state = test_state();
        let chain = MockChain::new();
        chain.push_event(payment_event(5, 0, &test_address(1), 1000, "0x1", None));
        chain.fail_next_fetches(1);
        let ingester = ingester(&state, &chain, 10);

        let err = ingester.ingest_once().await.unwrap_err();
        assert!(matches!(err, OpsError::Chain(_)));
        let cursor = state.cursors.load(ingester.stream()).unwrap();
        assert_eq!(cursor.last_cursor, None);
        assert_eq!(cursor.error_count, 1);
        assert_eq!(cursor.consecutive_errors, 1);

        ingester.ingest_once().await.unwrap();
        let cursor = state.cursors.load(ingester.stream()).unwrap();
        assert_eq!(cursor.last_cursor, Some(CursorPosition::new(5, 0)));
        assert_eq!(cursor.consecutive_errors, 0);
        assert_eq!(cursor.error_count, 1);
        assert_eq!(chain.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_event_stops_batch_at_last_good_event() {
        let state = test_state();
        let a = test_address(1);
        let b = test_address(2);
        state
            .payments
            .create(&b, &Nonce::parse("nb").unwrap(), u64::MAX >> 1, 1)
            .unwrap();

        let chain = MockChain::new();
        chain.push_event(payment_event(5, 0, &a, 1000, "0x1", None));
        // Matches b's payment but its points overflow the i64 range.
        chain.push_event(payment_event(6, 0, &b, u64::MAX >> 1, "0x2", None));
        chain.push_event(payment_event(7, 0, &a, 1000, "0x3", None));
        let ingester = ingester(&state, &chain, 10);

        let err = ingester.ingest_once().await.unwrap_err();
        assert!(matches!(err, OpsError::Econ(_)));

        let cursor = state.cursors.load(ingester.stream()).unwrap();
        assert_eq!(cursor.last_cursor, Some(CursorPosition::new(5, 0)));
        assert_eq!(cursor.processed_count, 1);
        assert_eq!(cursor.consecutive_errors, 1);
        assert!(state.payments.get_open_by_address(&b).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_halted_cursor_is_not_fetched() {
        let state = test_state();
        let chain = MockChain::new();
        chain.push_event(payment_event(5, 0, &test_address(1), 1000, "0x1", None));
        let ingester = ingester(&state, &chain, 10);
        state.cursors.pause(ingester.stream()).unwrap();

        let err = ingester.ingest_once().await.unwrap_err();
        assert!(err.is_cursor_halted());
        assert_eq!(chain.fetch_calls(), 0);
        let cursor = state.cursors.load(ingester.stream()).unwrap();
        assert_eq!(cursor.last_cursor, None);
        assert_eq!(cursor.error_count, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_and_releases_lease() {
        let state = test_state();
        let a = test_address(1);
        state
            .payments
            .create(&a, &Nonce::parse("n1").unwrap(), 1000, 1)
            .unwrap();
        let chain = MockChain::new();
        chain.push_event(payment_event(5, 0, &a, 1000, "0x1", None));
        let ingester = Arc::new(ingester(&state, &chain, 10));

        let (tx, rx) = watch::channel(false);
        let task = {
            let ingester = Arc::clone(&ingester);
            tokio::spawn(async move { ingester.run(rx).await })
        };

        for _ in 0..200 {
            if state.ledger.get_balance(&a).unwrap() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
        task.await.unwrap().unwrap();

        assert!(state.payments.get_open_by_address(&a).unwrap().is_none());
        assert_eq!(state.ledger.get_balance(&a).unwrap(), 10_000);
        assert!(state.leases.get(ingester.stream()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_runner_is_locked_out() {
        let state = test_state();
        let chain = MockChain::new();
        let first = ingester(&state, &chain, 10).with_holder("first");
        let second = ingester(&state, &chain, 10).with_holder("second");

        state
            .leases
            .acquire(first.stream(), first.holder(), 60_000, current_timestamp())
            .unwrap();

        let (_tx, rx) = watch::channel(false);
        let err = second.run(rx).await.unwrap_err();
        assert_eq!(err.error_code(), paysync_types::ErrorCode::StreamLocked);
    }
}
