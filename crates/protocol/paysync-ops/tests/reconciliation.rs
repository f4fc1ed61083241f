//! Reconciliation Pipeline Tests
//!
//! Drive the ingester end to end against a scripted chain and check the
//! ledger afterwards:
//!
//! 1. **Scenarios**: match, amount mismatch, expiry before the transfer
//! 2. **Redelivery**: the same transfer seen twice credits once
//! 3. **Restart**: a new process resumes from the committed cursor
//! 4. **Ledger invariant**: balances always equal their history

use std::time::Duration;

use paysync_chain::ChainEvent;
use paysync_econ::PointsConverter;
use paysync_ops::{
    current_timestamp, IngestConfig, MatchOutcome, PaymentMatcher, SkipReason, TimeoutSweep,
};
use paysync_store::{BalanceStore, CursorStore, PaymentStore, PaysyncState};
use paysync_test_utils::{
    payment_event, reopen_state, test_address, test_ingester, test_state, test_state_on_disk,
    MockChain,
};
use paysync_types::{CursorPosition, Nonce, PaymentStatus, StreamMetadata, TxDigest};

// ============ HELPERS ============

fn nonce(s: &str) -> Nonce {
    Nonce::parse(s).unwrap()
}

fn assert_ledger_consistent(state: &PaysyncState) {
    let discrepancies = state.ledger.audit().unwrap();
    assert!(discrepancies.is_empty(), "ledger drift: {:?}", discrepancies);
}

fn converted(units: u64) -> i64 {
    PointsConverter::default().chain_units_to_points(units).unwrap()
}

// ============ SCENARIOS ============

#[tokio::test]
async fn test_matching_transfer_verifies_and_credits() {
    let state = test_state();
    let a = test_address(1);
    let n1 = nonce("n1");
    let payment = state.payments.create(&a, &n1, 1000, current_timestamp()).unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);

    let chain = MockChain::new();
    chain.push_event(payment_event(10, 0, &a, 1000, "0xabc", Some(&n1)));
    let ingester = test_ingester(&state, &chain, IngestConfig::default());

    let report = ingester.ingest_once().await.unwrap();
    assert_eq!(report.matched, 1);

    let payment = state.payments.get(&payment.id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Verified);
    assert_eq!(payment.tx_digest, Some(TxDigest::parse("0xabc").unwrap()));

    assert_eq!(state.ledger.get_balance(&a).unwrap(), converted(1000));
    let history = state.ledger.list_transactions(&a, Default::default()).unwrap();
    assert_eq!(history.pagination.total, 1);
    assert_eq!(history.transactions[0].amount, converted(1000));
    assert_ledger_consistent(&state);
}

#[tokio::test]
async fn test_short_transfer_leaves_payment_pending_and_advances() {
    let state = test_state();
    let a = test_address(1);
    let payment = state
        .payments
        .create(&a, &nonce("n1"), 1000, current_timestamp())
        .unwrap();

    let chain = MockChain::new();
    chain.push_event(payment_event(10, 2, &a, 500, "0xshort", None));
    let ingester = test_ingester(&state, &chain, IngestConfig::default());

    let report = ingester.ingest_once().await.unwrap();
    assert_eq!(report.matched, 0);
    assert_eq!(
        report.skipped,
        vec![SkipReason::AmountMismatch {
            expected: 1000,
            actual: 500
        }]
    );
    assert_eq!(report.cursor.last_cursor, Some(CursorPosition::new(10, 2)));

    let payment = state.payments.get(&payment.id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert!(payment.tx_digest.is_none());
    assert_eq!(state.ledger.get_balance(&a).unwrap(), 0);
}

#[tokio::test]
async fn test_expired_payment_ignores_late_transfer() {
    let state = test_state();
    let a = test_address(1);
    let expiry = Duration::from_secs(3600);
    let t0 = current_timestamp() - 2 * expiry.as_millis() as u64;
    let payment = state.payments.create(&a, &nonce("late"), 1000, t0).unwrap();

    let sweep = TimeoutSweep::new(state.clone(), expiry, Duration::from_secs(60));
    let report = sweep.sweep_once().unwrap();
    assert_eq!(report.expired, vec![payment.id.clone()]);

    let chain = MockChain::new();
    chain.push_event(payment_event(20, 0, &a, 1000, "0xlate", None));
    let ingester = test_ingester(&state, &chain, IngestConfig::default());

    let report = ingester.ingest_once().await.unwrap();
    assert_eq!(report.skipped, vec![SkipReason::NoOpenPayment]);

    let payment = state.payments.get(&payment.id).unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert!(payment.tx_digest.is_none());
    assert_eq!(state.ledger.get_balance(&a).unwrap(), 0);
}

// ============ REDELIVERY ============

#[tokio::test]
async fn test_redelivered_transfer_credits_once() {
    let state = test_state();
    let a = test_address(1);
    state
        .payments
        .create(&a, &nonce("first"), 1000, current_timestamp())
        .unwrap();

    let chain = MockChain::new();
    chain.push_event(payment_event(5, 0, &a, 1000, "0xdup", None));
    // A reorg replays the same transaction later in the stream.
    chain.push_event(payment_event(9, 0, &a, 1000, "0xdup", None));
    let ingester = test_ingester(&state, &chain, IngestConfig::default());

    let report = ingester.ingest_once().await.unwrap();
    assert_eq!(report.matched, 1);
    assert_eq!(report.skipped, vec![SkipReason::DigestConsumed]);
    assert_eq!(state.ledger.get_balance(&a).unwrap(), converted(1000));
    assert_ledger_consistent(&state);
}

#[tokio::test]
async fn test_consumed_digest_cannot_settle_a_second_payment() {
    let state = test_state();
    let a = test_address(1);
    let matcher = PaymentMatcher::new(state.clone(), PointsConverter::default());
    let event = payment_event(5, 0, &a, 1000, "0xonce", None);

    state
        .payments
        .create(&a, &nonce("one"), 1000, current_timestamp())
        .unwrap();
    let outcome = matcher.apply_event(&event, current_timestamp()).unwrap();
    assert!(matches!(outcome, MatchOutcome::Credited { .. }));

    // A new payment with the same amount is open, but the digest is spent.
    let second = state
        .payments
        .create(&a, &nonce("two"), 1000, current_timestamp())
        .unwrap();
    let outcome = matcher.apply_event(&event, current_timestamp()).unwrap();
    assert_eq!(outcome, MatchOutcome::Skipped(SkipReason::DigestConsumed));

    // Bypassing the lookup hits the unique index.
    let err = state
        .reconciler
        .finalize_match(&second.id, &event.tx_digest, 10, "replay", current_timestamp())
        .unwrap_err();
    assert_eq!(
        err.error_code(),
        paysync_types::ErrorCode::DuplicateTxDigest
    );

    assert!(state.payments.get_open_by_address(&a).unwrap().is_some());
    assert_eq!(state.ledger.get_balance(&a).unwrap(), converted(1000));
    assert_ledger_consistent(&state);
}

// ============ RESTART ============

#[tokio::test]
async fn test_restart_resumes_from_committed_cursor() {
    let (state, dir) = test_state_on_disk();
    let chain = MockChain::new();
    let addresses: Vec<_> = (1..=4u8).map(test_address).collect();
    for (i, address) in addresses.iter().enumerate() {
        state
            .payments
            .create(address, &nonce(&format!("n{}", i)), 1000, current_timestamp())
            .unwrap();
        chain.push_event(payment_event(
            100 + i as u64,
            0,
            address,
            1000,
            &format!("0x{:02x}", i),
            None,
        ));
    }
    let config = IngestConfig::default().with_batch_size(2);

    // First process: one batch, then it dies.
    let first = test_ingester(&state, &chain, config.clone());
    first.ingest_once().await.unwrap();
    let stream = first.stream().clone();
    drop(first);
    drop(state);

    // Second process reopens the same database.
    let state = reopen_state(&dir);
    let cursor = state.cursors.load(&stream).unwrap();
    assert_eq!(cursor.last_cursor, Some(CursorPosition::new(101, 0)));

    let second = test_ingester(&state, &chain, config);
    second.ingest_once().await.unwrap();
    let report = second.ingest_once().await.unwrap();
    assert_eq!(report.fetched, 0);

    for address in &addresses {
        assert_eq!(state.ledger.get_balance(address).unwrap(), converted(1000));
        assert!(state.payments.get_open_by_address(address).unwrap().is_none());
    }
    let cursor = state.cursors.load(&stream).unwrap();
    assert_eq!(cursor.processed_count, 4);
    assert_eq!(
        cursor.metadata,
        StreamMetadata::PaymentReceipts {
            matched: 4,
            skipped: 0,
            last_tx_digest: Some(TxDigest::parse("0x03").unwrap()),
        }
    );
    assert_ledger_consistent(&state);
}

// ============ LEDGER INVARIANT ============

#[tokio::test]
async fn test_balances_match_history_through_mixed_traffic() {
    let state = test_state();
    let chain = MockChain::new();
    let mut events: Vec<ChainEvent> = Vec::new();

    for seed in 1..=6u8 {
        let address = test_address(seed);
        state
            .payments
            .create(&address, &nonce(&format!("p{}", seed)), 100 * seed as u64, current_timestamp())
            .unwrap();
        // Odd seeds pay the right amount, even seeds underpay.
        let paid = if seed % 2 == 1 { 100 * seed as u64 } else { 1 };
        events.push(payment_event(seed as u64, 0, &address, paid, &format!("0xm{}", seed), None));
    }
    // A stranger with no payment.
    events.push(payment_event(50, 0, &test_address(99), 10, "0xstranger", None));
    for event in events {
        chain.push_event(event);
    }

    let ingester = test_ingester(&state, &chain, IngestConfig::default().with_batch_size(3));
    for _ in 0..5 {
        ingester.ingest_once().await.unwrap();
        assert_ledger_consistent(&state);
    }

    // Spend some of the credited points.
    let odd = test_address(1);
    state
        .ledger
        .credit_or_debit(&odd, -50, "AI usage: 1 input + 0 output tokens", current_timestamp())
        .unwrap();
    assert_ledger_consistent(&state);

    assert_eq!(state.ledger.get_balance(&odd).unwrap(), converted(100) - 50);
    assert_eq!(state.ledger.get_balance(&test_address(2)).unwrap(), 0);
    assert_eq!(state.payments.count_open().unwrap(), 3);
    assert_eq!(
        state.ledger.total_balance().unwrap(),
        converted(100 + 300 + 500) - 50
    );
}
