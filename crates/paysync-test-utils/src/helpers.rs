//! Fixture builders shared across crate tests.

use std::sync::Arc;
use std::time::Duration;

use paysync_chain::{ChainEvent, RetryPolicy};
use paysync_crypto::ScriptHash;
use paysync_econ::PointsConverter;
use paysync_ops::{IngestConfig, PaymentMatcher, PaymentService, TransactionIngester};
use paysync_store::{PaysyncState, StateConfig};
use paysync_types::{Address, Amount, CursorPosition, Nonce, TxDigest};
use tempfile::TempDir;

use crate::mock_chain::MockChain;

/// Create fresh in-memory state.
pub fn test_state() -> PaysyncState {
    PaysyncState::open_in_memory().unwrap()
}

/// Create state backed by a database file in a temporary directory.
///
/// The directory is removed when the returned `TempDir` is dropped.
pub fn test_state_on_disk() -> (PaysyncState, TempDir) {
    let dir = TempDir::new().unwrap();
    let state = PaysyncState::open(StateConfig::new(dir.path())).unwrap();
    (state, dir)
}

/// Reopen the database under `dir`, as a restarted process would.
pub fn reopen_state(dir: &TempDir) -> PaysyncState {
    PaysyncState::open(StateConfig::new(dir.path())).unwrap()
}

/// A deterministic, well-formed address derived from `seed`.
pub fn test_address(seed: u8) -> Address {
    Address::from_script_hash(&ScriptHash([seed; 20]))
}

/// A payment event at `(height, index)`.
pub fn payment_event(
    height: u64,
    index: u32,
    address: &Address,
    amount: Amount,
    digest: &str,
    nonce: Option<&Nonce>,
) -> ChainEvent {
    ChainEvent {
        position: CursorPosition::new(height, index),
        tx_digest: TxDigest::parse(digest).unwrap(),
        address: address.clone(),
        amount,
        nonce: nonce.cloned(),
    }
}

/// A retry policy that never waits.
pub fn instant_retry() -> RetryPolicy {
    RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1))
}

/// A payment service over `state` that verifies against `chain`.
pub fn test_service(state: &PaysyncState, chain: &MockChain) -> PaymentService {
    PaymentService::with_chain(
        state.clone(),
        PointsConverter::default(),
        Arc::new(chain.clone()),
    )
}

/// An ingester over `state` reading from `chain`.
pub fn test_ingester(
    state: &PaysyncState,
    chain: &MockChain,
    config: IngestConfig,
) -> TransactionIngester {
    TransactionIngester::new(
        state.clone(),
        Arc::new(chain.clone()),
        PaymentMatcher::new(state.clone(), PointsConverter::default()),
        config,
        instant_retry(),
    )
}
