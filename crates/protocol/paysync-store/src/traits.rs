//! Trait definitions for storage components.
//!
//! Implementations may vary (e.g., in-memory vs SQLite) but must satisfy
//! these interfaces. All methods take `&self`; implementations serialise
//! writes internally.

use paysync_types::{
    Address, Amount, CursorPosition, Nonce, PageRequest, PaymentId, PaymentStatus,
    PendingPayment, Points, StreamId, StreamMetadata, SyncCursor, Timestamp, TransactionPage,
    TxDigest, UserAccount,
};

use crate::error::Result;
use crate::types::{BalanceDiscrepancy, StreamLease};

// =============================================================================
// Pending Payments
// =============================================================================

/// Lifecycle storage for payment intents.
pub trait PaymentStore {
    /// Insert a new payment in `pending`.
    ///
    /// Fails with `DuplicateNonce` if the nonce was ever used by this address
    /// or the address already has an open payment, and with `InvalidAmount`
    /// for a zero amount.
    fn create(
        &self,
        address: &Address,
        nonce: &Nonce,
        amount: Amount,
        now: Timestamp,
    ) -> Result<PendingPayment>;

    /// Load a payment by id.
    fn get(&self, id: &PaymentId) -> Result<Option<PendingPayment>>;

    /// The open (`pending` or `signed`) payment for an address, if any.
    fn get_open_by_address(&self, address: &Address) -> Result<Option<PendingPayment>>;

    /// Move `pending -> signed`, recording the client's submission reference.
    fn mark_signed(
        &self,
        id: &PaymentId,
        hint: Option<&TxDigest>,
        now: Timestamp,
    ) -> Result<PendingPayment>;

    /// Apply a client-requested status change.
    ///
    /// Terminal targets are reserved for reconciliation and fail with
    /// `Forbidden`.
    fn request_transition(
        &self,
        id: &PaymentId,
        target: PaymentStatus,
        now: Timestamp,
    ) -> Result<PendingPayment>;

    /// The payment finalized with this chain digest, if any.
    fn find_by_digest(&self, digest: &TxDigest) -> Result<Option<PendingPayment>>;

    /// Open payments created at or before `cutoff`, oldest first.
    fn list_expired(&self, cutoff: Timestamp, limit: u32) -> Result<Vec<PendingPayment>>;

    /// Fail an open payment on timeout.
    ///
    /// Returns `None` if the payment already reached a terminal state.
    fn expire(&self, id: &PaymentId, now: Timestamp) -> Result<Option<PendingPayment>>;
}

// =============================================================================
// Sync Cursors
// =============================================================================

/// Durable per-stream ingestion position.
pub trait CursorStore {
    /// Read the cursor, creating it at genesis on first use.
    fn load(&self, stream: &StreamId) -> Result<SyncCursor>;

    /// Read the cursor without creating it.
    fn get(&self, stream: &StreamId) -> Result<Option<SyncCursor>>;

    /// Advance the cursor, updating metadata in the same write.
    ///
    /// A position that is not strictly greater than the stored one makes the
    /// whole call a no-op (the stored cursor is returned unchanged).
    fn advance_with<F>(
        &self,
        stream: &StreamId,
        position: CursorPosition,
        count_delta: u64,
        now: Timestamp,
        update: F,
    ) -> Result<SyncCursor>
    where
        F: FnOnce(&mut StreamMetadata);

    /// Advance the cursor without touching metadata.
    fn advance(
        &self,
        stream: &StreamId,
        position: CursorPosition,
        count_delta: u64,
        now: Timestamp,
    ) -> Result<SyncCursor> {
        self.advance_with(stream, position, count_delta, now, |_| {})
    }

    /// Count a failed iteration; may move the cursor to `error`.
    fn record_error(&self, stream: &StreamId) -> Result<SyncCursor>;

    /// Operator pause.
    fn pause(&self, stream: &StreamId) -> Result<SyncCursor>;

    /// Return to `active` and clear the consecutive error count.
    fn resume(&self, stream: &StreamId) -> Result<SyncCursor>;

    /// All cursors, ordered by id.
    fn list(&self) -> Result<Vec<SyncCursor>>;
}

// =============================================================================
// Stream Leases
// =============================================================================

/// Advisory single-runner locks keyed by stream.
pub trait LeaseStore {
    /// Take the lease, or extend it if `holder` already owns it.
    ///
    /// Fails with `StreamLocked` while another holder's lease is live.
    fn acquire(
        &self,
        stream: &StreamId,
        holder: &str,
        ttl_ms: u64,
        now: Timestamp,
    ) -> Result<StreamLease>;

    /// Extend a lease owned by `holder`.
    fn renew(
        &self,
        stream: &StreamId,
        holder: &str,
        ttl_ms: u64,
        now: Timestamp,
    ) -> Result<StreamLease>;

    /// Drop the lease if `holder` owns it. Returns whether a row was removed.
    fn release(&self, stream: &StreamId, holder: &str) -> Result<bool>;

    /// Current lease row, live or expired.
    fn get(&self, stream: &StreamId) -> Result<Option<StreamLease>>;
}

// =============================================================================
// Balance Ledger
// =============================================================================

/// Per-address balances with an append-only history.
pub trait BalanceStore {
    /// Apply a signed amount and append its record atomically.
    ///
    /// Returns the new balance. Zero fails with `InvalidAmount`; a debit
    /// below zero fails with `InsufficientBalance` and writes nothing.
    fn credit_or_debit(
        &self,
        address: &Address,
        amount: Points,
        note: &str,
        now: Timestamp,
    ) -> Result<Points>;

    /// Load the account, creating it with a zero balance if missing.
    fn get_or_create_account(&self, address: &Address, now: Timestamp) -> Result<UserAccount>;

    /// Load the account if it exists.
    fn get_account(&self, address: &Address) -> Result<Option<UserAccount>>;

    /// Current balance, zero for unknown addresses.
    fn get_balance(&self, address: &Address) -> Result<Points>;

    /// History for an address, newest first.
    fn list_transactions(&self, address: &Address, page: PageRequest) -> Result<TransactionPage>;

    /// Addresses whose balance differs from the sum of their records.
    fn audit(&self) -> Result<Vec<BalanceDiscrepancy>>;
}
