//! Atomic match-and-credit.

use rusqlite::{params, Connection, TransactionBehavior};
use std::sync::{Arc, Mutex};

use paysync_types::{Actor, PaymentId, PaymentStatus, Points, Timestamp, TxDigest};

use crate::error::{Result, StoreError};
use crate::ledger::apply_entry;
use crate::lock;
use crate::payments::SqlitePaymentStore;
use crate::types::FinalizeOutcome;

/// Finalizes matched payments against the balance ledger.
#[derive(Clone)]
pub struct SqliteReconciler {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReconciler {
    /// Create a new reconciler with the given database connection.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Verify a payment, stamp its digest and credit its address.
    ///
    /// All three writes share one transaction. If any of them fails the
    /// transaction rolls back and the payment stays open.
    ///
    /// # Errors
    /// - `PaymentNotFound` if the id is unknown
    /// - `DuplicateTxDigest` if another payment already carries `digest`
    /// - `InvalidAmount` if `points` is zero or overflows the balance
    pub fn finalize_match(
        &self,
        id: &PaymentId,
        digest: &TxDigest,
        points: Points,
        note: &str,
        now: Timestamp,
    ) -> Result<FinalizeOutcome> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let payment = SqlitePaymentStore::load_in(&tx, id)?
            .ok_or_else(|| StoreError::payment_not_found(id.as_str()))?;
        if !payment.is_open() {
            return Ok(FinalizeOutcome::NotOpen(payment.status));
        }
        let next = payment
            .status
            .transition(PaymentStatus::Verified, Actor::Ingester)?;

        tx.execute(
            "UPDATE pending_payments SET status = ?2, tx_digest = ?3, updated_at = ?4
             WHERE id = ?1 AND status IN ('pending', 'signed')",
            params![id.as_str(), next.as_str(), digest.as_str(), now as i64],
        )
        .map_err(|e| StoreError::from_unique_violation(e, digest.as_str()))?;

        let (new_balance, record_id) = apply_entry(&tx, &payment.address, points, note, now)?;
        tx.commit()?;

        tracing::info!(
            payment_id = %id,
            address = %payment.address,
            tx_digest = %digest,
            points,
            new_balance,
            "Payment verified and credited"
        );

        Ok(FinalizeOutcome::Credited {
            payment: paysync_types::PendingPayment {
                status: next,
                tx_digest: Some(digest.clone()),
                updated_at: now,
                ..payment
            },
            record_id,
            new_balance,
        })
    }
}
