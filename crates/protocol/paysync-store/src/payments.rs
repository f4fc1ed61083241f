//! Pending payment storage.
//!
//! Owns the `pending_payments` table. Uniqueness rules are enforced by the
//! schema's indexes rather than check-then-insert, so concurrent creators
//! race on the index and the loser receives `DuplicateNonce`.

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::sync::{Arc, Mutex};

use paysync_types::{
    Actor, Address, Amount, Nonce, PaymentId, PaymentStatus, PendingPayment, Timestamp, TxDigest,
};

use crate::error::{Result, StoreError};
use crate::lock;
use crate::traits::PaymentStore;

const PAYMENT_COLUMNS: &str =
    "id, address, nonce, amount, status, tx_digest, tx_digest_hint, created_at, updated_at";

/// SQLite-based pending payment ledger.
#[derive(Clone)]
pub struct SqlitePaymentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePaymentStore {
    /// Create a new payment store with the given database connection.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Deserialize a payment from a row selected with `PAYMENT_COLUMNS`.
    pub(crate) fn deserialize_payment(row: &Row) -> rusqlite::Result<PendingPayment> {
        let id: String = row.get(0)?;
        let address: String = row.get(1)?;
        let nonce: String = row.get(2)?;
        let amount: i64 = row.get(3)?;
        let status: String = row.get(4)?;
        let tx_digest: Option<String> = row.get(5)?;
        let tx_digest_hint: Option<String> = row.get(6)?;
        let created_at: i64 = row.get(7)?;
        let updated_at: i64 = row.get(8)?;

        let id = PaymentId::parse(&id)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
        let status = status
            .parse::<PaymentStatus>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

        Ok(PendingPayment {
            id,
            address: Address::new_unchecked(address),
            nonce: Nonce::new_unchecked(nonce),
            amount: amount as Amount,
            status,
            tx_digest: tx_digest.map(TxDigest::new_unchecked),
            tx_digest_hint: tx_digest_hint.map(TxDigest::new_unchecked),
            created_at: created_at as Timestamp,
            updated_at: updated_at as Timestamp,
        })
    }

    /// Load a payment on an already-locked connection or open transaction.
    pub(crate) fn load_in(conn: &Connection, id: &PaymentId) -> Result<Option<PendingPayment>> {
        let payment = conn
            .query_row(
                &format!("SELECT {} FROM pending_payments WHERE id = ?1", PAYMENT_COLUMNS),
                [id.as_str()],
                Self::deserialize_payment,
            )
            .optional()?;
        Ok(payment)
    }

    /// Validate and apply a non-terminal or sweep transition inside `conn`.
    fn transition_in(
        conn: &Connection,
        id: &PaymentId,
        target: PaymentStatus,
        actor: Actor,
        hint: Option<&TxDigest>,
        now: Timestamp,
    ) -> Result<PendingPayment> {
        let payment =
            Self::load_in(conn, id)?.ok_or_else(|| StoreError::payment_not_found(id.as_str()))?;
        let next = payment.status.transition(target, actor)?;

        let changed = conn.execute(
            "UPDATE pending_payments
             SET status = ?2, tx_digest_hint = COALESCE(?3, tx_digest_hint), updated_at = ?4
             WHERE id = ?1 AND status = ?5",
            params![
                id.as_str(),
                next.as_str(),
                hint.map(|h| h.as_str()),
                now as i64,
                payment.status.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::invalid_data(format!(
                "payment {} changed during transition",
                id
            )));
        }

        Ok(PendingPayment {
            status: next,
            tx_digest_hint: hint.cloned().or(payment.tx_digest_hint.clone()),
            updated_at: now,
            ..payment
        })
    }

    fn transition(
        &self,
        id: &PaymentId,
        target: PaymentStatus,
        actor: Actor,
        hint: Option<&TxDigest>,
        now: Timestamp,
    ) -> Result<PendingPayment> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let payment = Self::transition_in(&tx, id, target, actor, hint, now)?;
        tx.commit()?;

        tracing::debug!(
            payment_id = %id,
            status = %payment.status,
            "Payment status updated"
        );
        Ok(payment)
    }

    /// Number of open payments.
    pub fn count_open(&self) -> Result<u64> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pending_payments WHERE status IN ('pending', 'signed')",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl PaymentStore for SqlitePaymentStore {
    fn create(
        &self,
        address: &Address,
        nonce: &Nonce,
        amount: Amount,
        now: Timestamp,
    ) -> Result<PendingPayment> {
        if amount == 0 {
            return Err(StoreError::invalid_amount("payment amount must be positive"));
        }
        let stored_amount = i64::try_from(amount)
            .map_err(|_| StoreError::invalid_amount(format!("{} exceeds storage range", amount)))?;

        let payment = PendingPayment {
            id: PaymentId::generate(),
            address: address.clone(),
            nonce: nonce.clone(),
            amount,
            status: PaymentStatus::Pending,
            tx_digest: None,
            tx_digest_hint: None,
            created_at: now,
            updated_at: now,
        };

        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO pending_payments (id, address, nonce, amount, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                payment.id.as_str(),
                address.as_str(),
                nonce.as_str(),
                stored_amount,
                PaymentStatus::Pending.as_str(),
                now as i64,
            ],
        )
        .map_err(|e| {
            StoreError::from_unique_violation(e, &format!("nonce {} for {}", nonce, address))
        })?;

        tracing::debug!(
            payment_id = %payment.id,
            address = %address,
            amount,
            "Created pending payment"
        );
        Ok(payment)
    }

    fn get(&self, id: &PaymentId) -> Result<Option<PendingPayment>> {
        let conn = lock(&self.conn)?;
        Self::load_in(&conn, id)
    }

    fn get_open_by_address(&self, address: &Address) -> Result<Option<PendingPayment>> {
        let conn = lock(&self.conn)?;
        let payment = conn
            .query_row(
                &format!(
                    "SELECT {} FROM pending_payments
                     WHERE address = ?1 AND status IN ('pending', 'signed')",
                    PAYMENT_COLUMNS
                ),
                [address.as_str()],
                Self::deserialize_payment,
            )
            .optional()?;
        Ok(payment)
    }

    fn mark_signed(
        &self,
        id: &PaymentId,
        hint: Option<&TxDigest>,
        now: Timestamp,
    ) -> Result<PendingPayment> {
        self.transition(id, PaymentStatus::Signed, Actor::Client, hint, now)
    }

    fn request_transition(
        &self,
        id: &PaymentId,
        target: PaymentStatus,
        now: Timestamp,
    ) -> Result<PendingPayment> {
        self.transition(id, target, Actor::Client, None, now)
    }

    fn find_by_digest(&self, digest: &TxDigest) -> Result<Option<PendingPayment>> {
        let conn = lock(&self.conn)?;
        let payment = conn
            .query_row(
                &format!(
                    "SELECT {} FROM pending_payments WHERE tx_digest = ?1",
                    PAYMENT_COLUMNS
                ),
                [digest.as_str()],
                Self::deserialize_payment,
            )
            .optional()?;
        Ok(payment)
    }

    fn list_expired(&self, cutoff: Timestamp, limit: u32) -> Result<Vec<PendingPayment>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pending_payments
             WHERE status IN ('pending', 'signed') AND created_at <= ?1
             ORDER BY created_at ASC LIMIT ?2",
            PAYMENT_COLUMNS
        ))?;

        let payments = stmt
            .query_map(params![cutoff as i64, limit], Self::deserialize_payment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(payments)
    }

    fn expire(&self, id: &PaymentId, now: Timestamp) -> Result<Option<PendingPayment>> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current =
            Self::load_in(&tx, id)?.ok_or_else(|| StoreError::payment_not_found(id.as_str()))?;
        if !current.is_open() {
            // Reconciled between listing and expiry
            return Ok(None);
        }

        let payment =
            Self::transition_in(&tx, id, PaymentStatus::Failed, Actor::Sweeper, None, now)?;
        tx.commit()?;

        tracing::warn!(
            payment_id = %id,
            address = %payment.address,
            age_ms = now.saturating_sub(payment.created_at),
            "Pending payment expired"
        );
        Ok(Some(payment))
    }
}
