//! Balance ledger storage.
//!
//! Balances in `users` change only through [`apply_entry`], which appends
//! the matching `transaction_history` row in the same transaction. The sum
//! of an address's records therefore always equals its balance.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::sync::{Arc, Mutex};

use paysync_types::{
    Address, PageRequest, Pagination, Points, Timestamp, TransactionPage, TransactionRecord,
    UserAccount,
};

use crate::error::{Result, StoreError};
use crate::lock;
use crate::traits::BalanceStore;
use crate::types::BalanceDiscrepancy;

/// Apply one signed entry inside an open transaction.
///
/// Returns the new balance and the id of the appended record. The caller
/// commits; on error nothing has been written that survives a rollback.
pub(crate) fn apply_entry(
    conn: &Connection,
    address: &Address,
    amount: Points,
    note: &str,
    now: Timestamp,
) -> Result<(Points, i64)> {
    if amount == 0 {
        return Err(StoreError::invalid_amount("ledger entry amount must be non-zero"));
    }

    ensure_account(conn, address, now)?;
    let balance: Points = conn.query_row(
        "SELECT balance FROM users WHERE address = ?1",
        [address.as_str()],
        |row| row.get(0),
    )?;

    let new_balance = balance.checked_add(amount).ok_or_else(|| {
        StoreError::invalid_amount(format!("balance overflow applying {} to {}", amount, balance))
    })?;
    if new_balance < 0 {
        return Err(StoreError::InsufficientBalance {
            available: balance,
            requested: amount.saturating_neg(),
        });
    }

    conn.execute(
        "INSERT INTO transaction_history (address, amount, note, timestamp)
         VALUES (?1, ?2, ?3, ?4)",
        params![address.as_str(), amount, note, now as i64],
    )?;
    let record_id = conn.last_insert_rowid();

    conn.execute(
        "UPDATE users SET balance = ?2 WHERE address = ?1",
        params![address.as_str(), new_balance],
    )?;

    Ok((new_balance, record_id))
}

fn ensure_account(conn: &Connection, address: &Address, now: Timestamp) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (address, balance, created_at) VALUES (?1, 0, ?2)",
        params![address.as_str(), now as i64],
    )?;
    Ok(())
}

fn select_account(conn: &Connection, address: &Address) -> Result<Option<UserAccount>> {
    let account = conn
        .query_row(
            "SELECT address, balance, created_at FROM users WHERE address = ?1",
            [address.as_str()],
            |row| {
                let address: String = row.get(0)?;
                let created_at: i64 = row.get(2)?;
                Ok(UserAccount {
                    address: Address::new_unchecked(address),
                    balance: row.get(1)?,
                    created_at: created_at as Timestamp,
                })
            },
        )
        .optional()?;
    Ok(account)
}

/// SQLite-based balance ledger.
#[derive(Clone)]
pub struct SqliteBalanceLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBalanceLedger {
    /// Create a new ledger with the given database connection.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Sum of all balances.
    pub fn total_balance(&self) -> Result<Points> {
        let conn = lock(&self.conn)?;
        let total: Points =
            conn.query_row("SELECT COALESCE(SUM(balance), 0) FROM users", [], |row| {
                row.get(0)
            })?;
        Ok(total)
    }
}

impl BalanceStore for SqliteBalanceLedger {
    fn credit_or_debit(
        &self,
        address: &Address,
        amount: Points,
        note: &str,
        now: Timestamp,
    ) -> Result<Points> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (new_balance, record_id) = apply_entry(&tx, address, amount, note, now)?;
        tx.commit()?;

        tracing::debug!(
            address = %address,
            amount,
            new_balance,
            record_id,
            "Applied ledger entry"
        );
        Ok(new_balance)
    }

    fn get_or_create_account(&self, address: &Address, now: Timestamp) -> Result<UserAccount> {
        let conn = lock(&self.conn)?;
        ensure_account(&conn, address, now)?;
        select_account(&conn, address)?
            .ok_or_else(|| StoreError::invalid_data(format!("account {} vanished", address)))
    }

    fn get_account(&self, address: &Address) -> Result<Option<UserAccount>> {
        let conn = lock(&self.conn)?;
        select_account(&conn, address)
    }

    fn get_balance(&self, address: &Address) -> Result<Points> {
        Ok(self
            .get_account(address)?
            .map(|account| account.balance)
            .unwrap_or(0))
    }

    fn list_transactions(&self, address: &Address, page: PageRequest) -> Result<TransactionPage> {
        let page = PageRequest::new(page.page, page.page_size);
        let conn = lock(&self.conn)?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transaction_history WHERE address = ?1",
            [address.as_str()],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT id, address, amount, note, timestamp FROM transaction_history
             WHERE address = ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
        )?;
        let transactions = stmt
            .query_map(
                params![address.as_str(), page.page_size, page.offset() as i64],
                |row| {
                    let address: String = row.get(1)?;
                    let timestamp: i64 = row.get(4)?;
                    Ok(TransactionRecord {
                        id: row.get(0)?,
                        address: Address::new_unchecked(address),
                        amount: row.get(2)?,
                        note: row.get(3)?,
                        timestamp: timestamp as Timestamp,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(TransactionPage {
            transactions,
            pagination: Pagination::new(page, total as u64),
        })
    }

    fn audit(&self) -> Result<Vec<BalanceDiscrepancy>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT address, balance, ledger_sum FROM (
                 SELECT u.address AS address, u.balance AS balance,
                        COALESCE((SELECT SUM(t.amount) FROM transaction_history t
                                  WHERE t.address = u.address), 0) AS ledger_sum
                 FROM users u
                 UNION ALL
                 SELECT t.address, 0, SUM(t.amount)
                 FROM transaction_history t
                 WHERE t.address NOT IN (SELECT address FROM users)
                 GROUP BY t.address
             )
             WHERE balance != ledger_sum
             ORDER BY address",
        )?;

        let discrepancies = stmt
            .query_map([], |row| {
                let address: String = row.get(0)?;
                Ok(BalanceDiscrepancy {
                    address: Address::new_unchecked(address),
                    balance: row.get(1)?,
                    ledger_sum: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if !discrepancies.is_empty() {
            tracing::error!(count = discrepancies.len(), "Balance audit found discrepancies");
        }
        Ok(discrepancies)
    }
}
