//! SQL schema initialization.
//!
//! This module defines the database schema for SQLite storage.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Schema version for migration tracking.
pub const SCHEMA_VERSION: u32 = 1;

/// Initialize the database schema.
///
/// Creates all tables and indexes if they don't exist.
/// This function is idempotent - calling it multiple times is safe.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    // WAL lets the CLI read while a runner is writing
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    let current_version: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    match current_version {
        None => {
            create_tables(conn)?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )?;
        }
        Some(version) if version > SCHEMA_VERSION => {
            return Err(StoreError::schema(format!(
                "database schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            )));
        }
        Some(_) => {
            // Tables use IF NOT EXISTS, so re-running is harmless
            create_tables(conn)?;
        }
    }

    Ok(())
}

/// Create all database tables.
fn create_tables(conn: &Connection) -> Result<()> {
    // Payment intents. UNIQUE(address, nonce) retires a nonce for good,
    // including after the payment reaches a terminal state.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pending_payments (
            id TEXT PRIMARY KEY,
            address TEXT NOT NULL,
            nonce TEXT NOT NULL,
            amount INTEGER NOT NULL CHECK (amount > 0),
            status TEXT NOT NULL
                CHECK (status IN ('pending', 'signed', 'verified', 'failed')),
            tx_digest TEXT,
            tx_digest_hint TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (address, nonce)
        )",
        [],
    )?;

    // At most one open payment per address
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_payments_open_address
         ON pending_payments(address) WHERE status IN ('pending', 'signed')",
        [],
    )?;

    // A chain digest can finalize at most one payment
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_payments_tx_digest
         ON pending_payments(tx_digest) WHERE tx_digest IS NOT NULL",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_status_created
         ON pending_payments(status, created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sync_cursors (
            id TEXT PRIMARY KEY,
            last_cursor TEXT,
            last_processed_at INTEGER,
            processed_count INTEGER NOT NULL DEFAULT 0,
            error_count INTEGER NOT NULL DEFAULT 0,
            consecutive_errors INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'paused', 'error')),
            metadata TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS stream_leases (
            stream_id TEXT PRIMARY KEY,
            holder TEXT NOT NULL,
            acquired_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            address TEXT PRIMARY KEY,
            balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
            created_at INTEGER NOT NULL
        )",
        [],
    )?;

    // Append-only
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transaction_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            address TEXT NOT NULL,
            amount INTEGER NOT NULL CHECK (amount != 0),
            note TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_history_address
         ON transaction_history(address, id)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_schema() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in [
            "pending_payments",
            "schema_version",
            "stream_leases",
            "sync_cursors",
            "transaction_history",
            "users",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        conn.execute("UPDATE schema_version SET version = ?1", [SCHEMA_VERSION + 1])
            .unwrap();

        assert!(matches!(
            initialize_schema(&conn),
            Err(StoreError::Schema(_))
        ));
    }

    #[test]
    fn test_open_payment_index_is_partial() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let insert = |id: &str, nonce: &str, status: &str| {
            conn.execute(
                "INSERT INTO pending_payments (id, address, nonce, amount, status, created_at, updated_at)
                 VALUES (?1, 'addr', ?2, 1, ?3, 0, 0)",
                rusqlite::params![id, nonce, status],
            )
        };

        insert("a", "n1", "verified").unwrap();
        insert("b", "n2", "failed").unwrap();
        insert("c", "n3", "pending").unwrap();
        assert!(insert("d", "n4", "signed").is_err());
        // retired nonce
        assert!(insert("e", "n1", "failed").is_err());
    }
}
