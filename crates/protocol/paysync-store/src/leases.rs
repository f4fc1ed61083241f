//! Stream lease storage.
//!
//! A lease row is an advisory lock: whoever holds an unexpired row for a
//! stream is the only process allowed to run its ingestion loop.

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use paysync_types::{StreamId, Timestamp};

use crate::error::{Result, StoreError};
use crate::lock;
use crate::traits::LeaseStore;
use crate::types::StreamLease;

/// SQLite-based lease store.
#[derive(Clone)]
pub struct SqliteLeaseStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLeaseStore {
    /// Create a new lease store with the given database connection.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn select_in(conn: &Connection, stream: &StreamId) -> Result<Option<StreamLease>> {
        let lease = conn
            .query_row(
                "SELECT stream_id, holder, acquired_at, expires_at
                 FROM stream_leases WHERE stream_id = ?1",
                [stream.as_str()],
                |row| {
                    let acquired_at: i64 = row.get(2)?;
                    let expires_at: i64 = row.get(3)?;
                    Ok(StreamLease {
                        stream_id: row.get(0)?,
                        holder: row.get(1)?,
                        acquired_at: acquired_at as Timestamp,
                        expires_at: expires_at as Timestamp,
                    })
                },
            )
            .optional()?;
        Ok(lease)
    }

    fn locked_error(conn: &Connection, stream: &StreamId) -> StoreError {
        match Self::select_in(conn, stream) {
            Ok(Some(lease)) => StoreError::StreamLocked {
                stream: stream.to_string(),
                holder: lease.holder,
                expires_at: lease.expires_at,
            },
            Ok(None) => StoreError::StreamLocked {
                stream: stream.to_string(),
                holder: "<released>".to_string(),
                expires_at: 0,
            },
            Err(e) => e,
        }
    }
}

impl LeaseStore for SqliteLeaseStore {
    fn acquire(
        &self,
        stream: &StreamId,
        holder: &str,
        ttl_ms: u64,
        now: Timestamp,
    ) -> Result<StreamLease> {
        let conn = lock(&self.conn)?;
        let expires_at = now.saturating_add(ttl_ms);

        // Single statement: the conflict branch only fires for the current
        // holder or an expired row, so two starters cannot both win.
        let changed = conn.execute(
            "INSERT INTO stream_leases (stream_id, holder, acquired_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(stream_id) DO UPDATE SET
                 acquired_at = CASE WHEN stream_leases.holder = excluded.holder
                                    THEN stream_leases.acquired_at
                                    ELSE excluded.acquired_at END,
                 holder = excluded.holder,
                 expires_at = excluded.expires_at
             WHERE stream_leases.holder = excluded.holder
                OR stream_leases.expires_at <= excluded.acquired_at",
            params![stream.as_str(), holder, now as i64, expires_at as i64],
        )?;

        if changed == 0 {
            return Err(Self::locked_error(&conn, stream));
        }

        let lease = Self::select_in(&conn, stream)?
            .ok_or_else(|| StoreError::invalid_data(format!("lease {} vanished", stream)))?;
        tracing::info!(
            stream = %stream,
            holder = %holder,
            expires_at = lease.expires_at,
            "Acquired stream lease"
        );
        Ok(lease)
    }

    fn renew(
        &self,
        stream: &StreamId,
        holder: &str,
        ttl_ms: u64,
        now: Timestamp,
    ) -> Result<StreamLease> {
        let conn = lock(&self.conn)?;
        let changed = conn.execute(
            "UPDATE stream_leases SET expires_at = ?3 WHERE stream_id = ?1 AND holder = ?2",
            params![stream.as_str(), holder, now.saturating_add(ttl_ms) as i64],
        )?;
        if changed == 0 {
            return Err(Self::locked_error(&conn, stream));
        }

        Self::select_in(&conn, stream)?
            .ok_or_else(|| StoreError::invalid_data(format!("lease {} vanished", stream)))
    }

    fn release(&self, stream: &StreamId, holder: &str) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let removed = conn.execute(
            "DELETE FROM stream_leases WHERE stream_id = ?1 AND holder = ?2",
            params![stream.as_str(), holder],
        )?;
        if removed > 0 {
            tracing::info!(stream = %stream, holder = %holder, "Released stream lease");
        }
        Ok(removed > 0)
    }

    fn get(&self, stream: &StreamId) -> Result<Option<StreamLease>> {
        let conn = lock(&self.conn)?;
        Self::select_in(&conn, stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::initialize_schema;

    fn setup_store() -> SqliteLeaseStore {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        SqliteLeaseStore::new(Arc::new(Mutex::new(conn)))
    }

    fn stream() -> StreamId {
        StreamId::parse("balance_sync").unwrap()
    }

    #[test]
    fn test_acquire_and_release() {
        let store = setup_store();
        let lease = store.acquire(&stream(), "runner-a", 1000, 100).unwrap();
        assert_eq!(lease.holder, "runner-a");
        assert_eq!(lease.acquired_at, 100);
        assert_eq!(lease.expires_at, 1100);

        assert!(store.release(&stream(), "runner-a").unwrap());
        assert!(store.get(&stream()).unwrap().is_none());
        assert!(!store.release(&stream(), "runner-a").unwrap());
    }

    #[test]
    fn test_second_holder_locked_out() {
        let store = setup_store();
        store.acquire(&stream(), "runner-a", 1000, 100).unwrap();

        let result = store.acquire(&stream(), "runner-b", 1000, 500);
        match result {
            Err(StoreError::StreamLocked {
                holder, expires_at, ..
            }) => {
                assert_eq!(holder, "runner-a");
                assert_eq!(expires_at, 1100);
            }
            other => panic!("expected StreamLocked, got {:?}", other),
        }

        // A foreign release does nothing
        assert!(!store.release(&stream(), "runner-b").unwrap());
    }

    #[test]
    fn test_reacquire_by_holder_extends() {
        let store = setup_store();
        store.acquire(&stream(), "runner-a", 1000, 100).unwrap();
        let lease = store.acquire(&stream(), "runner-a", 1000, 600).unwrap();
        assert_eq!(lease.acquired_at, 100);
        assert_eq!(lease.expires_at, 1600);
    }

    #[test]
    fn test_expired_lease_can_be_taken() {
        let store = setup_store();
        store.acquire(&stream(), "runner-a", 1000, 100).unwrap();

        let lease = store.acquire(&stream(), "runner-b", 1000, 1100).unwrap();
        assert_eq!(lease.holder, "runner-b");
        assert_eq!(lease.acquired_at, 1100);

        // The previous holder has lost it
        let renewed = store.renew(&stream(), "runner-a", 1000, 1200);
        assert!(matches!(renewed, Err(StoreError::StreamLocked { .. })));
    }

    #[test]
    fn test_renew() {
        let store = setup_store();
        store.acquire(&stream(), "runner-a", 1000, 100).unwrap();
        let lease = store.renew(&stream(), "runner-a", 1000, 900).unwrap();
        assert_eq!(lease.expires_at, 1900);
        assert!(!lease.is_expired(1899));
        assert!(lease.is_expired(1900));
    }
}
