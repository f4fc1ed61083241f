//! Sync cursor storage.
//!
//! One row per ingestion stream. The stored position only moves forward;
//! a stale `advance` leaves the row untouched so that retries after a crash
//! or a lost response are harmless.

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::sync::{Arc, Mutex};

use paysync_types::{
    CursorPosition, CursorStatus, StreamId, StreamMetadata, SyncCursor, Timestamp,
    DEFAULT_CURSOR_ERROR_THRESHOLD,
};

use crate::error::{Result, StoreError};
use crate::lock;
use crate::traits::CursorStore;

const CURSOR_COLUMNS: &str = "id, last_cursor, last_processed_at, processed_count, error_count, \
                              consecutive_errors, status, metadata";

/// Raw column values, decoded outside the row callback.
struct CursorRow {
    id: String,
    last_cursor: Option<String>,
    last_processed_at: Option<i64>,
    processed_count: i64,
    error_count: i64,
    consecutive_errors: i64,
    status: String,
    metadata: String,
}

impl CursorRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            last_cursor: row.get(1)?,
            last_processed_at: row.get(2)?,
            processed_count: row.get(3)?,
            error_count: row.get(4)?,
            consecutive_errors: row.get(5)?,
            status: row.get(6)?,
            metadata: row.get(7)?,
        })
    }

    fn into_cursor(self) -> Result<SyncCursor> {
        let last_cursor = self
            .last_cursor
            .map(|token| token.parse::<CursorPosition>())
            .transpose()?;
        let status = self.status.parse::<CursorStatus>()?;
        let metadata = StreamMetadata::from_json(&self.metadata)?;

        Ok(SyncCursor {
            id: StreamId::new_unchecked(self.id),
            last_cursor,
            last_processed_at: self.last_processed_at.map(|t| t as Timestamp),
            processed_count: self.processed_count as u64,
            error_count: self.error_count as u64,
            consecutive_errors: self.consecutive_errors as u32,
            status,
            metadata,
        })
    }
}

/// SQLite-based cursor store.
#[derive(Clone)]
pub struct SqliteCursorStore {
    conn: Arc<Mutex<Connection>>,
    error_threshold: u32,
}

impl SqliteCursorStore {
    /// Create a new cursor store with the given database connection.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            error_threshold: DEFAULT_CURSOR_ERROR_THRESHOLD,
        }
    }

    /// Set how many consecutive errors move a cursor to `error`.
    pub fn with_error_threshold(mut self, threshold: u32) -> Self {
        self.error_threshold = threshold.max(1);
        self
    }

    /// The configured error threshold.
    pub fn error_threshold(&self) -> u32 {
        self.error_threshold
    }

    fn select_in(conn: &Connection, stream: &StreamId) -> Result<Option<SyncCursor>> {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM sync_cursors WHERE id = ?1", CURSOR_COLUMNS),
                [stream.as_str()],
                CursorRow::from_row,
            )
            .optional()?;
        row.map(CursorRow::into_cursor).transpose()
    }

    fn load_in(conn: &Connection, stream: &StreamId) -> Result<SyncCursor> {
        let genesis = SyncCursor::genesis(stream.clone(), StreamMetadata::default());
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO sync_cursors (id, status, metadata) VALUES (?1, ?2, ?3)",
            params![
                stream.as_str(),
                genesis.status.as_str(),
                genesis.metadata.to_json()?,
            ],
        )?;
        if inserted > 0 {
            tracing::info!(stream = %stream, "Created sync cursor at genesis");
        }

        Self::select_in(conn, stream)?
            .ok_or_else(|| StoreError::invalid_data(format!("cursor {} vanished", stream)))
    }

    fn set_status(&self, stream: &StreamId, status: CursorStatus) -> Result<SyncCursor> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        Self::load_in(&tx, stream)?;

        let reset_errors = status == CursorStatus::Active;
        tx.execute(
            "UPDATE sync_cursors
             SET status = ?2,
                 consecutive_errors = CASE WHEN ?3 THEN 0 ELSE consecutive_errors END
             WHERE id = ?1",
            params![stream.as_str(), status.as_str(), reset_errors],
        )?;
        let cursor = Self::load_in(&tx, stream)?;
        tx.commit()?;

        tracing::info!(stream = %stream, status = %status, "Cursor status changed");
        Ok(cursor)
    }
}

impl CursorStore for SqliteCursorStore {
    fn load(&self, stream: &StreamId) -> Result<SyncCursor> {
        let conn = lock(&self.conn)?;
        Self::load_in(&conn, stream)
    }

    fn get(&self, stream: &StreamId) -> Result<Option<SyncCursor>> {
        let conn = lock(&self.conn)?;
        Self::select_in(&conn, stream)
    }

    fn advance_with<F>(
        &self,
        stream: &StreamId,
        position: CursorPosition,
        count_delta: u64,
        now: Timestamp,
        update: F,
    ) -> Result<SyncCursor>
    where
        F: FnOnce(&mut StreamMetadata),
    {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut cursor = Self::load_in(&tx, stream)?;

        match cursor.status {
            CursorStatus::Error => return Err(StoreError::CursorStalled(stream.to_string())),
            CursorStatus::Paused => return Err(StoreError::CursorPaused(stream.to_string())),
            CursorStatus::Active => {}
        }

        if !cursor.is_behind(&position) {
            tracing::debug!(
                stream = %stream,
                stored = ?cursor.last_cursor,
                requested = %position,
                "Ignoring stale cursor advance"
            );
            return Ok(cursor);
        }

        update(&mut cursor.metadata);
        cursor.last_cursor = Some(position);
        cursor.last_processed_at = Some(now);
        cursor.processed_count = cursor.processed_count.saturating_add(count_delta);
        cursor.consecutive_errors = 0;

        tx.execute(
            "UPDATE sync_cursors
             SET last_cursor = ?2, last_processed_at = ?3, processed_count = ?4,
                 consecutive_errors = 0, metadata = ?5
             WHERE id = ?1",
            params![
                stream.as_str(),
                position.to_token(),
                now as i64,
                cursor.processed_count as i64,
                cursor.metadata.to_json()?,
            ],
        )?;
        tx.commit()?;

        Ok(cursor)
    }

    fn record_error(&self, stream: &StreamId) -> Result<SyncCursor> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let before = Self::load_in(&tx, stream)?;

        let consecutive = before.consecutive_errors.saturating_add(1);
        let stalls = before.status == CursorStatus::Active && consecutive >= self.error_threshold;
        let status = if stalls {
            CursorStatus::Error
        } else {
            before.status
        };

        tx.execute(
            "UPDATE sync_cursors
             SET error_count = error_count + 1, consecutive_errors = ?2, status = ?3
             WHERE id = ?1",
            params![stream.as_str(), consecutive, status.as_str()],
        )?;
        let cursor = Self::load_in(&tx, stream)?;
        tx.commit()?;

        if stalls {
            tracing::warn!(
                stream = %stream,
                consecutive_errors = consecutive,
                threshold = self.error_threshold,
                "Cursor stalled after repeated errors"
            );
        } else {
            tracing::warn!(
                stream = %stream,
                consecutive_errors = consecutive,
                "Recorded ingestion error"
            );
        }
        Ok(cursor)
    }

    fn pause(&self, stream: &StreamId) -> Result<SyncCursor> {
        self.set_status(stream, CursorStatus::Paused)
    }

    fn resume(&self, stream: &StreamId) -> Result<SyncCursor> {
        self.set_status(stream, CursorStatus::Active)
    }

    fn list(&self) -> Result<Vec<SyncCursor>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sync_cursors ORDER BY id",
            CURSOR_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], CursorRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(CursorRow::into_cursor).collect()
    }
}
