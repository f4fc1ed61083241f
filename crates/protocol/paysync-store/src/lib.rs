//! SQLite persistence for the paysync reconciliation pipeline.
//!
//! This crate provides persistence for all service state:
//!
//! - **Pending payments**: payment intents and their status lifecycle
//! - **Sync cursors**: per-stream ingestion position, counters and status
//! - **Stream leases**: single-runner locks for ingestion loops
//! - **Balance ledger**: per-address balances and the append-only history
//! - **Reconciler**: the atomic verify-and-credit step
//!
//! # Storage Layout
//!
//! ```text
//! ~/.paysync/
//! ├── config.toml              # Service configuration
//! └── paysync.db               # SQLite: payments, cursors, leases, ledger
//! ```
//!
//! All components share one `Arc<Mutex<Connection>>`, so every write is
//! serialised within the process; transactions use `BEGIN IMMEDIATE` so
//! separate processes serialise on the database file as well.
//!
//! # Example
//!
//! ```
//! use paysync_store::{BalanceStore, PaymentStore, PaysyncState};
//! use paysync_types::{Address, Nonce};
//!
//! let state = PaysyncState::open_in_memory().unwrap();
//! let address = Address::new_unchecked("NdemoAddress");
//!
//! let payment = state
//!     .payments
//!     .create(&address, &Nonce::parse("n1").unwrap(), 1000, 0)
//!     .unwrap();
//! assert!(payment.is_open());
//! assert_eq!(state.ledger.get_balance(&address).unwrap(), 0);
//! ```

pub mod cursors;
pub mod error;
pub mod leases;
pub mod ledger;
pub mod payments;
pub mod reconcile;
pub mod schema;
pub mod traits;
pub mod types;

// Re-export error types
pub use error::{Result, StoreError};

// Re-export traits
pub use traits::{BalanceStore, CursorStore, LeaseStore, PaymentStore};

// Re-export types
pub use types::{BalanceDiscrepancy, FinalizeOutcome, StreamLease};

// Re-export implementations
pub use cursors::SqliteCursorStore;
pub use leases::SqliteLeaseStore;
pub use ledger::SqliteBalanceLedger;
pub use payments::SqlitePaymentStore;
pub use reconcile::SqliteReconciler;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use paysync_types::DEFAULT_CURSOR_ERROR_THRESHOLD;
use rusqlite::Connection;

/// Lock the shared connection.
pub(crate) fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| StoreError::lock_poisoned("database connection lock poisoned"))
}

/// Get the default data directory for paysync state.
///
/// Priority:
/// 1. `PAYSYNC_DATA_DIR` environment variable (if set)
/// 2. Platform-specific data directory (e.g., `~/.local/share/paysync` on Linux)
/// 3. Fallback to `$HOME/.paysync`
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PAYSYNC_DATA_DIR") {
        return PathBuf::from(dir);
    }

    directories::ProjectDirs::from("io", "paysync", "paysync")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| {
            std::env::var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".paysync")
        })
}

/// Configuration for [`PaysyncState`].
#[derive(Debug, Clone)]
pub struct StateConfig {
    /// Base directory for all service data.
    pub base_dir: PathBuf,
    /// Database file path (default: base_dir/paysync.db).
    pub database_path: Option<PathBuf>,
    /// Consecutive errors before a cursor moves to `error`.
    pub cursor_error_threshold: u32,
}

impl StateConfig {
    /// Create a new configuration with the given base directory.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            database_path: None,
            cursor_error_threshold: DEFAULT_CURSOR_ERROR_THRESHOLD,
        }
    }

    /// Set the database path.
    pub fn with_database_path(mut self, path: impl AsRef<Path>) -> Self {
        self.database_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the cursor error threshold.
    pub fn with_cursor_error_threshold(mut self, threshold: u32) -> Self {
        self.cursor_error_threshold = threshold;
        self
    }

    /// Get the database path.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join("paysync.db"))
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self::new(default_data_dir())
    }
}

/// All storage components over one shared connection.
#[derive(Clone)]
pub struct PaysyncState {
    /// Pending payment ledger.
    pub payments: SqlitePaymentStore,
    /// Sync cursors.
    pub cursors: SqliteCursorStore,
    /// Stream leases.
    pub leases: SqliteLeaseStore,
    /// Balance ledger.
    pub ledger: SqliteBalanceLedger,
    /// Verify-and-credit.
    pub reconciler: SqliteReconciler,
    conn: Arc<Mutex<Connection>>,
    config: StateConfig,
}

impl PaysyncState {
    /// Open state with the given configuration.
    ///
    /// Creates the base directory and initializes the database schema.
    pub fn open(config: StateConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.base_dir)?;
        let db_path = config.database_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(db_path = %db_path.display(), "Opening paysync database");
        let conn = Connection::open(&db_path)?;
        schema::initialize_schema(&conn)?;

        Ok(Self::from_connection(conn, config))
    }

    /// Open state on an in-memory database.
    ///
    /// Nothing touches the filesystem; used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize_schema(&conn)?;
        Ok(Self::from_connection(
            conn,
            StateConfig::new(std::env::temp_dir()),
        ))
    }

    fn from_connection(conn: Connection, config: StateConfig) -> Self {
        let conn = Arc::new(Mutex::new(conn));
        Self {
            payments: SqlitePaymentStore::new(Arc::clone(&conn)),
            cursors: SqliteCursorStore::new(Arc::clone(&conn))
                .with_error_threshold(config.cursor_error_threshold),
            leases: SqliteLeaseStore::new(Arc::clone(&conn)),
            ledger: SqliteBalanceLedger::new(Arc::clone(&conn)),
            reconciler: SqliteReconciler::new(Arc::clone(&conn)),
            conn,
            config,
        }
    }

    /// Replace the cursor error threshold.
    pub fn with_cursor_error_threshold(mut self, threshold: u32) -> Self {
        self.config.cursor_error_threshold = threshold;
        self.cursors = self.cursors.with_error_threshold(threshold);
        self
    }

    /// Get the configuration used to open this state.
    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// Get a reference to the shared database connection.
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paysync_types::{Address, CursorPosition, Nonce, StreamId};
    use tempfile::TempDir;

    #[test]
    fn test_config_paths() {
        let config = StateConfig::new("/tmp/paysync");
        assert_eq!(config.database_path(), PathBuf::from("/tmp/paysync/paysync.db"));

        let config = config.with_database_path("/var/lib/paysync.db");
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/paysync.db"));
    }

    #[test]
    fn test_state_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let stream = StreamId::parse("balance_sync").unwrap();
        let address = Address::new_unchecked("Ntest");

        {
            let state = PaysyncState::open(StateConfig::new(temp_dir.path())).unwrap();
            state
                .payments
                .create(&address, &Nonce::parse("n1").unwrap(), 1000, 1)
                .unwrap();
            state
                .cursors
                .advance(&stream, CursorPosition::new(7, 1), 1, 2)
                .unwrap();
        }

        let state = PaysyncState::open(StateConfig::new(temp_dir.path())).unwrap();
        assert!(state.payments.get_open_by_address(&address).unwrap().is_some());
        assert_eq!(
            state.cursors.load(&stream).unwrap().last_cursor,
            Some(CursorPosition::new(7, 1))
        );
    }

    #[test]
    fn test_error_threshold_is_applied() {
        let state = PaysyncState::open_in_memory()
            .unwrap()
            .with_cursor_error_threshold(1);
        let stream = StreamId::parse("s").unwrap();
        let cursor = state.cursors.record_error(&stream).unwrap();
        assert_eq!(cursor.status, paysync_types::CursorStatus::Error);
    }

    /// Two processes racing `create` for one address on the same file.
    fn race_create(nonces: [&'static str; 2]) {
        let temp_dir = TempDir::new().unwrap();
        let address = Address::new_unchecked("Nrace");
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let handles: Vec<_> = nonces
            .into_iter()
            .map(|n| {
                let state = PaysyncState::open(StateConfig::new(temp_dir.path())).unwrap();
                let address = address.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    state
                        .payments
                        .create(&address, &Nonce::parse(n).unwrap(), 1000, 1)
                })
            })
            .collect();
        let results: Vec<Result<_>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let created: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(created.len(), 1, "{:?}", results);
        let err = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(matches!(err, StoreError::DuplicateNonce(_)), "{:?}", err);

        let state = PaysyncState::open(StateConfig::new(temp_dir.path())).unwrap();
        let open = state.payments.get_open_by_address(&address).unwrap().unwrap();
        assert_eq!(open.id, created[0].id);
    }

    #[test]
    fn test_concurrent_create_distinct_nonces_across_connections() {
        race_create(["n-left", "n-right"]);
    }

    #[test]
    fn test_concurrent_create_same_nonce_across_connections() {
        race_create(["n-shared", "n-shared"]);
    }
}
