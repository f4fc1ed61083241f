//! Defaults and limits shared across the pipeline.

use crate::ledger::Points;

// =============================================================================
// Chain
// =============================================================================

/// Decimal places of the settlement token (GAS).
pub const CHAIN_DECIMALS: u32 = 8;

/// Smallest chain units in one whole token (10^8).
pub const CHAIN_UNITS_PER_TOKEN: u64 = 100_000_000;

/// Script hash of the Neo N3 GAS token contract.
pub const GAS_CONTRACT_HASH: &str = "0xd2a4cff31913016155e38e474a2c06d08be276cf";

// =============================================================================
// Points
// =============================================================================

/// Micro-points in one display point.
pub const MICRO_POINTS_PER_POINT: Points = 1_000_000;

/// Display points credited per whole GAS.
pub const POINTS_PER_TOKEN: Points = 1000;

// =============================================================================
// Ingestion
// =============================================================================

/// Stream identifier used when none is configured.
pub const DEFAULT_STREAM_ID: &str = "balance_sync";

/// Maximum events requested per batch.
pub const DEFAULT_BATCH_SIZE: u32 = 100;

/// Consecutive errors after which a cursor enters the `error` status.
pub const DEFAULT_CURSOR_ERROR_THRESHOLD: u32 = 5;

/// Poll interval when the stream is caught up (15 seconds, one Neo block).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 15_000;

/// Lease time-to-live for the single-runner stream lock (60 seconds).
pub const DEFAULT_LEASE_TTL_MS: u64 = 60_000;

// =============================================================================
// Payments
// =============================================================================

/// Age after which an unmatched payment is failed by the sweep (1 hour).
pub const DEFAULT_PAYMENT_EXPIRY_MS: u64 = 3_600_000;

/// Interval between timeout sweeps (1 minute).
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Maximum accepted length of a client-supplied nonce.
pub const MAX_NONCE_LENGTH: usize = 128;

/// Maximum accepted length of a transaction digest.
pub const MAX_TX_DIGEST_LENGTH: usize = 130;

/// Maximum length of a stream identifier.
pub const MAX_STREAM_ID_LENGTH: usize = 64;

// =============================================================================
// Pagination
// =============================================================================

/// Default transactions per page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Maximum transactions per page.
pub const MAX_PAGE_SIZE: u32 = 100;
