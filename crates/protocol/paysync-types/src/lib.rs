//! Data structures for the paysync reconciliation pipeline.
//!
//! This crate provides the types shared by every paysync crate. It contains
//! no storage or network logic, only type definitions, the payment status
//! state machine, and the error codes surfaced to callers.
//!
//! # Module Organization
//!
//! - [`payment`] - Pending payments, their identifiers and the status state machine
//! - [`cursor`] - Ingestion stream cursors and their typed metadata
//! - [`ledger`] - Balance ledger records, accounts and pagination
//! - [`constants`] - Defaults and limits
//! - [`error`] - Error codes and the shared validation error type
//!
//! # Example
//!
//! ```
//! use paysync_types::{Actor, PaymentStatus};
//!
//! let next = PaymentStatus::Pending
//!     .transition(PaymentStatus::Signed, Actor::Client)
//!     .unwrap();
//! assert_eq!(next, PaymentStatus::Signed);
//!
//! // Clients may never finalize a payment themselves.
//! assert!(next.transition(PaymentStatus::Verified, Actor::Client).is_err());
//! ```
//!
//! # Type Conventions
//!
//! - Identifiers are validated newtypes with `#[serde(transparent)]`
//! - Status enums serialize as lowercase strings, matching the stored values
//! - Records serialize with camelCase field names for the request surface

/// Crate version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod constants;
pub mod cursor;
pub mod error;
pub mod ledger;
pub mod payment;

pub use constants::*;
pub use cursor::{CursorPosition, CursorStatus, StreamId, StreamMetadata, SyncCursor};
pub use error::{ErrorCode, PaysyncError, Result};
pub use ledger::{
    format_points, Amount, PageRequest, Pagination, Points, TransactionPage, TransactionRecord,
    UserAccount,
};
pub use payment::{Actor, Address, Nonce, PaymentId, PaymentStatus, PendingPayment, TxDigest};

pub use paysync_crypto::Timestamp;
