//! Payment reconciliation operations for paysync.
//!
//! This crate combines the foundation crates (store, econ, chain, types) into
//! the reconciliation pipeline and the client request surface.
//!
//! # Module Organization
//!
//! - [`error`] - Operation error types
//! - [`config`] - Ingestion and sweep configuration
//! - [`nonce`] - Payment nonce issuance
//! - [`matcher`] - Matching chain events to pending payments
//! - [`ingester`] - The per-stream reconciliation loop
//! - [`sweep`] - Timeout sweep for unmatched payments
//! - [`service`] - Client request surface
//!
//! # Example
//!
//! ```
//! use paysync_econ::PointsConverter;
//! use paysync_ops::{CreatePaymentRequest, PaymentService};
//! use paysync_store::PaysyncState;
//! use paysync_types::Address;
//!
//! let state = PaysyncState::open_in_memory().unwrap();
//! let service = PaymentService::new(state, PointsConverter::default());
//!
//! let address = Address::new_unchecked("NXV7ZhHiyM1aHXwpVsRZC6BwNFP2jghXAq");
//! let nonce = service.issue_nonce(&address);
//! let payment = service
//!     .create_pending_payment(
//!         &address,
//!         &CreatePaymentRequest { nonce: nonce.to_string(), amount: 100_000_000 },
//!     )
//!     .unwrap();
//! assert!(payment.is_open());
//! ```
//!
//! # Pipeline
//!
//! ```text
//!   client ──► PaymentService ──► pending_payments
//!                                        ▲
//!   chain ──► TransactionIngester ──► PaymentMatcher ──► finalize_match
//!                 │                                       (verify + record
//!                 ▼                                        + balance, atomic)
//!             sync_cursors
//!
//!   TimeoutSweep ──► pending_payments (open -> failed)
//! ```

pub mod config;
pub mod error;
pub mod ingester;
pub mod matcher;
pub mod nonce;
pub mod service;
pub mod sweep;

pub use config::IngestConfig;
pub use error::{OpsError, OpsResult};
pub use ingester::{BatchReport, IngestEvent, TransactionIngester};
pub use matcher::{check_event, MatchOutcome, PaymentMatcher, SkipReason};
pub use nonce::NonceIssuer;
pub use service::{
    ChargeReceipt, CreatePaymentRequest, PaymentService, VerifyPaymentRequest,
    VerifyPaymentResponse, VerifyStatus,
};
pub use sweep::{SweepReport, TimeoutSweep};

pub use paysync_crypto::current_timestamp;
