//! Operator command-line interface for paysync.
//!
//! This crate provides the `paysync` binary. It includes commands for:
//!
//! - **Runner**: ingest chain events and expire stale payments
//! - **Cursors**: inspect, pause and resume sync streams
//! - **Payments**: issue nonces, create, sign and verify payments
//! - **Balances**: show balances and history, charge usage, audit
//!
//! # Quick Start
//!
//! ```bash
//! # Write a config and create the database
//! paysync init
//!
//! # Set [chain].payment_contract, then run the reconciler
//! paysync run
//!
//! # Check a balance
//! paysync balance NXV7ZhHiyM1aHXwpVsRZC6BwNFP2jghXAq
//! ```
//!
//! # Output Formats
//!
//! All commands support `--format human` (default, colored) and
//! `--format json`.
//!
//! # Configuration
//!
//! Loaded from `<data dir>/config.toml`; override with `--config` or
//! `PAYSYNC_CONFIG`.

pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod output;
pub mod signals;

// Re-export main types
pub use cli::{Cli, Commands, CursorCommand, OutputFormatArg, PaymentCommand};
pub use config::CliConfig;
pub use context::AppContext;
pub use error::{CliError, CliResult};
pub use output::{OutputFormat, Render};
