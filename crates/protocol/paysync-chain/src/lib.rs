//! Chain event sources for paysync.
//!
//! This crate reads payment events from the chain for the ingester and for
//! on-demand verification. It knows nothing about pending payments or
//! balances; matching lives in `paysync-ops`.
//!
//! # Architecture
//!
//! ```text
//! paysync-ops                  paysync-chain
//! ┌──────────────────┐        ┌──────────────────────────┐
//! │ ingest_once      │ ─────► │ ChainSource (trait)      │
//! │ verify_payment   │        │   └─ NeoRpcSource        │
//! └──────────────────┘        └────────────┬─────────────┘
//!                                          │ JSON-RPC
//!                                          ▼
//!                             ┌──────────────────────────┐
//!                             │ Neo N3 node              │
//!                             │ (payment contract logs)  │
//!                             └──────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use paysync_chain::{ChainSource, NeoRpcConfig, NeoRpcSource, RetryPolicy};
//! use paysync_types::StreamId;
//!
//! # async fn example() -> paysync_chain::ChainResult<()> {
//! let config = NeoRpcConfig::default()
//!     .with_rpc_url("https://testnet1.neo.coz.io:443")
//!     .with_payment_contract("0xd2a4cff31913016155e38e474a2c06d08be276cf");
//!
//! let source = NeoRpcSource::new(config, RetryPolicy::default())?;
//! let batch = source
//!     .fetch_events(&StreamId::new_unchecked("balance_sync"), None, 100)
//!     .await?;
//! println!("{} events", batch.events.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Ordering
//!
//! Events are returned in ascending `(height, index)` order and only from
//! blocks with the configured number of confirmations. A batch may carry a
//! checkpoint past its last event so that empty blocks are not rescanned.

pub mod config;
pub mod error;
pub mod neo;
pub mod retry;
pub mod traits;
pub mod types;

pub use config::{NeoRpcConfig, RetryConfig};
pub use error::{ChainError, ChainResult};
pub use neo::NeoRpcSource;
pub use retry::RetryPolicy;
pub use traits::ChainSource;
pub use types::{ChainEvent, EventBatch};
