//! Points pricing and conversion for paysync.
//!
//! This crate implements the pure conversion rules between external value
//! and internal points:
//!
//! - **Usage pricing**: AI token counts to points, via a per-token USD price
//!   table, a points-per-USD rate and a profit multiplier
//! - **Chain credits**: smallest chain units to points, via a fixed ratio
//!
//! All arithmetic is integer. Prices are expressed in nano-USD per token and
//! points in micro-points, so the per-token and per-unit rates are exact
//! integers and both conversions are strictly linear.
//!
//! # Example
//!
//! ```
//! use paysync_econ::PointsConverter;
//!
//! let converter = PointsConverter::default();
//!
//! // 1 GAS (10^8 units) = 1000 points = 10^9 micro-points
//! assert_eq!(converter.chain_amount_to_points(100_000_000).unwrap(), 1_000_000_000);
//!
//! // 1000 input tokens at $0.000003 with a 15% margin
//! let cost = converter.tokens_to_points(1000, 0).unwrap();
//! assert_eq!(cost.input_points, 3_450_000);
//! assert_eq!(cost.total_points, 3_450_000);
//! ```

pub mod convert;
pub mod error;
pub mod pricing;

pub use convert::{PointsConverter, UsageCost};
pub use error::{EconError, EconResult};
pub use pricing::{PricingTable, Rates};
